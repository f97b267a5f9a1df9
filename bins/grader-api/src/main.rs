mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use axum::Router;
use grader_common::config::AssignmentConfigManager;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub const DEFAULT_API_ADDR: &str = "0.0.0.0:3000";

pub struct AppState {
    pub redis: ConnectionManager,
    pub assignments: AssignmentConfigManager,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    info!("Grader API booting...");

    // Assignment ids are validated at submission time
    let assignments = AssignmentConfigManager::load_default()
        .context("Failed to load assignment configurations")?;
    info!("Serving assignments: {:?}", assignments.list_assignments());

    // Connect to Redis
    let redis_url = std::env::var("REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let client = redis::Client::open(redis_url.as_str())
        .context("Failed to create Redis client")?;

    let redis_conn = ConnectionManager::new(client).await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", redis_url);

    let state = Arc::new(AppState {
        redis: redis_conn,
        assignments,
    });

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let addr = std::env::var("API_ADDR").unwrap_or_else(|_| DEFAULT_API_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await
        .with_context(|| format!("Failed to bind to address {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept grading requests");

    axum::serve(listener, app).await
        .context("Server error")?;
    Ok(())
}
