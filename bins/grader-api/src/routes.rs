// Route table for the grader API
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/grade", post(handlers::submit_grade))
        .route("/report/:job_id", get(handlers::get_report))
        .route("/job/:job_id/cancel", post(handlers::cancel_job))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
}
