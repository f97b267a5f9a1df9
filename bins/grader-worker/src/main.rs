mod grading;
mod settings;

use anyhow::Context;
use grader_common::config::AssignmentConfigManager;
use grader_common::redis;
use grader_judge::{FixtureStore, LocalSubmissions};
use grading::{GradeOutcome, GradingContext};
use settings::WorkerSettings;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Grader Worker booting...");

    let settings = WorkerSettings::from_env()?;

    let assignments = AssignmentConfigManager::load(&settings.config_path)
        .map_err(|e| {
            error!("Failed to load assignment configurations: {:#}", e);
            error!("Make sure {} exists", settings.config_path.display());
            e
        })?;
    info!("Loaded assignments: {:?}", assignments.list_assignments());

    // Fixture problems are fatal here rather than halfway through a batch
    let fixtures = FixtureStore::load(&assignments).context("Failed to load fixtures")?;
    for id in assignments.list_assignments() {
        info!(assignment_id = %id, fixtures = fixtures.total(&id), "Fixtures ready");
    }

    let ctx = GradingContext {
        assignments,
        fixtures,
        submissions: LocalSubmissions::new(&settings.submissions_dir),
        cancel_poll_interval: settings.cancel_poll_interval,
    };
    info!("Submissions directory: {}", ctx.submissions.root().display());

    // Connect to Redis
    let client = ::redis::Client::open(settings.redis_url.as_str())?;
    let mut redis_conn = ::redis::aio::ConnectionManager::new(client).await?;

    info!("Connected to Redis: {}", settings.redis_url);

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => warn!("Received shutdown signal, stopping after current job..."),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        trigger.cancel();
    });

    worker_loop(&mut redis_conn, &ctx, &shutdown, settings.pop_timeout_secs).await;

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip_all)]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    ctx: &GradingContext,
    shutdown: &CancellationToken,
    pop_timeout_secs: f64,
) {
    while !shutdown.is_cancelled() {
        // BLPOP with timeout so shutdown is noticed while idle
        match redis::pop_job(redis_conn, pop_timeout_secs).await {
            Ok(Some(job)) => {
                let job_id = job.id;
                info!(
                    job_id = %job_id,
                    student_id = %job.student_id,
                    assignment_id = %job.assignment_id,
                    "Received job"
                );

                let start = std::time::Instant::now();
                let record = match grading::grade(&job, ctx, redis_conn, shutdown).await {
                    GradeOutcome::Finished(record) => record,
                    GradeOutcome::Interrupted => {
                        warn!(job_id = %job_id, "Judging interrupted by shutdown, requeueing job");
                        if let Err(e) = redis::push_job(redis_conn, &job).await {
                            error!(job_id = %job_id, error = %e, "Failed to requeue job");
                        }
                        break;
                    }
                };

                info!(
                    job_id = %job_id,
                    state = ?record.state,
                    status = ?record.report.as_ref().map(|r| r.status),
                    multiplier = record.report.as_ref().map(|r| r.multiplier),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Grading completed"
                );
                if let Some(report) = &record.report {
                    for result in report.results() {
                        debug!(
                            job_id = %job_id,
                            fixture = %result.fixture_id,
                            verdict = %result.verdict,
                            execution_ms = result.execution_time_ms,
                            "Fixture result"
                        );
                    }
                }
                if let Some(err) = &record.error {
                    error!(job_id = %job_id, error = %err, "Grading failed");
                }

                // Persist record to Redis
                match redis::store_record(redis_conn, &record).await {
                    Ok(_) => {
                        info!(job_id = %job_id, "Record persisted to Redis");
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "Failed to persist record");
                        // Non-fatal - worker continues
                    }
                }
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
