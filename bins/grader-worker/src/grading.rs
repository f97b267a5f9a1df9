// One grading job from queue to stored record
use anyhow::Result;
use chrono::Utc;
use grader_common::config::{AssignmentConfigManager, AssignmentProvider};
use grader_common::redis;
use grader_common::types::{GradingJob, GradingRecord, JobState, JudgingReport};
use grader_judge::{judge, FixtureStore, JudgeError, LocalSubmissions, SubmissionProvider};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything a worker loads once at startup
pub struct GradingContext {
    pub assignments: AssignmentConfigManager,
    pub fixtures: FixtureStore,
    pub submissions: LocalSubmissions,
    pub cancel_poll_interval: Duration,
}

pub enum GradeOutcome {
    Finished(GradingRecord),
    /// The worker is shutting down; the job should go back on the queue
    Interrupted,
}

/// Grade one job, honouring per-job cancel requests and worker shutdown
pub async fn grade(
    job: &GradingJob,
    ctx: &GradingContext,
    conn: &mut ::redis::aio::ConnectionManager,
    shutdown: &CancellationToken,
) -> GradeOutcome {
    match redis::is_job_cancelled(conn, &job.id).await {
        Ok(true) => {
            info!(job_id = %job.id, "Job cancelled before it started");
            return GradeOutcome::Finished(record_for(job, Err(JudgeError::Cancelled.into())));
        }
        Ok(false) => {}
        Err(e) => warn!(job_id = %job.id, error = %e, "Failed to check cancellation status"),
    }

    if let Err(e) = redis::set_status(conn, &job.id, JobState::Running).await {
        warn!(job_id = %job.id, error = %e, "Failed to mark job running");
    }

    let job_token = shutdown.child_token();
    let watcher = spawn_cancel_watcher(conn.clone(), job.id, job_token.clone(), ctx.cancel_poll_interval);
    let result = run_pass(job, ctx, &job_token).await;
    watcher.abort();

    if shutdown.is_cancelled() && is_cancellation(&result) {
        return GradeOutcome::Interrupted;
    }
    GradeOutcome::Finished(record_for(job, result))
}

async fn run_pass(
    job: &GradingJob,
    ctx: &GradingContext,
    cancel: &CancellationToken,
) -> Result<JudgingReport> {
    let config = ctx.assignments.get_config(&job.assignment_id)?;
    let groups = ctx.fixtures.groups(&job.assignment_id)?;
    let root = ctx.submissions.materialize(&job.student_id)?;
    Ok(judge(&root, config, groups, cancel).await?)
}

/// Poll the job's cancel flag until it is set or the job finishes
fn spawn_cancel_watcher(
    mut conn: ::redis::aio::ConnectionManager,
    job_id: Uuid,
    token: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            match redis::is_job_cancelled(&mut conn, &job_id).await {
                Ok(true) => {
                    info!(job_id = %job_id, "Cancel requested, stopping judging pass");
                    token.cancel();
                    return;
                }
                Ok(false) => {}
                // Keep judging; a flaky connection must not cancel jobs
                Err(e) => warn!(job_id = %job_id, error = %e, "Failed to check cancellation status"),
            }
        }
    })
}

fn is_cancellation(result: &Result<JudgingReport>) -> bool {
    match result {
        Err(e) => matches!(e.downcast_ref::<JudgeError>(), Some(JudgeError::Cancelled)),
        Ok(_) => false,
    }
}

/// Turn the outcome of a pass into the record persisted for the job
pub fn record_for(job: &GradingJob, result: Result<JudgingReport>) -> GradingRecord {
    let cancelled = is_cancellation(&result);
    let (state, report, error) = match result {
        Ok(report) => (JobState::Completed, Some(report), None),
        Err(_) if cancelled => (JobState::Cancelled, None, None),
        Err(e) => (JobState::Failed, None, Some(format!("{:#}", e))),
    };
    GradingRecord {
        job_id: job.id,
        student_id: job.student_id.clone(),
        assignment_id: job.assignment_id.clone(),
        state,
        report,
        error,
        graded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_common::types::ReportStatus;
    use std::collections::BTreeSet;

    fn report() -> JudgingReport {
        JudgingReport {
            assignment_id: "A1".to_string(),
            status: ReportStatus::Accepted,
            targets: Vec::new(),
            pass_count: 1,
            fail_count: 0,
            not_run_count: 0,
            phases: Vec::new(),
            pass_ratio: Some(1.0),
            multiplier: 1.0,
            no_tests_configured: false,
            failure_categories: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_completed_record() {
        let job = GradingJob::new("s1", "A1");
        let record = record_for(&job, Ok(report()));
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.job_id, job.id);
        assert!(record.report.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_cancelled_record() {
        let job = GradingJob::new("s1", "A1");
        let record = record_for(&job, Err(JudgeError::Cancelled.into()));
        assert_eq!(record.state, JobState::Cancelled);
        assert!(record.report.is_none());
    }

    #[test]
    fn test_failed_record_keeps_error() {
        let job = GradingJob::new("s1", "A9");
        let record = record_for(&job, Err(anyhow::anyhow!("Assignment 'A9' not found")));
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.error.as_deref(), Some("Assignment 'A9' not found"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_grade_unknown_assignment_fails_job() {
        let client = ::redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let mut conn = ::redis::aio::ConnectionManager::new(client).await.unwrap();
        let submissions = tempfile::tempdir().unwrap();
        let ctx = GradingContext {
            assignments: AssignmentConfigManager::from_configs(Vec::new()).unwrap(),
            fixtures: FixtureStore::default(),
            submissions: LocalSubmissions::new(submissions.path()),
            cancel_poll_interval: Duration::from_millis(100),
        };

        let job = GradingJob::new("s1", "missing");
        match grade(&job, &ctx, &mut conn, &CancellationToken::new()).await {
            GradeOutcome::Finished(record) => assert_eq!(record.state, JobState::Failed),
            GradeOutcome::Interrupted => panic!("job should not be interrupted"),
        }
    }
}
