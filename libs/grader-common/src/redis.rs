use crate::types::{GradingJob, GradingRecord, JobState};
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics - defines only semantics, not runtime logic
/// Keeps API and worker from drifting apart on key names

pub const QUEUE_NAME: &str = "grader:queue";
pub const REPORT_PREFIX: &str = "grader:report";
pub const STATUS_PREFIX: &str = "grader:status";
pub const CANCEL_PREFIX: &str = "grader:cancel";

/// Reports and status entries expire after 24 hours
pub const RECORD_TTL_SECS: u64 = 86400;

/// Generate report key for a job
pub fn report_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", REPORT_PREFIX, job_id)
}

/// Generate status key for a job
pub fn status_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, job_id)
}

/// Generate cancellation flag key for a job
pub fn cancel_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", CANCEL_PREFIX, job_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Push a grading job to the queue
/// Uses RPUSH for FIFO semantics
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    job: &GradingJob,
) -> RedisResult<()> {
    let payload = serde_json::to_string(job).map_err(serialization_error)?;
    let _: () = conn.rpush(QUEUE_NAME, payload).await?;
    set_status(conn, &job.id, JobState::Queued).await
}

/// Pop a grading job from the queue
/// Uses BLPOP with timeout for graceful shutdown
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<GradingJob>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_NAME, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: GradingJob = serde_json::from_str(&payload).map_err(serialization_error)?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

pub async fn set_status(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
    state: JobState,
) -> RedisResult<()> {
    let payload = serde_json::to_string(&state).map_err(serialization_error)?;
    conn.set_ex(status_key(job_id), payload, RECORD_TTL_SECS as _).await
}

pub async fn get_status(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<JobState>> {
    let payload: Option<String> = conn.get(status_key(job_id)).await?;
    payload
        .map(|data| serde_json::from_str(&data).map_err(serialization_error))
        .transpose()
}

/// Store a grading record together with its status
pub async fn store_record(
    conn: &mut redis::aio::ConnectionManager,
    record: &GradingRecord,
) -> RedisResult<()> {
    let payload = serde_json::to_string(record).map_err(serialization_error)?;
    let _: () = conn.set_ex(report_key(&record.job_id), payload, RECORD_TTL_SECS as _).await?;
    set_status(conn, &record.job_id, record.state).await
}

/// Retrieve a grading record
pub async fn get_record(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<GradingRecord>> {
    let payload: Option<String> = conn.get(report_key(job_id)).await?;
    payload
        .map(|data| serde_json::from_str(&data).map_err(serialization_error))
        .transpose()
}

/// Flag a job for cancellation; the worker polls this key while judging
pub async fn request_cancel(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<()> {
    conn.set_ex(cancel_key(job_id), "1", RECORD_TTL_SECS as _).await
}

pub async fn is_job_cancelled(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<bool> {
    conn.exists(cancel_key(job_id)).await
}
