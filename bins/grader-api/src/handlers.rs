// HTTP route handlers for the grader API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use grader_common::config::AssignmentConfigManager;
use grader_common::redis;
use grader_common::types::{GradingJob, JobState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub student_id: String,
    pub assignment_id: String,
}

#[derive(Debug, Serialize)]
pub struct GradeResponse {
    pub job_id: String,
}

/// Reject requests the worker could never grade
pub fn validate_request(
    request: &GradeRequest,
    assignments: &AssignmentConfigManager,
) -> Result<(), (StatusCode, &'static str, String)> {
    let student_id = request.student_id.trim();
    if student_id.is_empty() || student_id.contains(['/', '\\']) || student_id == ".." || student_id == "." {
        return Err((
            StatusCode::BAD_REQUEST,
            "invalid_student",
            format!("Invalid student id '{}'", request.student_id),
        ));
    }
    if !assignments.contains(&request.assignment_id) {
        return Err((
            StatusCode::NOT_FOUND,
            "unknown_assignment",
            format!("Assignment '{}' is not configured", request.assignment_id),
        ));
    }
    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// POST /grade - Queue a submission for grading
pub async fn submit_grade(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GradeRequest>,
) -> Response {
    if let Err((status, reason, message)) = validate_request(&payload, &state.assignments) {
        warn!(
            student_id = %payload.student_id,
            assignment_id = %payload.assignment_id,
            reason,
            "Rejected grading request"
        );
        metrics::JOBS_REJECTED.with_label_values(&[reason]).inc();
        return error_response(status, message);
    }

    let job = GradingJob::new(payload.student_id.trim(), payload.assignment_id);

    // Push to Redis queue
    let mut conn = state.redis.clone();
    match redis::push_job(&mut conn, &job).await {
        Ok(_) => {
            info!(
                job_id = %job.id,
                student_id = %job.student_id,
                assignment_id = %job.assignment_id,
                "Job queued"
            );
            metrics::JOBS_SUBMITTED
                .with_label_values(&[job.assignment_id.as_str()])
                .inc();
            (
                StatusCode::CREATED,
                Json(GradeResponse {
                    job_id: job.id.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Failed to queue job");
            metrics::JOBS_REJECTED.with_label_values(&["queue_error"]).inc();
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to queue job: {}", e),
            )
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn export_metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render metrics")
        }
    }
}

/// GET /report/{job_id} - Query a grading record
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    // Parse job ID
    let Ok(job_uuid) = Uuid::parse_str(&job_id) else {
        metrics::REPORT_LOOKUPS.with_label_values(&["invalid"]).inc();
        return error_response(StatusCode::BAD_REQUEST, "Invalid job ID format");
    };

    let mut conn = state.redis.clone();
    match redis::get_record(&mut conn, &job_uuid).await {
        Ok(Some(record)) => {
            info!(job_id = %job_id, state = ?record.state, "Grading record retrieved");
            metrics::REPORT_LOOKUPS.with_label_values(&["ready"]).inc();
            (StatusCode::OK, Json(record)).into_response()
        }
        Ok(None) => {
            // Record not found - job may still be queued/running
            let status = match redis::get_status(&mut conn, &job_uuid).await {
                Ok(Some(JobState::Running)) => "running",
                Ok(Some(JobState::Queued)) => "queued",
                _ => "pending",
            };
            info!(job_id = %job_id, status, "Job still pending");
            metrics::REPORT_LOOKUPS.with_label_values(&["pending"]).inc();
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": status,
                    "message": "Job is queued or still being graded"
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch grading record");
            metrics::REPORT_LOOKUPS.with_label_values(&["error"]).inc();
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query job status: {}", e),
            )
        }
    }
}

/// POST /job/{job_id}/cancel - Ask the worker to stop a job
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(job_uuid) = Uuid::parse_str(&job_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid job ID format");
    };

    let mut conn = state.redis.clone();
    match redis::get_record(&mut conn, &job_uuid).await {
        Ok(Some(record)) => {
            return (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": record.state,
                    "message": "Job has already finished"
                })),
            )
                .into_response();
        }
        Ok(None) => {}
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch grading record");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query job status: {}", e),
            );
        }
    }

    match redis::request_cancel(&mut conn, &job_uuid).await {
        Ok(_) => {
            info!(job_id = %job_id, "Cancellation requested");
            metrics::CANCEL_REQUESTS.inc();
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": "cancellation_requested"
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to request cancellation");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to request cancellation: {}", e),
            )
        }
    }
}
