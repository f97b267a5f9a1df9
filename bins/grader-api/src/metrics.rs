// Prometheus metrics for the grader API
use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref JOBS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "grader_jobs_submitted_total",
        "Grading jobs accepted onto the queue",
        &["assignment_id"]
    )
    .expect("grader_jobs_submitted_total registers once");
    pub static ref JOBS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "grader_jobs_rejected_total",
        "Grading requests refused before queueing",
        &["reason"]
    )
    .expect("grader_jobs_rejected_total registers once");
    pub static ref CANCEL_REQUESTS: IntCounter = register_int_counter!(
        "grader_cancel_requests_total",
        "Cancellation requests accepted"
    )
    .expect("grader_cancel_requests_total registers once");
    pub static ref REPORT_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "grader_report_lookups_total",
        "Report lookups by outcome",
        &["outcome"]
    )
    .expect("grader_report_lookups_total registers once");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        JOBS_SUBMITTED.with_label_values(&["A1"]).inc();
        REPORT_LOOKUPS.with_label_values(&["pending"]).inc();
        CANCEL_REQUESTS.inc();

        let text = render().unwrap();
        assert!(text.contains("grader_jobs_submitted_total{assignment_id=\"A1\"}"));
        assert!(text.contains("grader_report_lookups_total{outcome=\"pending\"}"));
        assert!(text.contains("grader_cancel_requests_total"));
    }
}
