use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// A grading request as it travels through the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingJob {
    pub id: Uuid,
    pub student_id: String,
    pub assignment_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl GradingJob {
    pub fn new(student_id: impl Into<String>, assignment_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: student_id.into(),
            assignment_id: assignment_id.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// One stored input/expected-output pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub phase: Option<String>,
    pub input: String,
    pub expected_output: String,
}

/// Outcome of running one fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Pass,
    WrongAnswer,
    Timeout,
    RuntimeError,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Pass => "pass",
            Verdict::WrongAnswer => "wrong-answer",
            Verdict::Timeout => "timeout",
            Verdict::RuntimeError => "runtime-error",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of the build stage of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompileVerdict {
    Success,
    CompileError,
    BuildTargetNotFound,
}

impl CompileVerdict {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileVerdict::Success)
    }
}

impl fmt::Display for CompileVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompileVerdict::Success => "success",
            CompileVerdict::CompileError => "compile-error",
            CompileVerdict::BuildTargetNotFound => "build-target-not-found",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub fixture_id: String,
    pub phase: Option<String>,
    pub verdict: Verdict,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    /// Side-by-side diff, only present when verbose diffs are enabled
    pub diff: Option<String>,
}

/// Build and run record for one build target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub compile: CompileVerdict,
    pub compile_output: Option<String>,
    pub results: Vec<TestResult>,
    /// Fixtures assigned to this target that never ran because it did not build
    pub not_run: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    /// Every fixture passed
    Accepted,
    /// At least one fixture passed, at least one did not
    Partial,
    /// Fixtures ran but none passed
    Failed,
    /// No target produced an executable
    CompileError,
    NoTestsConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Compilation,
    Timeout,
    Logic,
    Runtime,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCategory::Compilation => "compilation",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Logic => "logic",
            FailureCategory::Runtime => "runtime",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: FailureCategory,
    pub hint: String,
}

/// Pass/fail tally of the fixtures that ran under one phase label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub label: String,
    pub pass: usize,
    pub fail: usize,
}

/// Complete outcome of one judging pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgingReport {
    pub assignment_id: String,
    pub status: ReportStatus,
    pub targets: Vec<TargetReport>,
    pub pass_count: usize,
    pub fail_count: usize,
    pub not_run_count: usize,
    /// Per-phase tallies in the order phases were judged; empty without phases
    #[serde(default)]
    pub phases: Vec<PhaseSummary>,
    pub pass_ratio: Option<f64>,
    pub multiplier: f64,
    pub no_tests_configured: bool,
    pub failure_categories: BTreeSet<FailureCategory>,
    pub diagnostics: Vec<Diagnostic>,
}

impl JudgingReport {
    /// First non-successful compile verdict across targets, or `Success`
    pub fn compile_verdict(&self) -> CompileVerdict {
        self.targets
            .iter()
            .map(|t| t.compile)
            .find(|v| !v.is_success())
            .unwrap_or(CompileVerdict::Success)
    }

    /// All per-fixture results in target order
    pub fn results(&self) -> impl Iterator<Item = &TestResult> {
        self.targets.iter().flat_map(|t| t.results.iter())
    }

    pub fn count_verdict(&self, verdict: Verdict) -> usize {
        self.results().filter(|r| r.verdict == verdict).count()
    }
}

/// Lifecycle state of a queued grading job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// What the worker persists for each job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRecord {
    pub job_id: Uuid,
    pub student_id: String,
    pub assignment_id: String,
    pub state: JobState,
    pub report: Option<JudgingReport>,
    pub error: Option<String>,
    pub graded_at: DateTime<Utc>,
}
