//! Test Runner - execute one built program against its fixtures.
//!
//! Fixtures run one after another, each in a fresh process with its own
//! capture buffers. The runner only assigns execution verdicts; output
//! matching is delegated to the comparator.

use crate::comparator;
use crate::error::JudgeError;
use crate::process::{self, ProcessOutput, ProcessSpec, MAX_CAPTURE_BYTES};
use grader_common::config::{AssignmentConfig, ComparisonMode};
use grader_common::types::{Fixture, TestResult, Verdict};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra program arguments, with relative paths anchored at the fixtures directory
pub fn resolve_extra_args(config: &AssignmentConfig) -> Vec<OsString> {
    config
        .extra_args
        .iter()
        .map(|arg| {
            let path = Path::new(arg);
            if path.is_absolute() {
                path.as_os_str().to_os_string()
            } else {
                config.fixtures_dir.join(path).into_os_string()
            }
        })
        .collect()
}

pub struct TestRunner<'a> {
    executable: PathBuf,
    work_dir: &'a Path,
    args: Vec<OsString>,
    timeout: Duration,
    comparison: ComparisonMode,
    allow_nonzero_exit: bool,
    verbose_diff: bool,
    diff_lines: usize,
    max_output_bytes: usize,
}

impl<'a> TestRunner<'a> {
    pub fn new(config: &AssignmentConfig, executable: PathBuf, work_dir: &'a Path) -> Self {
        Self {
            executable,
            work_dir,
            args: resolve_extra_args(config),
            timeout: Duration::from_secs(config.timeout_secs),
            comparison: config.comparison,
            allow_nonzero_exit: config.allow_nonzero_exit,
            verbose_diff: config.verbose_diff,
            diff_lines: config.diff_lines,
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// Run every fixture in order
    ///
    /// Only cancellation or an environment failure stops the loop early;
    /// per-fixture failures are recorded as verdicts.
    pub async fn run_all(
        &self,
        fixtures: &[Fixture],
        cancel: &CancellationToken,
    ) -> Result<Vec<TestResult>, JudgeError> {
        info!(
            executable = %self.executable.display(),
            fixtures = fixtures.len(),
            timeout_secs = self.timeout.as_secs(),
            "Running fixtures"
        );

        let mut results = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            if cancel.is_cancelled() {
                warn!(completed = results.len(), total = fixtures.len(), "Cancelled between fixtures");
                return Err(JudgeError::Cancelled);
            }
            results.push(self.run_fixture(fixture, cancel).await?);
        }
        Ok(results)
    }

    pub async fn run_fixture(
        &self,
        fixture: &Fixture,
        cancel: &CancellationToken,
    ) -> Result<TestResult, JudgeError> {
        let spec = ProcessSpec {
            program: self.executable.clone().into_os_string(),
            args: self.args.clone(),
            cwd: self.work_dir,
            stdin: Some(fixture.input.as_bytes()),
            timeout: self.timeout,
            capture_limit: MAX_CAPTURE_BYTES,
        };

        let output = match process::run_bounded(spec, cancel).await {
            Ok(output) => output,
            Err(JudgeError::Invocation { program, source }) => {
                // The toolchain produced something that cannot be executed
                warn!(fixture = %fixture.id, program = %program, error = %source, "Executable failed to start");
                return Ok(self.record(
                    fixture,
                    Verdict::RuntimeError,
                    String::new(),
                    format!("failed to start {}: {}", program, source),
                    None,
                    0,
                    None,
                ));
            }
            Err(e) => return Err(e),
        };

        let verdict = self.verdict(&output, fixture);
        let diff = (verdict == Verdict::WrongAnswer && self.verbose_diff)
            .then(|| comparator::side_by_side_diff(&fixture.expected_output, &output.stdout, self.diff_lines));

        debug!(
            fixture = %fixture.id,
            verdict = %verdict,
            exit_code = ?output.exit_code(),
            execution_time_ms = output.elapsed_ms(),
            "Fixture finished"
        );
        if verdict == Verdict::RuntimeError {
            debug!(
                fixture = %fixture.id,
                signal = ?output.signal(),
                stderr = output.stderr.lines().next().unwrap_or(""),
                "Runtime error"
            );
        }

        let exit_code = output.exit_code();
        let elapsed = output.elapsed_ms();
        Ok(self.record(fixture, verdict, output.stdout, output.stderr, exit_code, elapsed, diff))
    }

    /// Timeout beats crash, crash beats output comparison
    fn verdict(&self, output: &ProcessOutput, fixture: &Fixture) -> Verdict {
        if output.timed_out() {
            Verdict::Timeout
        } else if output.signal().is_some() || (!output.success() && !self.allow_nonzero_exit) {
            Verdict::RuntimeError
        } else {
            comparator::compare(&output.stdout, &fixture.expected_output, self.comparison)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        fixture: &Fixture,
        verdict: Verdict,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        execution_time_ms: u64,
        diff: Option<String>,
    ) -> TestResult {
        TestResult {
            fixture_id: fixture.id.clone(),
            phase: fixture.phase.clone(),
            verdict,
            stdout: process::truncate_text(&stdout, self.max_output_bytes),
            stderr: process::truncate_text(&stderr, self.max_output_bytes),
            exit_code,
            execution_time_ms,
            diff,
        }
    }
}
