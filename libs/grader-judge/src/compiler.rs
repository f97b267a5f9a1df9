//! Compiler Invoker - turn a resolved build unit into an executable.
//!
//! The toolchain always runs inside the pass's private build directory.

use crate::error::JudgeError;
use crate::process::{self, ProcessSpec, MAX_CAPTURE_BYTES};
use crate::resolver::BuildUnit;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SOURCES_PLACEHOLDER: &str = "{sources}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Result of one compile attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CompilationResult {
    Success { executable: PathBuf },
    Failure { diagnostics: String },
}

impl CompilationResult {
    pub fn failure(diagnostics: impl Into<String>) -> Self {
        CompilationResult::Failure {
            diagnostics: diagnostics.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompilationResult::Success { .. })
    }
}

pub struct CompileRequest<'a> {
    pub build_dir: &'a Path,
    pub unit: &'a BuildUnit,
    pub toolchain: &'a [String],
    pub executable: &'a str,
    pub timeout: Duration,
    pub diagnostics_limit: usize,
}

/// Expand the toolchain template for a build unit
///
/// `{sources}` must stand alone and expands to one argument per source file;
/// `{output}` and `{target}` are substituted inside arguments. An empty
/// `{target}` argument is dropped.
pub fn expand_toolchain(toolchain: &[String], unit: &BuildUnit, executable: &str) -> Vec<OsString> {
    let (sources, target): (&[PathBuf], &str) = match unit {
        BuildUnit::Sources(sources) => (sources, ""),
        BuildUnit::Makefile { target } => (&[], target.as_deref().unwrap_or("")),
    };

    let mut args = Vec::new();
    for arg in toolchain {
        if arg == SOURCES_PLACEHOLDER {
            args.extend(sources.iter().map(|s| s.as_os_str().to_os_string()));
            continue;
        }
        let expanded = arg
            .replace(OUTPUT_PLACEHOLDER, executable)
            .replace(TARGET_PLACEHOLDER, target);
        if expanded.is_empty() && arg.contains(TARGET_PLACEHOLDER) {
            continue;
        }
        args.push(OsString::from(expanded));
    }
    args
}

/// Run the toolchain and verify the executable exists afterwards
///
/// Compile failures and compile timeouts come back as
/// `CompilationResult::Failure`; a toolchain that cannot be spawned is an
/// `InvocationError` and propagates.
pub async fn compile(
    request: CompileRequest<'_>,
    cancel: &CancellationToken,
) -> Result<CompilationResult, JudgeError> {
    let mut argv = expand_toolchain(request.toolchain, request.unit, request.executable).into_iter();
    let Some(program) = argv.next() else {
        return Ok(CompilationResult::failure("toolchain command is empty"));
    };

    // Only an executable written by this build counts
    let executable = request.build_dir.join(request.executable);
    remove_stale(&executable).await?;

    let output = process::run_bounded(
        ProcessSpec {
            program,
            args: argv.collect(),
            cwd: request.build_dir,
            stdin: None,
            timeout: request.timeout,
            capture_limit: MAX_CAPTURE_BYTES,
        },
        cancel,
    )
    .await?;

    if output.timed_out() {
        warn!(timeout_secs = request.timeout.as_secs(), "Compilation timed out");
        return Ok(CompilationResult::failure(format!(
            "compilation timed out after {}s",
            request.timeout.as_secs()
        )));
    }

    if !output.success() {
        let exit_code = output.exit_code();
        let mut diagnostics = output.stderr;
        if !output.stdout.trim().is_empty() {
            diagnostics.push_str(&output.stdout);
        }
        warn!(
            exit_code = ?exit_code,
            error_preview = diagnostics.lines().next().unwrap_or(""),
            "Compilation failed"
        );
        return Ok(CompilationResult::failure(process::truncate_text(
            &diagnostics,
            request.diagnostics_limit,
        )));
    }

    if !executable.is_file() {
        warn!(executable = %executable.display(), "Build succeeded but produced no executable");
        return Ok(CompilationResult::failure(format!(
            "build succeeded but '{}' was not produced",
            request.executable
        )));
    }

    info!(compilation_time_ms = output.elapsed_ms(), "Compilation succeeded");
    Ok(CompilationResult::Success { executable })
}

async fn remove_stale(executable: &Path) -> Result<(), JudgeError> {
    match tokio::fs::remove_file(executable).await {
        Ok(()) => {
            debug!(executable = %executable.display(), "Removed stale executable");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JudgeError::io(executable, e)),
    }
}
