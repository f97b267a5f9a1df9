/// Judging Pass - Resolve, Build, Run, Aggregate, Classify
///
/// **Core Responsibility:**
/// Take one submission through the full pipeline for one assignment and
/// return a complete report.
///
/// **Pass Lifecycle:**
/// 1. Copy the submission into a fresh scratch directory
/// 2. Resolve build targets
/// 3. Build each target, then run the fixtures assigned to it
/// 4. Aggregate counts and multiplier, classify failures
/// 5. Drop the scratch directory with every artifact in it
///
/// The submission directory itself is never written to, so a pass can be
/// repeated any number of times with the same result.
use crate::aggregator;
use crate::classifier;
use crate::compiler::{self, CompilationResult, CompileRequest};
use crate::error::JudgeError;
use crate::fixtures::FixtureGroup;
use crate::resolver::{self, TargetPlan};
use crate::runner::TestRunner;
use grader_common::config::AssignmentConfig;
use grader_common::types::{CompileVerdict, Fixture, JudgingReport, TargetReport};
use ignore::WalkBuilder;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Judge one submission against one assignment
#[instrument(skip_all, fields(assignment_id = %config.id, submission = %submission_root.display()))]
pub async fn judge(
    submission_root: &Path,
    config: &AssignmentConfig,
    fixtures: &[FixtureGroup],
    cancel: &CancellationToken,
) -> Result<JudgingReport, JudgeError> {
    let scratch = tempfile::Builder::new()
        .prefix("grader-pass-")
        .tempdir()
        .map_err(|e| JudgeError::io(std::env::temp_dir(), e))?;
    copy_submission(submission_root, scratch.path())?;

    let plans = resolver::resolve(scratch.path(), config);
    let toolchain = config.toolchain_command();
    info!(
        targets = plans.len(),
        fixtures = fixtures.iter().map(|g| g.fixtures.len()).sum::<usize>(),
        "Starting judging pass"
    );

    let mut targets = Vec::with_capacity(plans.len());
    for plan in &plans {
        if cancel.is_cancelled() {
            return Err(JudgeError::Cancelled);
        }
        let assigned = fixtures_for(fixtures, plan.phase.as_deref());
        targets.push(judge_target(scratch.path(), config, &toolchain, plan, &assigned, cancel).await?);
    }

    let mut report = aggregator::aggregate(&config.id, targets, &config.multiplier);
    classifier::classify(&mut report);

    info!(
        status = ?report.status,
        multiplier = report.multiplier,
        categories = ?report.failure_categories,
        "Judging pass complete"
    );
    Ok(report)
}

async fn judge_target(
    build_dir: &Path,
    config: &AssignmentConfig,
    toolchain: &[String],
    plan: &TargetPlan,
    fixtures: &[Fixture],
    cancel: &CancellationToken,
) -> Result<TargetReport, JudgeError> {
    let unit = match &plan.unit {
        Ok(unit) => unit,
        Err(not_found) => {
            warn!(target_name = %plan.name, reason = %not_found.0, "Build target not found");
            return Ok(TargetReport {
                target: plan.name.clone(),
                compile: CompileVerdict::BuildTargetNotFound,
                compile_output: Some(not_found.0.clone()),
                results: Vec::new(),
                not_run: fixtures.len(),
            });
        }
    };

    let compiled = compiler::compile(
        CompileRequest {
            build_dir,
            unit,
            toolchain,
            executable: &plan.executable,
            timeout: Duration::from_secs(config.compile_timeout_secs),
            diagnostics_limit: config.max_output_bytes,
        },
        cancel,
    )
    .await?;

    match compiled {
        CompilationResult::Failure { diagnostics } => Ok(TargetReport {
            target: plan.name.clone(),
            compile: CompileVerdict::CompileError,
            compile_output: Some(diagnostics),
            results: Vec::new(),
            not_run: fixtures.len(),
        }),
        CompilationResult::Success { executable } => {
            let results = TestRunner::new(config, executable, build_dir)
                .run_all(fixtures, cancel)
                .await?;
            Ok(TargetReport {
                target: plan.name.clone(),
                compile: CompileVerdict::Success,
                compile_output: None,
                results,
                not_run: 0,
            })
        }
    }
}

/// Fixtures judged against a target: one phase, or every group in order
fn fixtures_for(groups: &[FixtureGroup], phase: Option<&str>) -> Vec<Fixture> {
    groups
        .iter()
        .filter(|g| phase.is_none() || g.phase.as_deref() == phase)
        .flat_map(|g| g.fixtures.iter().cloned())
        .collect()
}

/// Copy a submission tree into the scratch directory, skipping `.git` and symlinks
fn copy_submission(from: &Path, to: &Path) -> Result<(), JudgeError> {
    if !from.is_dir() {
        return Err(JudgeError::io(
            from,
            std::io::Error::new(std::io::ErrorKind::NotFound, "submission directory not found"),
        ));
    }

    let walker = WalkBuilder::new(from)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| {
            JudgeError::io(from, std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let dest = to.join(rel);
        match entry.file_type() {
            Some(ft) if ft.is_dir() => {
                fs::create_dir_all(&dest).map_err(|e| JudgeError::io(&dest, e))?;
            }
            Some(ft) if ft.is_file() => {
                fs::copy(entry.path(), &dest).map_err(|e| JudgeError::io(&dest, e))?;
            }
            _ => {}
        }
    }
    Ok(())
}
