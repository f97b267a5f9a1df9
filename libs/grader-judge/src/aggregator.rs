/// Result Aggregator - Counts, Ratio and Multiplier
///
/// **Core Responsibility:**
/// Fold the per-target reports of one judging pass into the report totals.
///
/// **Rules:**
/// - pass_ratio = pass / (pass + fail), absent when nothing ran
/// - failure ratio for the multiplier = (fail + not_run) / configured fixtures
/// - multiplier comes from the assignment's step policy, 1.0 when nothing failed
/// - zero configured fixtures is its own state, never a division by zero
/// - results carrying a phase label are also tallied per phase
///
/// Failure categories and hints are left empty here; the classifier fills them.
use grader_common::config::MultiplierPolicy;
use grader_common::types::{JudgingReport, PhaseSummary, ReportStatus, TargetReport};
use std::collections::BTreeSet;
use tracing::info;

/// Aggregate target reports into a judging report
pub fn aggregate(
    assignment_id: &str,
    targets: Vec<TargetReport>,
    policy: &MultiplierPolicy,
) -> JudgingReport {
    let mut pass_count = 0;
    let mut fail_count = 0;
    let mut not_run_count = 0;
    for target in &targets {
        for result in &target.results {
            if result.verdict.is_pass() {
                pass_count += 1;
            } else {
                fail_count += 1;
            }
        }
        not_run_count += target.not_run;
    }

    let phases = tally_phases(&targets);
    let configured = pass_count + fail_count + not_run_count;
    let no_tests_configured = configured == 0;
    let ran = pass_count + fail_count;
    let pass_ratio = (ran > 0).then(|| pass_count as f64 / ran as f64);

    let multiplier = if no_tests_configured {
        1.0
    } else {
        policy.multiplier_for((fail_count + not_run_count) as f64 / configured as f64)
    };

    let any_built = targets.iter().any(|t| t.compile.is_success());
    let status = if no_tests_configured {
        ReportStatus::NoTestsConfigured
    } else if !any_built {
        ReportStatus::CompileError
    } else if pass_count == configured {
        ReportStatus::Accepted
    } else if pass_count > 0 {
        ReportStatus::Partial
    } else {
        ReportStatus::Failed
    };

    info!(
        assignment_id,
        pass_count,
        fail_count,
        not_run_count,
        multiplier,
        status = ?status,
        "Aggregated judging results"
    );

    JudgingReport {
        assignment_id: assignment_id.to_string(),
        status,
        targets,
        pass_count,
        fail_count,
        not_run_count,
        phases,
        pass_ratio,
        multiplier,
        no_tests_configured,
        failure_categories: BTreeSet::new(),
        diagnostics: Vec::new(),
    }
}

fn tally_phases(targets: &[TargetReport]) -> Vec<PhaseSummary> {
    let mut phases: Vec<PhaseSummary> = Vec::new();
    for result in targets.iter().flat_map(|t| t.results.iter()) {
        let Some(label) = result.phase.as_deref() else {
            continue;
        };
        let index = match phases.iter().position(|p| p.label == label) {
            Some(index) => index,
            None => {
                phases.push(PhaseSummary { label: label.to_string(), pass: 0, fail: 0 });
                phases.len() - 1
            }
        };
        if result.verdict.is_pass() {
            phases[index].pass += 1;
        } else {
            phases[index].fail += 1;
        }
    }
    phases
}
