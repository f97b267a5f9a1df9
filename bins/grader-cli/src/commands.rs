// CLI commands for the grader
use anyhow::{bail, Context, Result};
use grader_common::config::{AssignmentConfigManager, AssignmentProvider, AssignmentsJson, BuildMode};
use grader_common::types::{CompileVerdict, JudgingReport, ReportStatus};
use grader_judge::{judge, FixtureStore};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Load assignment configuration from an explicit path or the default location
fn load_config(path: Option<&Path>) -> Result<AssignmentConfigManager> {
    match path {
        Some(path) => AssignmentConfigManager::load(path),
        None => AssignmentConfigManager::load_default(),
    }
}

/// Judge a submission directory and print the report
pub async fn judge_submission(
    config_path: Option<&Path>,
    assignment_id: &str,
    submission: &Path,
    json: bool,
) -> Result<()> {
    let manager = load_config(config_path)?;
    let config = manager.get_config(assignment_id)?;
    if !submission.is_dir() {
        bail!("Submission directory not found: {}", submission.display());
    }

    let groups = grader_judge::fixtures::load_assignment(config)
        .with_context(|| format!("Failed to load fixtures for '{}'", assignment_id))?;

    if !json {
        println!("🔨 Judging {} against {}...", submission.display(), assignment_id);
    }

    // Ctrl-C stops the pass and kills whatever is running
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let report = judge(submission, config, &groups, &cancel)
        .await
        .context("Judging pass failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

/// Human-readable summary of a judging report
pub fn render_report(report: &JudgingReport) -> String {
    let mut out = String::new();

    for target in &report.targets {
        let _ = writeln!(out, "\n📦 Target {}: {}", target.target, target.compile);
        if target.compile != CompileVerdict::Success {
            if let Some(output) = &target.compile_output {
                for line in output.lines().take(10) {
                    let _ = writeln!(out, "    {}", line);
                }
            }
            let _ = writeln!(out, "    {} fixture(s) not run", target.not_run);
            continue;
        }
        for result in &target.results {
            let mark = if result.verdict.is_pass() { "✅" } else { "❌" };
            let phase = result
                .phase
                .as_deref()
                .map(|p| format!("{}/", p))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} {}{}: {} ({}ms)",
                mark, phase, result.fixture_id, result.verdict, result.execution_time_ms
            );
            if let Some(diff) = &result.diff {
                for line in diff.lines() {
                    let _ = writeln!(out, "      {}", line);
                }
            }
        }
    }

    let _ = writeln!(out);
    if report.no_tests_configured {
        let _ = writeln!(out, "⚠️  No fixtures configured for {}", report.assignment_id);
    } else {
        let _ = writeln!(
            out,
            "📊 Passed {} / {} (not run: {})",
            report.pass_count,
            report.pass_count + report.fail_count + report.not_run_count,
            report.not_run_count
        );
        for phase in &report.phases {
            let _ = writeln!(out, "   {}: {} / {}", phase.label, phase.pass, phase.pass + phase.fail);
        }
    }
    let _ = writeln!(out, "   Multiplier: {}", report.multiplier);
    let _ = writeln!(out, "   Status: {}", status_label(report.status));

    if !report.diagnostics.is_empty() {
        let _ = writeln!(out, "\n💡 Hints:");
        for diagnostic in &report.diagnostics {
            let _ = writeln!(out, "  [{}] {}", diagnostic.category, diagnostic.hint);
        }
    }
    out
}

fn status_label(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::Accepted => "accepted",
        ReportStatus::Partial => "partial",
        ReportStatus::Failed => "failed",
        ReportStatus::CompileError => "compile-error",
        ReportStatus::NoTestsConfigured => "no-tests-configured",
    }
}

/// Validate configuration and load every fixture store
pub fn validate(config_path: Option<&Path>) -> Result<()> {
    println!("🔍 Validating assignment configuration...");
    let manager = load_config(config_path)?;
    println!("  ✅ {} assignment(s) parsed", manager.list_assignments().len());

    let store = FixtureStore::load(&manager).context("Fixture validation failed")?;
    for id in manager.list_assignments() {
        let total = store.total(&id);
        if total == 0 {
            println!("  ⚠️  {}: no fixtures (reports will be no-tests-configured)", id);
        } else {
            println!("  ✅ {}: {} fixture(s)", id, total);
        }
    }

    println!("✅ Configuration is valid");
    Ok(())
}

/// Print configured assignments
pub fn list_assignments(config_path: Option<&Path>) -> Result<()> {
    let manager = load_config(config_path)?;
    if manager.list_assignments().is_empty() {
        println!("No assignments configured");
        return Ok(());
    }

    println!("📋 Configured assignments:");
    for config in manager.iter() {
        let targets = match &config.build {
            BuildMode::MultiFile { targets } => format!(", {} target(s)", targets.len()),
            _ => String::new(),
        };
        let phases = if config.phases.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = config.phases.iter().map(|p| p.name.as_str()).collect();
            format!(", phases: {}", names.join(", "))
        };
        println!(
            "  {} {} [{}{}{}] timeout {}s",
            config.id,
            config.name,
            config.build.name(),
            targets,
            phases,
            config.timeout_secs
        );
    }
    Ok(())
}

/// Starter configuration written by `init`
fn sample_config() -> Result<AssignmentsJson> {
    let sample = serde_json::json!({
        "assignments": [
            {
                "id": "hello",
                "name": "Hello, sums",
                "build": { "mode": "single-file" },
                "fixtures_dir": "../test_cases/hello"
            }
        ]
    });
    serde_json::from_value(sample).context("Failed to build sample configuration")
}

/// Initialize a new grader project
pub async fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing grader project at: {}", path);

    let project_path = Path::new(path);

    // Create directories
    let dirs = ["config", "test_cases/hello", "submissions"];

    for dir in &dirs {
        let dir_path = project_path.join(dir);
        fs::create_dir_all(&dir_path)
            .with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  ✅ Created: {}", dir);
    }

    // Create default assignments.json
    let assignments_path = project_path.join("config/assignments.json");
    if !assignments_path.exists() {
        let json_content = serde_json::to_string_pretty(&sample_config()?)?;
        fs::write(&assignments_path, json_content)
            .context("Failed to write assignments.json")?;
        println!("  ✅ Created: config/assignments.json");
    }

    // One fixture so the sample assignment is judgeable right away
    let fixtures = [("1.in", "2 3\n"), ("1.out", "5\n")];
    for (name, content) in fixtures {
        let fixture_path = project_path.join("test_cases/hello").join(name);
        if !fixture_path.exists() {
            fs::write(&fixture_path, content)
                .with_context(|| format!("Failed to write {}", fixture_path.display()))?;
            println!("  ✅ Created: test_cases/hello/{}", name);
        }
    }

    println!("✅ Project initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Describe your assignments in config/assignments.json");
    println!("  2. Add <id>.in / <id>.out fixtures under test_cases/");
    println!("  3. Check everything: grader-cli validate");
    println!("  4. Try a submission: grader-cli judge --assignment hello --submission submissions/<student>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_common::types::{Diagnostic, FailureCategory, PhaseSummary, TargetReport, TestResult, Verdict};
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_init_project_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        init_project(root).await.unwrap();

        let manager = AssignmentConfigManager::load(&dir.path().join("config/assignments.json")).unwrap();
        assert_eq!(manager.list_assignments(), vec!["hello".to_string()]);

        let store = FixtureStore::load(&manager).unwrap();
        assert_eq!(store.total("hello"), 1);
    }

    #[tokio::test]
    async fn test_init_project_keeps_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/assignments.json"), "{\"assignments\": []}").unwrap();

        init_project(dir.path().to_str().unwrap()).await.unwrap();

        let content = fs::read_to_string(dir.path().join("config/assignments.json")).unwrap();
        assert_eq!(content, "{\"assignments\": []}");
    }

    #[test]
    fn test_render_report() {
        let report = JudgingReport {
            assignment_id: "A1".to_string(),
            status: ReportStatus::Partial,
            targets: vec![TargetReport {
                target: "A1".to_string(),
                compile: CompileVerdict::Success,
                compile_output: None,
                results: vec![
                    TestResult {
                        fixture_id: "1".to_string(),
                        phase: None,
                        verdict: Verdict::Pass,
                        stdout: "4\n".to_string(),
                        stderr: String::new(),
                        exit_code: Some(0),
                        execution_time_ms: 3,
                        diff: None,
                    },
                    TestResult {
                        fixture_id: "2".to_string(),
                        phase: None,
                        verdict: Verdict::Timeout,
                        stdout: String::new(),
                        stderr: String::new(),
                        exit_code: None,
                        execution_time_ms: 10000,
                        diff: None,
                    },
                ],
                not_run: 0,
            }],
            pass_count: 1,
            fail_count: 1,
            not_run_count: 0,
            phases: vec![PhaseSummary { label: "phase1".to_string(), pass: 1, fail: 1 }],
            pass_ratio: Some(0.5),
            multiplier: 0.6,
            no_tests_configured: false,
            failure_categories: BTreeSet::from([FailureCategory::Timeout]),
            diagnostics: vec![Diagnostic {
                category: FailureCategory::Timeout,
                hint: "Look for loops".to_string(),
            }],
        };

        let text = render_report(&report);
        assert!(text.contains("1: pass (3ms)"));
        assert!(text.contains("2: timeout (10000ms)"));
        assert!(text.contains("Passed 1 / 2"));
        assert!(text.contains("phase1: 1 / 2"));
        assert!(text.contains("Multiplier: 0.6"));
        assert!(text.contains("Status: partial"));
        assert!(text.contains("[timeout] Look for loops"));
    }
}
