/// End-to-end tests for the judging pass
///
/// "Submissions" are shell scripts and the toolchain is a `cp` + `chmod`
/// command, so every stage runs for real (resolve, build, execute, compare)
/// without needing a C++ compiler:
/// 1. Repeated passes over the same submission give the same report
/// 2. Zero fixtures gives no-tests-configured
/// 3. Build failures stop fixtures from running
/// 4. Runaway programs time out and their process group is gone afterwards
/// 5. Multi-file targets judge independently, per phase
/// 6. Cancellation and broken toolchains surface as errors

#[cfg(all(test, unix))]
mod pass_tests {
    use crate::error::JudgeError;
    use crate::fixtures::{self, FixtureGroup};
    use crate::judge::judge;
    use grader_common::config::AssignmentConfig;
    use grader_common::types::{
        CompileVerdict, FailureCategory, JudgingReport, ReportStatus, Verdict,
    };
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const COPY_TOOLCHAIN: [&str; 4] = ["sh", "-c", "cp \"$0\" {output} && chmod +x {output}", "{sources}"];

    /// Doubles its input; `loop` spins forever after leaving a background
    /// sleeper whose pid goes to the file named by $1
    const DOUBLER: &str = r#"#!/bin/sh
read n
if [ "$n" = "loop" ]; then
    sleep 300 &
    if [ -n "$1" ]; then echo $! > "$1"; fi
    while :; do :; done
fi
echo $((n * 2))
"#;

    struct Workspace {
        _root: TempDir,
        submission: std::path::PathBuf,
        fixtures: std::path::PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let submission = root.path().join("submission");
            let fixtures = root.path().join("fixtures");
            fs::create_dir_all(&submission).unwrap();
            fs::create_dir_all(&fixtures).unwrap();
            Self { _root: root, submission, fixtures }
        }

        fn source(&self, rel: &str, body: &str) -> &Self {
            let path = self.submission.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
            self
        }

        fn fixture(&self, dir: &str, id: &str, input: &str, expected: &str) -> &Self {
            let dir = self.fixtures.join(dir);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{}.in", id)), input).unwrap();
            fs::write(dir.join(format!("{}.out", id)), expected).unwrap();
            self
        }

        fn config(&self, overrides: serde_json::Value) -> AssignmentConfig {
            let mut value = serde_json::json!({
                "id": "A1",
                "build": { "mode": "single-file", "default_source": "main.sh", "extensions": ["sh"] },
                "toolchain": COPY_TOOLCHAIN,
                "fixtures_dir": self.fixtures,
                "timeout_secs": 1,
                "compile_timeout_secs": 10,
            });
            if let (Some(base), Some(extra)) = (value.as_object_mut(), overrides.as_object()) {
                base.extend(extra.clone());
            }
            let config: AssignmentConfig = serde_json::from_value(value).unwrap();
            config.validate().unwrap();
            config
        }

        fn groups(&self, config: &AssignmentConfig) -> Vec<FixtureGroup> {
            fixtures::load_assignment(config).unwrap()
        }

        async fn judge(&self, config: &AssignmentConfig) -> Result<JudgingReport, JudgeError> {
            judge(&self.submission, config, &self.groups(config), &CancellationToken::new()).await
        }
    }

    fn verdicts(report: &JudgingReport) -> Vec<Verdict> {
        report.results().map(|r| r.verdict).collect()
    }

    /// True once the pid is gone or only a zombie is left
    fn process_gone(pid: &str) -> bool {
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state == "Z"),
        }
    }

    #[tokio::test]
    async fn test_repeated_passes_agree() {
        let ws = Workspace::new();
        ws.source("main.sh", DOUBLER)
            .fixture(".", "1", "2\n", "4\n")
            .fixture(".", "2", "5\n", "10\n")
            .fixture(".", "3", "7\n", "15\n");
        let config = ws.config(serde_json::json!({}));

        let first = ws.judge(&config).await.unwrap();
        let second = ws.judge(&config).await.unwrap();

        assert_eq!(verdicts(&first), vec![Verdict::Pass, Verdict::Pass, Verdict::WrongAnswer]);
        assert_eq!(verdicts(&first), verdicts(&second));
        assert_eq!(first.status, second.status);
        assert_eq!(first.multiplier, second.multiplier);
        assert_eq!(first.failure_categories, second.failure_categories);
        assert_eq!(first.diagnostics, second.diagnostics);
        // Build artifacts never land in the submission itself
        assert!(!ws.submission.join("student_program").exists());
    }

    #[tokio::test]
    async fn test_zero_fixtures() {
        let ws = Workspace::new();
        ws.source("main.sh", DOUBLER);
        let report = ws.judge(&ws.config(serde_json::json!({}))).await.unwrap();

        assert_eq!(report.status, ReportStatus::NoTestsConfigured);
        assert!(report.no_tests_configured);
        assert_eq!(report.multiplier, 1.0);
        assert_eq!(report.pass_ratio, None);
    }

    #[tokio::test]
    async fn test_compile_failure_runs_nothing() {
        let ws = Workspace::new();
        ws.source("main.sh", DOUBLER)
            .fixture(".", "1", "2\n", "4\n")
            .fixture(".", "2", "3\n", "6\n");
        let config = ws.config(serde_json::json!({
            "toolchain": ["sh", "-c", "echo 'main.cpp:1:1: error: expected declaration' >&2; exit 1"]
        }));

        let report = ws.judge(&config).await.unwrap();

        assert_eq!(report.status, ReportStatus::CompileError);
        assert_eq!(report.compile_verdict(), CompileVerdict::CompileError);
        assert_eq!(report.results().count(), 0);
        assert_eq!(report.not_run_count, 2);
        assert!(report.targets[0]
            .compile_output
            .as_deref()
            .is_some_and(|out| out.contains("expected declaration")));
        assert_eq!(report.failure_categories, BTreeSet::from([FailureCategory::Compilation]));
    }

    #[tokio::test]
    async fn test_missing_source_is_build_target_not_found() {
        let ws = Workspace::new();
        ws.source("notes.txt", "no code here").fixture(".", "1", "2\n", "4\n");

        let report = ws.judge(&ws.config(serde_json::json!({}))).await.unwrap();

        assert_eq!(report.compile_verdict(), CompileVerdict::BuildTargetNotFound);
        assert_eq!(report.status, ReportStatus::CompileError);
        assert!(report.failure_categories.contains(&FailureCategory::Compilation));
    }

    #[tokio::test]
    async fn test_runaway_fixture_times_out_and_group_is_killed() {
        let ws = Workspace::new();
        let pid_file = ws.fixtures.join("sleeper.pid");
        ws.source("main.sh", DOUBLER)
            .fixture(".", "1", "loop\n", "0\n")
            .fixture(".", "2", "4\n", "8\n");
        let config = ws.config(serde_json::json!({ "extra_args": ["sleeper.pid"] }));

        let start = Instant::now();
        let report = ws.judge(&config).await.unwrap();

        assert_eq!(verdicts(&report), vec![Verdict::Timeout, Verdict::Pass]);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(report.failure_categories, BTreeSet::from([FailureCategory::Timeout]));

        let pid = fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(3);
        while !process_gone(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(process_gone(pid), "background child {} survived the pass", pid);
    }

    #[tokio::test]
    async fn test_eight_pass_two_timeouts() {
        let ws = Workspace::new();
        ws.source("main.sh", DOUBLER);
        for i in 1..=8 {
            ws.fixture(".", &i.to_string(), &format!("{}\n", i), &format!("{}\n", i * 2));
        }
        ws.fixture(".", "9", "loop\n", "0\n").fixture(".", "10", "loop\n", "0\n");

        let report = ws.judge(&ws.config(serde_json::json!({}))).await.unwrap();

        assert_eq!(report.pass_count, 8);
        assert_eq!(report.fail_count, 2);
        assert_eq!(report.count_verdict(Verdict::Timeout), 2);
        assert_eq!(report.multiplier, 0.8);
        assert_eq!(report.failure_categories, BTreeSet::from([FailureCategory::Timeout]));
        // Numeric ordering puts 10 last
        assert_eq!(report.results().last().map(|r| r.fixture_id.as_str()), Some("10"));
    }

    #[tokio::test]
    async fn test_multi_file_targets_with_phases() {
        let ws = Workspace::new();
        ws.source("q1/main.sh", DOUBLER)
            .fixture("phase1", "1", "3\n", "6\n")
            .fixture("phase2", "1", "1\n", "2\n")
            .fixture("phase2", "2", "2\n", "4\n");
        let config = ws.config(serde_json::json!({
            "id": "A6",
            "build": {
                "mode": "multi-file",
                "targets": [
                    { "name": "q1", "sources": ["q1/*.sh"], "executable": "q1_bin", "phase": "phase1" },
                    { "name": "q2", "sources": ["q2/main.sh"], "phase": "phase2" }
                ]
            },
            "phases": [
                { "name": "phase1", "fixtures": "phase1" },
                { "name": "phase2", "fixtures": "phase2" }
            ]
        }));

        let report = ws.judge(&config).await.unwrap();

        assert_eq!(report.targets.len(), 2);
        assert_eq!(report.targets[0].compile, CompileVerdict::Success);
        assert_eq!(report.targets[0].results.len(), 1);
        assert_eq!(report.targets[0].results[0].phase.as_deref(), Some("phase1"));
        assert_eq!(report.targets[1].compile, CompileVerdict::BuildTargetNotFound);
        assert_eq!(report.targets[1].not_run, 2);
        assert_eq!(report.phases.len(), 1);
        assert_eq!((report.phases[0].label.as_str(), report.phases[0].pass), ("phase1", 1));

        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.pass_ratio, Some(1.0));
        // 2 of 3 fixtures never ran
        assert_eq!(report.multiplier, 0.4);
        assert_eq!(report.failure_categories, BTreeSet::from([FailureCategory::Compilation]));
    }

    #[tokio::test]
    async fn test_target_without_output_does_not_reuse_earlier_binary() {
        let ws = Workspace::new();
        ws.source("q1/main.sh", DOUBLER)
            .source("q2/main.sh", DOUBLER)
            .fixture("q1", "1", "3\n", "6\n")
            .fixture("q2", "1", "4\n", "8\n");
        let config = ws.config(serde_json::json!({
            "id": "A3",
            "build": {
                "mode": "multi-file",
                "targets": [
                    { "name": "q1", "sources": ["q1/main.sh"], "phase": "q1" },
                    { "name": "q2", "sources": ["q2/main.sh"], "phase": "q2" }
                ]
            },
            "phases": [
                { "name": "q1", "fixtures": "q1" },
                { "name": "q2", "fixtures": "q2" }
            ],
            // q2 "builds" cleanly but writes nothing
            "toolchain": [
                "sh", "-c",
                "case \"$0\" in q2/*) exit 0;; esac; cp \"$0\" {output} && chmod +x {output}",
                "{sources}"
            ]
        }));

        let report = ws.judge(&config).await.unwrap();

        assert_eq!(report.targets[0].compile, CompileVerdict::Success);
        assert_eq!(verdicts(&report), vec![Verdict::Pass]);
        assert_eq!(report.targets[1].compile, CompileVerdict::CompileError);
        assert!(report.targets[1].results.is_empty());
        assert_eq!(report.targets[1].not_run, 1);
    }

    #[tokio::test]
    async fn test_committed_executable_is_not_judged() {
        let ws = Workspace::new();
        ws.source("main.sh", DOUBLER)
            .source("student_program", DOUBLER)
            .fixture(".", "1", "2\n", "4\n");
        let config = ws.config(serde_json::json!({ "toolchain": ["true"] }));

        let report = ws.judge(&config).await.unwrap();

        assert_eq!(report.compile_verdict(), CompileVerdict::CompileError);
        assert_eq!(report.results().count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_pass() {
        let ws = Workspace::new();
        ws.source("main.sh", DOUBLER).fixture(".", "1", "loop\n", "0\n");
        let config = ws.config(serde_json::json!({ "timeout_secs": 60 }));
        let groups = ws.groups(&config);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = judge(&ws.submission, &config, &groups, &cancel).await;
        assert!(matches!(result, Err(JudgeError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_invocation_error() {
        let ws = Workspace::new();
        ws.source("main.sh", DOUBLER).fixture(".", "1", "2\n", "4\n");
        let config = ws.config(serde_json::json!({ "toolchain": ["no-such-toolchain-xyz", "{sources}"] }));

        let result = ws.judge(&config).await;
        assert!(matches!(result, Err(JudgeError::Invocation { .. })));
    }

    #[tokio::test]
    async fn test_missing_submission_is_io_error() {
        let ws = Workspace::new();
        let config = ws.config(serde_json::json!({}));
        let result = judge(
            Path::new("/nonexistent/submission"),
            &config,
            &ws.groups(&config),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(JudgeError::Io { .. })));
    }
}
