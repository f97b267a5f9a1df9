/// Bounded Subprocess Execution
///
/// **Core Responsibility:**
/// Start one child process, feed it stdin, capture stdout/stderr and enforce
/// a hard wall-clock limit.
///
/// **Guarantees:**
/// - Every child runs in its own process group
/// - The whole group is SIGKILLed on timeout, on cancellation and after a
///   normal exit, so background children of student code never outlive the pass
/// - Capture is bounded; readers keep draining past the cap so the child
///   never blocks on a full pipe
/// - Knows nothing about verdicts or scoring
use crate::error::JudgeError;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound on bytes kept per stream
pub const MAX_CAPTURE_BYTES: usize = 16 * 1024 * 1024;

/// How long to wait for pipe readers once the process group is gone
const DRAIN_GRACE: Duration = Duration::from_secs(1);

const TRUNCATION_MARKER: &str = "\n[output truncated]";

#[derive(Debug, Clone)]
pub struct ProcessSpec<'a> {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: &'a Path,
    pub stdin: Option<&'a [u8]>,
    pub timeout: Duration,
    pub capture_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        matches!(self.termination, Termination::TimedOut)
    }

    pub fn success(&self) -> bool {
        matches!(self.termination, Termination::Exited(status) if status.success())
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(status) => status.code(),
            Termination::TimedOut => None,
        }
    }

    /// Signal that terminated the process, if any
    pub fn signal(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Termination::Exited(status) = self.termination {
                return status.signal();
            }
        }
        None
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Run a process to completion, timeout or cancellation
///
/// A spawn failure is reported as `JudgeError::Invocation`; callers decide
/// whether that is an environment problem or a student problem.
pub async fn run_bounded(
    spec: ProcessSpec<'_>,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, JudgeError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(spec.cwd)
        .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| JudgeError::Invocation {
        program: spec.program.to_string_lossy().into_owned(),
        source,
    })?;
    let pid = child.id();

    let stdin_task = match (child.stdin.take(), spec.stdin) {
        (Some(mut pipe), Some(data)) => {
            let data = data.to_vec();
            Some(tokio::spawn(async move {
                // A child that exits without reading its input closes the pipe early
                let _ = pipe.write_all(&data).await;
                let _ = pipe.shutdown().await;
            }))
        }
        _ => None,
    };
    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(read_capped(out, spec.capture_limit)));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(read_capped(err, spec.capture_limit)));

    let termination = tokio::select! {
        status = child.wait() => {
            Termination::Exited(status.map_err(|e| JudgeError::io(spec.cwd, e))?)
        }
        _ = tokio::time::sleep(spec.timeout) => Termination::TimedOut,
        _ = cancel.cancelled() => {
            warn!(pid = ?pid, "Cancellation requested, killing process group");
            terminate(&mut child, pid).await;
            for task in [stdout_task, stderr_task].into_iter().flatten() {
                task.abort();
            }
            if let Some(task) = stdin_task {
                task.abort();
            }
            return Err(JudgeError::Cancelled);
        }
    };

    // Reap whatever is left in the group, including the child itself on timeout
    terminate(&mut child, pid).await;
    let elapsed = start.elapsed();

    if let Some(task) = stdin_task {
        task.abort();
    }
    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;

    debug!(
        pid = ?pid,
        timed_out = matches!(termination, Termination::TimedOut),
        elapsed_ms = elapsed.as_millis() as u64,
        "Process finished"
    );

    Ok(ProcessOutput {
        termination,
        stdout,
        stderr,
        elapsed,
    })
}

/// Kill the child's process group and reap the child
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal; a stale group id yields ESRCH
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    let _ = child.start_kill();
    let _ = child.wait().await;
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> (Vec<u8>, bool) {
    let mut captured = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(captured.len());
                if n > room {
                    truncated = true;
                }
                captured.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    (captured, truncated)
}

async fn collect(task: Option<JoinHandle<(Vec<u8>, bool)>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok((bytes, truncated))) => {
            let mut text = String::from_utf8_lossy(&bytes).into_owned();
            if truncated {
                text.push_str(TRUNCATION_MARKER);
            }
            text
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Output reader failed");
            String::new()
        }
        Err(_) => {
            // Something escaped the process group and still holds the pipe
            task.abort();
            warn!("Output pipe still open after process exit, dropping reader");
            String::new()
        }
    }
}

/// Shorten text to at most `limit` bytes on a char boundary
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh<'a>(script: &str, cwd: &'a Path, timeout: Duration, stdin: Option<&'a [u8]>) -> ProcessSpec<'a> {
        ProcessSpec {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd,
            stdin,
            timeout,
            capture_limit: MAX_CAPTURE_BYTES,
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("read x; echo \"got $x\"; echo oops >&2", dir.path(), Duration::from_secs(5), Some(b"42\n"));
        let out = run_bounded(spec, &CancellationToken::new()).await.unwrap();

        assert!(out.success());
        assert_eq!(out.stdout, "got 42\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("exit 3", dir.path(), Duration::from_secs(5), None);
        let out = run_bounded(spec, &CancellationToken::new()).await.unwrap();

        assert!(!out.success());
        assert!(!out.timed_out());
        assert_eq!(out.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_signal_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("kill -SEGV $$", dir.path(), Duration::from_secs(5), None);
        let out = run_bounded(spec, &CancellationToken::new()).await.unwrap();

        assert_eq!(out.signal(), Some(libc::SIGSEGV));
        assert_eq!(out.exit_code(), None);
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("sleep 30", dir.path(), Duration::from_millis(300), None);
        let start = Instant::now();
        let out = run_bounded(spec, &CancellationToken::new()).await.unwrap();

        assert!(out.timed_out());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation_returns_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("sleep 30", dir.path(), Duration::from_secs(60), None);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = run_bounded(spec, &cancel).await;
        assert!(matches!(result, Err(JudgeError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_program_is_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec {
            program: "definitely-not-a-real-compiler".into(),
            args: vec![],
            cwd: dir.path(),
            stdin: None,
            timeout: Duration::from_secs(1),
            capture_limit: MAX_CAPTURE_BYTES,
        };
        let result = run_bounded(spec, &CancellationToken::new()).await;
        assert!(matches!(result, Err(JudgeError::Invocation { .. })));
    }

    #[tokio::test]
    async fn test_capture_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = sh("i=0; while [ $i -lt 100 ]; do echo 0123456789; i=$((i+1)); done", dir.path(), Duration::from_secs(5), None);
        spec.capture_limit = 25;
        let out = run_bounded(spec, &CancellationToken::new()).await.unwrap();

        assert!(out.success());
        assert!(out.stdout.starts_with("0123456789\n0123456789\n012"));
        assert!(out.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_text_respects_char_boundary() {
        assert_eq!(truncate_text("short", 10), "short");
        let text = "héllo";
        let cut = truncate_text(text, 2);
        assert!(cut.starts_with('h'));
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }
}
