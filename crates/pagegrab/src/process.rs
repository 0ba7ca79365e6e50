//! Subprocess lifecycle: spawn, drain output, graceful-then-forced termination.
//!
//! Shared by the lightweight engine and screenshot capture. A supervisory
//! task owns two cancellation tokens: the soft token fires at the timeout and
//! triggers SIGTERM, the hard token fires after the grace window and triggers
//! a forced kill. [`ProcessRunner::run`] never fails; spawn errors come back
//! as a synthetic non-zero exit with the message in `stderr`.

use serde::Serialize;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time between the graceful signal and the forced kill.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(1000);

/// How long to keep draining pipes after the process itself is gone.
const DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// Exit code reported when the process could not be spawned.
pub const SPAWN_FAILURE_CODE: i32 = -1;

/// How a process run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationCause {
    Natural,
    SoftTimeout,
    HardTimeout,
}

/// Everything collected from one process run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub termination_cause: TerminationCause,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Exited on its own with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.termination_cause == TerminationCause::Natural
    }

    fn spawn_failure(message: String, elapsed: Duration) -> Self {
        Self {
            exit_code: SPAWN_FAILURE_CODE,
            stdout: String::new(),
            stderr: message,
            termination_cause: TerminationCause::Natural,
            elapsed,
        }
    }
}

/// Runs external executables under a two-stage timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the grace window between SIGTERM and the forced kill.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Spawn `program` with `args` and wait for it, enforcing `timeout`.
    pub async fn run<I, S>(
        &self,
        program: impl AsRef<OsStr>,
        args: I,
        timeout: Duration,
    ) -> ProcessOutput
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let start = Instant::now();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("spawn of {} failed: {e}", program.to_string_lossy());
                return ProcessOutput::spawn_failure(
                    format!("failed to spawn {}: {e}", program.to_string_lossy()),
                    start.elapsed(),
                );
            }
        };

        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        let soft = CancellationToken::new();
        let hard = CancellationToken::new();
        let supervisor = spawn_deadlines(timeout, self.grace, soft.clone(), hard.clone());

        let (status, cause) = supervise(&mut child, &soft, &hard).await;
        supervisor.abort();

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        let exit_code = match status {
            Some(status) => exit_code_of(status),
            None => SPAWN_FAILURE_CODE,
        };

        tracing::debug!(
            "{} finished: exit={exit_code}, cause={cause:?}, {:.1}s",
            program.to_string_lossy(),
            start.elapsed().as_secs_f64()
        );

        ProcessOutput {
            exit_code,
            stdout,
            stderr,
            termination_cause: cause,
            elapsed: start.elapsed(),
        }
    }
}

/// Fire `soft` at `timeout` and `hard` one grace window later.
fn spawn_deadlines(
    timeout: Duration,
    grace: Duration,
    soft: CancellationToken,
    hard: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        soft.cancel();
        tokio::time::sleep(grace).await;
        hard.cancel();
    })
}

async fn supervise(
    child: &mut Child,
    soft: &CancellationToken,
    hard: &CancellationToken,
) -> (Option<ExitStatus>, TerminationCause) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = soft.cancelled() => None,
    };
    if let Some(status) = exited {
        return (status.ok(), TerminationCause::Natural);
    }

    terminate_gracefully(child);

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = hard.cancelled() => None,
    };
    if let Some(status) = exited {
        return (status.ok(), TerminationCause::SoftTimeout);
    }

    if let Err(e) = child.start_kill() {
        tracing::warn!("forced kill failed: {e}");
    }
    (child.wait().await.ok(), TerminationCause::HardTimeout)
}

#[cfg(unix)]
fn terminate_gracefully(child: &mut Child) {
    match child.id() {
        Some(pid) => {
            // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                tracing::debug!("SIGTERM to {pid} failed: {}", std::io::Error::last_os_error());
            }
        }
        None => tracing::debug!("process already reaped before SIGTERM"),
    }
}

#[cfg(not(unix))]
fn terminate_gracefully(child: &mut Child) {
    let _ = child.start_kill();
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// Join a drain task, abandoning it if a grandchild keeps the pipe open.
async fn collect(task: JoinHandle<Vec<u8>>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(DRAIN_WINDOW, task).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(SPAWN_FAILURE_CODE)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILURE_CODE)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let out = ProcessRunner::new()
            .run(
                "sh",
                ["-c", "echo hello; echo oops 1>&2"],
                Duration::from_secs(5),
            )
            .await;
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.termination_cause, TerminationCause::Natural);
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let out = ProcessRunner::new()
            .run("sh", ["-c", "exit 3"], Duration::from_secs(5))
            .await;
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
        assert_eq!(out.termination_cause, TerminationCause::Natural);
    }

    #[tokio::test]
    async fn spawn_failure_resolves_with_message() {
        let out = ProcessRunner::new()
            .run(
                "definitely-not-a-binary-pagegrab",
                Vec::<String>::new(),
                Duration::from_secs(1),
            )
            .await;
        assert_eq!(out.exit_code, SPAWN_FAILURE_CODE);
        assert!(out.stderr.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn soft_timeout_stops_cooperative_process() {
        let out = ProcessRunner::new()
            .run("sleep", ["10"], Duration::from_millis(200))
            .await;
        assert_eq!(out.termination_cause, TerminationCause::SoftTimeout);
        assert!(!out.success());
        assert!(out.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn hard_timeout_kills_process_ignoring_sigterm() {
        let runner = ProcessRunner::new();
        let timeout = Duration::from_millis(200);
        let out = runner
            .run("sh", ["-c", "trap '' TERM; exec sleep 10"], timeout)
            .await;
        assert_eq!(out.termination_cause, TerminationCause::HardTimeout);
        let budget = timeout + runner.grace() + Duration::from_millis(700);
        assert!(
            out.elapsed < budget,
            "took {:?}, expected under {:?}",
            out.elapsed,
            budget
        );
        // killed by SIGKILL
        assert_eq!(out.exit_code, 128 + libc::SIGKILL);
    }

    #[test]
    fn termination_cause_serializes_kebab_case() {
        let json = serde_json::to_string(&TerminationCause::HardTimeout).unwrap();
        assert_eq!(json, "\"hard-timeout\"");
    }
}
