use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::SandboxError;
use crate::metrics::SANDBOX_RUNS;

/// How long to wait for the stderr reader once the process is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A single external tool invocation.
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Isolated directory the tool runs in. Created if missing.
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl SandboxCommand {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Result of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Tail of stderr, at most `max_stderr_bytes` long.
    pub stderr: String,
    pub duration: Duration,
}

impl SandboxOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into an error.
    pub fn ensure_success(self) -> Result<Self, SandboxError> {
        if self.success() {
            Ok(self)
        } else {
            Err(SandboxError::NonZeroExit {
                code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs external tools with a timeout inside a job-scoped working directory.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    max_stderr_bytes: usize,
}

impl ProcessSandbox {
    pub fn new(max_stderr_bytes: usize) -> Self {
        Self { max_stderr_bytes }
    }

    /// Run a command to completion or until its timeout expires.
    ///
    /// A non-zero exit is returned as `Ok` with the exit code so callers can
    /// inspect stderr; use [`SandboxOutput::ensure_success`] to reject it.
    /// If the returned future is dropped the process group is killed.
    pub async fn run(&self, command: SandboxCommand) -> Result<SandboxOutput, SandboxError> {
        tokio::fs::create_dir_all(&command.working_dir).await?;

        let start = Instant::now();
        let mut child = build_command(&command).spawn().map_err(|e| {
            let err = if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::NotFound {
                    program: command.program.clone(),
                }
            } else {
                SandboxError::Spawn {
                    program: command.program.clone(),
                    source: e,
                }
            };
            SANDBOX_RUNS.with_label_values(&[err.outcome()]).inc();
            err
        })?;

        let mut group = ProcessGroup::new(child.id());
        debug!(
            program = %command.program.display(),
            pid = ?child.id(),
            working_dir = %command.working_dir.display(),
            "Started external process"
        );

        let max_stderr = self.max_stderr_bytes;
        let stderr = child.stderr.take();
        let capture = tokio::spawn(async move {
            match stderr {
                Some(stderr) => read_tail(stderr, max_stderr).await,
                None => String::new(),
            }
        });

        match timeout(command.timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                // Anything the tool left behind in its group is an orphan.
                group.kill();
                let stderr = drain(capture).await;
                let output = SandboxOutput {
                    exit_code: status.code(),
                    stderr,
                    duration: start.elapsed(),
                };
                let outcome = if output.success() { "success" } else { "non_zero_exit" };
                SANDBOX_RUNS.with_label_values(&[outcome]).inc();
                debug!(
                    program = %command.program.display(),
                    exit_code = ?output.exit_code,
                    duration_ms = output.duration.as_millis() as u64,
                    "External process finished"
                );
                Ok(output)
            }
            Err(_) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Process already gone after group kill");
                }
                let stderr = drain(capture).await;
                SANDBOX_RUNS.with_label_values(&["timeout"]).inc();
                warn!(
                    program = %command.program.display(),
                    timeout_secs = command.timeout.as_secs(),
                    "External process timed out and was killed"
                );
                Err(SandboxError::Timeout {
                    timeout: command.timeout,
                    stderr,
                })
            }
        }
    }

    /// Check that a program can be started at all.
    pub async fn probe(&self, program: &Path, arg: &str, working_dir: &Path) -> Result<(), SandboxError> {
        let command = SandboxCommand::new(program, working_dir, Duration::from_secs(15)).arg(arg);
        self.run(command).await?.ensure_success().map(|_| ())
    }
}

fn build_command(command: &SandboxCommand) -> Command {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

async fn drain(capture: tokio::task::JoinHandle<String>) -> String {
    match timeout(STDERR_DRAIN_TIMEOUT, capture).await {
        Ok(Ok(stderr)) => stderr,
        _ => String::new(),
    }
}

/// Read a stream to the end, keeping only the last `max` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, max: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > max {
                    let excess = tail.len() - max;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Kills the child's process group on drop unless already killed.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // SAFETY: kill(2) with a negative pid signals every process in that group.
    // The group was created for this child alone via process_group(0).
    unsafe {
        libc::kill(-(pgid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
