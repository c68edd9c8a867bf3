//! Step executor - runs one shell command once
//!
//! The executor knows nothing about retries. It spawns a single child
//! process, captures its output, enforces the hard timeout and reports what
//! happened as an [`ExecutionOutcome`]. Command failure is data, never an error.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to wait for pipes to drain after the process exits or is killed
const IO_CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a timed-out process group has to honor SIGTERM before SIGKILL
const TERM_GRACE: Duration = Duration::from_millis(150);

/// Maximum bytes captured per stream
const MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Everything needed to run one attempt
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub working_dir: PathBuf,

    /// Overrides applied on top of the inherited process environment
    pub env: HashMap<String, String>,

    pub timeout: Option<Duration>,
}

/// Raw result of a single attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i32>,

    /// Signal that terminated the process (unix only)
    pub signal: Option<i32>,

    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,

    /// Exit code 0, no timeout, no spawn error
    pub successful: bool,
    pub timed_out: bool,

    /// Spawn-level error, if the process never started
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome used when no attempt produced anything
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// A process that ran to completion
    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            successful: exit_code == 0,
            ..Self::default()
        }
    }

    /// A process killed after its timeout expired
    pub fn timed_out(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: true,
            ..Self::default()
        }
    }

    /// A process that could not be started
    pub fn spawn_failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the command once and report the outcome
    async fn execute(&self, request: &CommandRequest) -> ExecutionOutcome;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(&self, request: &CommandRequest) -> ExecutionOutcome {
        (**self).execute(request).await
    }
}

/// Executes commands through the platform shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    io_grace: Duration,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            io_grace: IO_CAPTURE_TIMEOUT,
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long output capture may lag behind process exit
    pub fn with_io_grace(mut self, grace: Duration) -> Self {
        self.io_grace = grace;
        self
    }
}

/// How the wait for the child finished
enum Resolution {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, request: &CommandRequest) -> ExecutionOutcome {
        let started = Instant::now();

        let mut command = shell_command(&request.command);
        command
            .current_dir(&request.working_dir)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            command.process_group(0);
        }

        debug!(
            command = %request.command,
            working_dir = %request.working_dir.display(),
            timeout_ms = request.timeout.map(|t| t.as_millis() as u64),
            "spawning command"
        );

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %request.command, error = %e, "failed to spawn command");
                return ExecutionOutcome::spawn_failed(e.to_string())
                    .with_duration(started.elapsed());
            }
        };

        let stdout_capture = child.stdout.take().map(spawn_reader);
        let stderr_capture = child.stderr.take().map(spawn_reader);

        // select! commits to exactly one branch; the loser is dropped unpolled,
        // so the outcome is resolved once.
        let resolution = match request.timeout {
            Some(limit) => tokio::select! {
                status = child.wait() => Resolution::Exited(status),
                _ = tokio::time::sleep(limit) => Resolution::TimedOut,
            },
            None => Resolution::Exited(child.wait().await),
        };

        let mut outcome = match resolution {
            Resolution::Exited(Ok(status)) => ExecutionOutcome {
                exit_code: status.code(),
                signal: exit_signal(&status),
                successful: status.success(),
                ..ExecutionOutcome::default()
            },
            Resolution::Exited(Err(e)) => {
                warn!(command = %request.command, error = %e, "failed waiting for command");
                ExecutionOutcome::spawn_failed(e.to_string())
            }
            Resolution::TimedOut => {
                warn!(
                    command = %request.command,
                    timeout_ms = request.timeout.map(|t| t.as_millis() as u64),
                    "command timed out, terminating"
                );
                let status = terminate(&mut child, self.io_grace).await;
                ExecutionOutcome {
                    signal: status.as_ref().and_then(exit_signal),
                    timed_out: true,
                    ..ExecutionOutcome::default()
                }
            }
        };

        let (stdout, stderr) = tokio::join!(
            collect_output(stdout_capture, self.io_grace),
            collect_output(stderr_capture, self.io_grace)
        );
        outcome.stdout = stdout;
        outcome.stderr = stderr;
        outcome.duration = started.elapsed();
        outcome
    }
}

fn shell_command(script: &str) -> Command {
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(script);
        command
    }
    #[cfg(not(windows))]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }
}

/// Stop a timed-out child along with everything in its process group
///
/// The group gets SIGTERM and the shell gets SIGKILL. Group members still
/// alive after [`TERM_GRACE`] are killed outright.
async fn terminate(child: &mut Child, wait_limit: Duration) -> Option<ExitStatus> {
    #[cfg(unix)]
    let group = child.id().map(|pid| pid as libc::pid_t);

    #[cfg(unix)]
    {
        if let Some(pgid) = group {
            signal_group(pgid, libc::SIGTERM);
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "child already exited before kill");
    }

    let status = match tokio::time::timeout(wait_limit, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        _ => None,
    };

    #[cfg(unix)]
    {
        if let Some(pgid) = group {
            let deadline = Instant::now() + TERM_GRACE;
            while group_alive(pgid) && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            if group_alive(pgid) {
                debug!(pgid, "process group survived SIGTERM, sending SIGKILL");
                signal_group(pgid, libc::SIGKILL);
            }
        }
    }

    status
}

// A negative pid addresses the whole group created by process_group(0)
#[cfg(unix)]
fn signal_group(pgid: libc::pid_t, signal: libc::c_int) {
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(unix)]
fn group_alive(pgid: libc::pid_t) -> bool {
    unsafe { libc::kill(-pgid, 0) == 0 }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Output captured so far from one stream
type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// A stream reader and the buffer it fills chunk by chunk
struct OutputCapture {
    buffer: OutputBuffer,
    task: JoinHandle<std::io::Result<()>>,
}

fn spawn_reader<R>(reader: R) -> OutputCapture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = OutputBuffer::default();
    let task = tokio::spawn(read_bounded(reader, buffer.clone(), MAX_OUTPUT_BYTES));
    OutputCapture { buffer, task }
}

/// Read from an async reader into `buffer`, keeping at most `max_bytes`
async fn read_bounded<R: AsyncRead + Unpin>(
    mut reader: R,
    buffer: OutputBuffer,
    max_bytes: usize,
) -> std::io::Result<()> {
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        // keep draining past the limit so the writer never blocks
        if !truncated && !append_bounded(&buffer, &chunk[..n], max_bytes) {
            warn!(max_bytes, "output exceeded limit, truncating");
            truncated = true;
        }
    }

    Ok(())
}

/// Append as much of `data` as fits; false once the limit is hit
fn append_bounded(buffer: &OutputBuffer, data: &[u8], max_bytes: usize) -> bool {
    let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    let remaining = max_bytes.saturating_sub(buf.len());
    buf.extend_from_slice(&data[..data.len().min(remaining)]);
    data.len() <= remaining
}

async fn collect_output(capture: Option<OutputCapture>, grace: Duration) -> String {
    let Some(OutputCapture { buffer, mut task }) = capture else {
        return String::new();
    };

    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "failed reading command output"),
        Ok(Err(e)) => warn!(error = %e, "output reader task failed"),
        Err(_) => {
            // a background process still holds the pipe; keep what arrived
            debug!("output pipe still open after grace period, keeping partial output");
            task.abort();
        }
    }

    let bytes = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}
