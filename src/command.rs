//! External process execution.
//!
//! Stages never spawn processes directly; they hand an [`Invocation`] to a
//! [`CommandExecutor`]. [`SystemExecutor`] runs real binaries, while tests
//! substitute an executor that returns scripted outcomes.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::PipelineError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ordered argument list: program first, then its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    argv: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            argv: vec![program.as_ref().to_os_string()],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.argv.push(arg.as_ref().to_os_string());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.argv[0]
    }

    pub fn args(&self) -> &[OsString] {
        &self.argv[1..]
    }

    pub fn argv_lossy(&self) -> Vec<String> {
        self.argv
            .iter()
            .map(|part| part.to_string_lossy().into_owned())
            .collect()
    }

    pub fn command_line(&self) -> String {
        self.argv_lossy().join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            status: Some(0),
            ..Self::default()
        }
    }

    fn from_output(output: Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

pub trait CommandExecutor {
    /// Runs `invocation` to completion. A non-zero exit must surface as
    /// [`PipelineError::CommandFailed`]; the caller decides whether it is fatal.
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, PipelineError>;
}

/// Runs invocations as child processes of the current one.
///
/// With a timeout set, each command gets its own process group so that a
/// wrapper script and everything it started are killed together.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, PipelineError> {
        let command_line = invocation.command_line();
        info!(command = %command_line, "Running external command");

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        if self.timeout.is_some() {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn().map_err(|source| PipelineError::Spawn {
            program: invocation.program().to_string_lossy().into_owned(),
            source,
        })?;

        let output = match self.timeout {
            None => child
                .wait_with_output()
                .map_err(|err| PipelineError::io(format!("Failed to wait for: {command_line}"), err))?,
            Some(limit) => wait_with_deadline(child, limit, invocation)?,
        };
        let output = CommandOutput::from_output(output);

        if output.status != Some(0) {
            error!(
                command = %command_line,
                status = ?output.status,
                stderr = %output.stderr.trim_end(),
                "External command failed"
            );
            return Err(PipelineError::CommandFailed {
                argv: invocation.argv_lossy(),
                status: output.status,
                stderr: output.stderr,
            });
        }

        if !output.stdout.trim().is_empty() {
            info!(command = %command_line, "{}", output.stdout.trim_end());
        }
        Ok(output)
    }
}

/// Waits for `child` and for both of its output pipes. Anything still
/// holding a pipe open at the deadline (including background grandchildren)
/// counts as part of the command and is killed with it.
fn wait_with_deadline(
    mut child: Child,
    limit: Duration,
    invocation: &Invocation,
) -> Result<Output, PipelineError> {
    // Drain both pipes while polling so a chatty child cannot block on a full pipe.
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);
    let deadline = Instant::now() + limit;

    let status = loop {
        let polled = child.try_wait().map_err(|err| {
            PipelineError::io(format!("Failed to poll: {}", invocation.command_line()), err)
        })?;
        if let Some(status) = polled {
            break status;
        }
        if Instant::now() >= deadline {
            terminate(&mut child);
            return Err(timed_out(invocation, limit));
        }
        thread::sleep(POLL_INTERVAL);
    };

    match (drain(stdout, deadline), drain(stderr, deadline)) {
        (Some(stdout), Some(stderr)) => Ok(Output {
            status,
            stdout,
            stderr,
        }),
        _ => {
            terminate(&mut child);
            Err(timed_out(invocation, limit))
        }
    }
}

fn timed_out(invocation: &Invocation, limit: Duration) -> PipelineError {
    error!(
        command = %invocation,
        timeout_secs = limit.as_secs_f64(),
        "External command timed out"
    );
    PipelineError::CommandTimedOut {
        argv: invocation.argv_lossy(),
        timeout: limit,
    }
}

fn terminate(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(leader: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(leader) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: every member already exited.
        if err != nix::errno::Errno::ESRCH {
            tracing::warn!(pgid = raw, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: u32) {}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        let _ = sender.send(buffer);
    });
    receiver
}

/// `None` when the pipe is still open at `deadline`.
fn drain(receiver: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Option<Vec<u8>> {
    let Some(receiver) = receiver else {
        return Some(Vec::new());
    };
    match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buffer) => Some(buffer),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
    }
}
