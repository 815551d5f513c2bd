//! Worker process isolation
//!
//! The tokenizer runs in a child process that only ever sees plain data: a JSON
//! [`WorkerRequest`] on stdin, answered by a JSON [`WorkerResponse`] on stdout. The parent
//! polls the child until the deadline; a child still running then is killed and reaped.

use crate::error::ExtractError;
use crate::worker::{WorkerRequest, WorkerResponse};
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// How to start a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        WorkerCommand {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The running executable's own `worker` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(WorkerCommand::new(std::env::current_exe()?).arg("worker"))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// `Ok(None)` means the deadline passed and the child was killed.
pub(crate) fn run_worker(
    command: &WorkerCommand,
    request: &WorkerRequest,
    deadline: Instant,
) -> Result<Option<WorkerResponse>, ExtractError> {
    let payload =
        serde_json::to_vec(request).map_err(|e| ExtractError::MalformedRequest(e.to_string()))?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExtractError::WorkerSpawn {
            program: command.program.display().to_string(),
            source,
        })?;
    log::debug!(
        "spawned worker {} (pid {})",
        command.program.display(),
        child.id()
    );

    if let Some(mut stdin) = child.stdin.take() {
        thread::spawn(move || {
            // a worker that exits early closes the pipe; its exit status tells the story
            let _ = stdin.write_all(&payload);
        });
    }
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        let now = Instant::now();
        if now >= deadline {
            kill(&mut child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    };

    // the pipes may outlive the child; draining them counts against the same deadline
    let stdout = match stdout.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(bytes) => bytes,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("worker output still open at the deadline");
            return Ok(None);
        }
        Err(RecvTimeoutError::Disconnected) => Vec::new(),
    };
    if !status.success() {
        let stderr = stderr
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        return Err(ExtractError::WorkerFailed {
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    serde_json::from_slice(&stdout)
        .map(Some)
        .map_err(|e| ExtractError::MalformedResponse(e.to_string()))
}

/// Read a pipe to the end on a helper thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            let _ = sender.send(buffer);
        });
    }
    receiver
}

fn kill(child: &mut Child) {
    log::warn!("worker pid {} ran past its deadline, killing it", child.id());
    if let Err(err) = child.kill() {
        log::debug!("kill failed: {}", err);
    }
    // reap so no zombie is left behind
    if let Err(err) = child.wait() {
        log::debug!("wait after kill failed: {}", err);
    }
}
