//! Worker process management on the scheduler side.
//!
//! A [`WorkerProcess`] owns one child process that runs exactly one job. The
//! command is written and the response read on a dedicated I/O thread, so
//! spawning never waits on the child.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::de::DeserializeOwned;

use crate::channel::ResultSender;
use crate::error::{Error, Result};
use crate::job::{JobId, Outcome, ResultEnvelope};

use super::protocol::{WorkerCommand, WorkerResponse, read_message, write_message};

/// Environment variable marking a process as a slipway worker.
pub const WORKER_ENV: &str = "SLIPWAY_WORKER";

/// Environment variable overriding the worker binary location.
pub const WORKER_PATH_ENV: &str = "SLIPWAY_WORKER_PATH";

const WORKER_BINARY: &str = if cfg!(windows) {
    "slipway-worker.exe"
} else {
    "slipway-worker"
};

/// Find the worker binary.
///
/// Lookup order:
/// 1. `explicit`, if given
/// 2. `SLIPWAY_WORKER_PATH` environment variable
/// 3. Same directory as the current executable
/// 4. System PATH
/// 5. `target/debug` or `target/release` of the workspace (development)
pub fn locate_worker_binary(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Ipc(format!(
            "Configured worker binary '{}' does not exist",
            path.display()
        )));
    }

    if let Ok(path) = std::env::var(WORKER_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            "{} points at missing file '{}', falling back to search",
            WORKER_PATH_ENV,
            path.display()
        );
    }

    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        let worker_path = exe_dir.join(WORKER_BINARY);
        if worker_path.exists() {
            return Ok(worker_path);
        }
    }

    if let Ok(path) = which::which(WORKER_BINARY) {
        return Ok(path);
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        for profile in ["debug", "release"] {
            let path = PathBuf::from(&manifest_dir)
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(WORKER_BINARY);
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }
    }

    Err(Error::Ipc(format!(
        "Could not find {} binary. Set {} or ensure it's in PATH.",
        WORKER_BINARY, WORKER_PATH_ENV
    )))
}

/// Handle to a worker process running one job.
pub struct WorkerProcess {
    job_id: JobId,
    /// The child process.
    child: Child,
    /// Thread feeding the command in and the response out.
    io_thread: Option<JoinHandle<()>>,
    /// Whether the child has been reaped.
    reaped: bool,
}

impl WorkerProcess {
    /// Spawn a worker process for one job.
    ///
    /// The outcome (or the reason there is none) is delivered through
    /// `results` exactly once.
    pub fn spawn<O>(
        program: &Path,
        job_id: JobId,
        command: WorkerCommand,
        results: ResultSender<O>,
    ) -> Result<Self>
    where
        O: DeserializeOwned + Send + 'static,
    {
        let mut child = Command::new(program)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let worker stderr pass through for debugging
            .spawn()
            .map_err(|e| Error::Spawn {
                job_id,
                message: format!("'{}': {}", program.display(), e),
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Spawn {
                    job_id,
                    message: "worker stdio was not captured".to_string(),
                });
            }
        };

        let pid = child.id();
        let io_thread = std::thread::Builder::new()
            .name(format!("slipway-{}", job_id))
            .spawn(move || exchange(job_id, command, stdin, stdout, results));

        let io_thread = match io_thread {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Spawn {
                    job_id,
                    message: format!("failed to start I/O thread: {}", e),
                });
            }
        };

        tracing::debug!("spawned worker pid {} for {}", pid, job_id);

        Ok(Self {
            job_id,
            child,
            io_thread: Some(io_thread),
            reaped: false,
        })
    }

    /// Kill the worker process immediately.
    ///
    /// No graceful shutdown is attempted.
    pub fn kill(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.kill() {
            // InvalidInput means the process already exited.
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("Failed to kill worker for {}: {}", self.job_id, e);
            }
        }
    }

    /// Wait for the process to exit and its I/O thread to finish.
    pub fn wait(&mut self) -> Result<()> {
        if !self.reaped {
            let status = self.child.wait()?;
            self.reaped = true;
            if !status.success() {
                tracing::debug!("worker for {} exited with {}", self.job_id, status);
            }
        }
        if let Some(handle) = self.io_thread.take() {
            handle
                .join()
                .map_err(|_| Error::Ipc(format!("I/O thread for {} panicked", self.job_id)))?;
        }
        Ok(())
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // Never leave an orphan behind.
        if !self.reaped {
            self.kill();
            let _ = self.wait();
        }
    }
}

/// Send the command, read the response, deliver it. Runs on the I/O thread.
fn exchange<O>(
    job_id: JobId,
    command: WorkerCommand,
    stdin: ChildStdin,
    stdout: ChildStdout,
    results: ResultSender<O>,
) where
    O: DeserializeOwned,
{
    {
        let mut writer = BufWriter::new(stdin);
        if let Err(e) = write_message(&mut writer, &command) {
            results.undeliverable(job_id, format!("failed to send job: {}", e));
            return;
        }
        // Dropping stdin closes the pipe so the worker sees EOF afterwards.
    }

    let mut reader = BufReader::new(stdout);
    let response: WorkerResponse = match read_message(&mut reader) {
        Ok(response) => response,
        Err(e) => {
            results.undeliverable(job_id, format!("worker exited without a result: {}", e));
            return;
        }
    };

    if response.job_id() != job_id.as_u64() {
        results.undeliverable(
            job_id,
            format!("worker answered for job_{} instead", response.job_id()),
        );
        return;
    }

    match response {
        WorkerResponse::Completed { payload_json, .. } => {
            match serde_json::from_slice::<O>(&payload_json) {
                Ok(output) => {
                    results.deliver(ResultEnvelope::new(job_id, Outcome::Success(output)))
                }
                Err(e) => results.undeliverable(job_id, format!("failed to decode result: {}", e)),
            }
        }
        WorkerResponse::Failed { failure, .. } => {
            results.deliver(ResultEnvelope::new(job_id, Outcome::Failure(failure)));
        }
        WorkerResponse::Undeliverable { message, .. } => results.undeliverable(job_id, message),
    }
}
