//! Worker side of the protocol.
//!
//! A worker process reads one `Run` command, runs the job and writes one
//! response. The process then exits, so every job gets a fresh address space.

use std::io::{BufReader, BufWriter, Read, Write};

use crate::error::Result;
use crate::job::JobId;
use crate::task::TaskRegistry;

use super::protocol::{WorkerCommand, read_message, write_message};
use super::worker::WORKER_ENV;

/// Serve one job over stdin/stdout.
///
/// On Unix the protocol stream is moved off fd 1 first and fd 1 is pointed
/// at stderr, so tasks that print to stdout cannot corrupt the response.
pub fn serve(registry: &TaskRegistry) -> Result<()> {
    let mut reader = BufReader::new(std::io::stdin().lock());
    let mut writer = BufWriter::new(claim_protocol_stdout()?);
    serve_one(registry, &mut reader, &mut writer)
}

/// Run [`serve`] if this process was started as a slipway worker.
///
/// Returns `None` when the process is not a worker. Call it at the top of
/// `main` when the application re-executes itself as its own worker binary.
pub fn serve_if_worker(registry: &TaskRegistry) -> Option<Result<()>> {
    if std::env::var_os(WORKER_ENV).is_some() {
        Some(serve(registry))
    } else {
        None
    }
}

/// Read one command from `reader`, dispatch it, write the response.
pub fn serve_one<R: Read, W: Write>(
    registry: &TaskRegistry,
    reader: &mut R,
    writer: &mut W,
) -> Result<()> {
    let command: WorkerCommand = read_message(reader)?;

    let response = match command {
        WorkerCommand::Run {
            task,
            job_id,
            args_json,
            kwargs_json,
        } => {
            tracing::debug!("running task '{}' for job_{}", task, job_id);
            registry.dispatch(&task, JobId::new(job_id), &args_json, &kwargs_json)
        }
    };

    write_message(writer, &response)
}

#[cfg(unix)]
fn claim_protocol_stdout() -> Result<Box<dyn Write>> {
    use std::fs::File;
    use std::os::fd::FromRawFd;

    std::io::stdout().flush()?;

    // SAFETY: plain descriptor juggling on fds this process owns. The
    // duplicated fd is handed to exactly one `File`.
    unsafe {
        let protocol_fd = libc::dup(libc::STDOUT_FILENO);
        if protocol_fd < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        if libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) < 0 {
            let err = std::io::Error::last_os_error();
            libc::close(protocol_fd);
            return Err(err.into());
        }
        Ok(Box::new(File::from_raw_fd(protocol_fd)))
    }
}

#[cfg(not(unix))]
fn claim_protocol_stdout() -> Result<Box<dyn Write>> {
    Ok(Box::new(std::io::stdout()))
}
