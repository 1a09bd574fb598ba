//! Error types for slipway-core.

use thiserror::Error;

use crate::job::{FailureKind, FailurePayload, JobId};

/// Result type for slipway-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scheduling jobs.
#[derive(Debug, Error)]
pub enum Error {
    /// A job failed and failure propagation was enabled.
    #[error(transparent)]
    Job(#[from] JobFailure),

    /// Invalid scheduler configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A job did not match the configured argument shape.
    #[error("invalid job {job_id}: {message}")]
    InvalidJob { job_id: JobId, message: String },

    /// A worker could not be started.
    #[error("failed to spawn worker for {job_id}: {message}")]
    Spawn { job_id: JobId, message: String },

    /// A worker went away without delivering a usable result.
    #[error("worker for {job_id} was lost: {message}")]
    WorkerLost { job_id: JobId, message: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// IPC communication error with a worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the job failure if this error is a propagated job failure.
    pub fn as_job_failure(&self) -> Option<&JobFailure> {
        match self {
            Self::Job(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A job failure re-hydrated at the coordinator.
///
/// The original error value does not survive the process boundary. What
/// survives is its type name, message, source chain and the trace text
/// captured in the worker. `Display` appends that trace so the origin of the
/// failure is visible wherever the error ends up being printed.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    job_id: JobId,
    payload: FailurePayload,
}

impl JobFailure {
    pub fn new(job_id: JobId, payload: FailurePayload) -> Self {
        Self { job_id, payload }
    }

    /// Id of the job that failed.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Whether the task returned an error or panicked.
    pub fn kind(&self) -> FailureKind {
        self.payload.kind
    }

    /// Type name of the original error (`"panic"` for panics).
    pub fn error_type(&self) -> &str {
        &self.payload.error_type
    }

    /// Display message of the original error.
    pub fn message(&self) -> &str {
        &self.payload.message
    }

    /// Rendered `source()` chain of the original error, outermost first.
    pub fn sources(&self) -> &[String] {
        &self.payload.sources
    }

    /// Trace text captured where the failure was observed.
    pub fn trace(&self) -> &str {
        &self.payload.trace
    }

    /// Raw payload as it crossed the worker boundary.
    pub fn payload(&self) -> &FailurePayload {
        &self.payload
    }

    /// Check whether the original error had type `E`.
    ///
    /// Compares type names, so it only holds when coordinator and worker were
    /// built from the same definition of `E`.
    pub fn is<E: ?Sized>(&self) -> bool {
        self.payload.kind == FailureKind::Error
            && self.payload.error_type == std::any::type_name::<E>()
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.payload.kind {
            FailureKind::Error => write!(
                f,
                "{} failed with {}: {}",
                self.job_id, self.payload.error_type, self.payload.message
            )?,
            FailureKind::Panic => {
                write!(f, "{} panicked: {}", self.job_id, self.payload.message)?
            }
        }
        for source in &self.payload.sources {
            write!(f, "\n  caused by: {}", source)?;
        }
        if !self.payload.trace.is_empty() {
            write!(f, "\n\nworker trace:\n{}", self.payload.trace)?;
        }
        Ok(())
    }
}

impl std::error::Error for JobFailure {}
