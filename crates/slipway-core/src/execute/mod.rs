//! Execution backends for slipway jobs.
//!
//! # Backends
//!
//! - **`ProcessBackend`** - One worker process per job. Crash isolation, memory
//!   isolation and immediate, forceful termination.
//! - **`InlineBackend`** - The job runs on the calling thread inside `spawn`.
//!   No isolation, no parallelism. Meant for profiling and debugging, where
//!   process startup would drown out the measurement.
//!
//! Both produce the same envelopes through the same channel, so switching
//! backends changes isolation and speed, never results.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!     │
//!     └── Backend::spawn(job)
//!             │
//!             ├── Process: WorkerProcess (child process + I/O thread)
//!             │       ├── IPC: Run command ──► slipway worker
//!             │       │                           └── capture::run_job
//!             │       └── IPC: response ──► ResultChannel
//!             │
//!             └── Inline: capture::run_job ──► ResultChannel
//! ```

pub mod capture;
mod inline;
mod process;

pub use inline::{InlineBackend, InlineWorker};
pub use process::ProcessBackend;

use crate::channel::ResultSender;
use crate::config::{BackendKind, SchedulerConfig};
use crate::error::Result;
use crate::ipc::WorkerProcess;
use crate::job::Job;
use crate::task::Task;

/// The execution strategy chosen for one scheduling call.
#[derive(Debug, Clone)]
pub enum Backend {
    Process(ProcessBackend),
    Inline(InlineBackend),
}

impl Backend {
    /// Build the backend described by `config`.
    ///
    /// For the process backend this locates the worker binary.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        match config.backend {
            BackendKind::Process => Ok(Self::Process(ProcessBackend::locate(
                config.worker_path.as_deref(),
            )?)),
            BackendKind::Inline => {
                tracing::warn!(
                    "slipway: using inline mode! Jobs run on the calling thread without \
                     isolation. This should really be used only while profiling."
                );
                Ok(Self::Inline(InlineBackend))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Process(_) => BackendKind::Process,
            Self::Inline(_) => BackendKind::Inline,
        }
    }

    /// Start a worker for `job`. Its result arrives through `results`.
    pub fn spawn<T: Task>(
        &self,
        task: &T,
        job: Job<T::Args>,
        results: ResultSender<T::Output>,
    ) -> Result<ActiveWorker> {
        match self {
            Self::Process(backend) => backend.spawn::<T>(job, results).map(ActiveWorker::Process),
            Self::Inline(backend) => Ok(ActiveWorker::Inline(backend.spawn(task, job, results))),
        }
    }
}

/// A worker admitted into the window.
pub enum ActiveWorker {
    Process(WorkerProcess),
    Inline(InlineWorker),
}

impl ActiveWorker {
    /// Forcefully stop the worker. No-op inline.
    pub fn terminate(&mut self) {
        match self {
            Self::Process(worker) => worker.kill(),
            Self::Inline(_) => {}
        }
    }

    /// Wait for the worker to be fully gone. No-op inline.
    pub fn join(&mut self) -> Result<()> {
        match self {
            Self::Process(worker) => worker.wait(),
            Self::Inline(_) => Ok(()),
        }
    }
}
