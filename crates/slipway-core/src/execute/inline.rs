//! Inline execution: the "worker" runs on the caller's thread.
//!
//! By the time [`InlineBackend::spawn`] returns, the job has finished and its
//! envelope is queued, so there is never anything to terminate or wait for.

use crate::channel::ResultSender;
use crate::job::{Job, JobId, ResultEnvelope};
use crate::task::Task;

use super::capture;

/// Backend that runs each job synchronously inside `spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineBackend;

impl InlineBackend {
    pub fn spawn<T: Task>(
        &self,
        task: &T,
        job: Job<T::Args>,
        results: ResultSender<T::Output>,
    ) -> InlineWorker {
        let job_id = job.id;
        let outcome = capture::run_job(task, job);
        results.deliver(ResultEnvelope::new(job_id, outcome));
        InlineWorker { job_id }
    }
}

/// Handle for a job that already ran inline.
#[derive(Debug)]
pub struct InlineWorker {
    job_id: JobId,
}

impl InlineWorker {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}
