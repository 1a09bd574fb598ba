//! Progress callbacks for a scheduling run.

use crate::error::JobFailure;
use crate::job::JobId;

/// Where the scheduler is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Admitting jobs while slots are free and jobs remain.
    Filling,
    /// Every job is submitted; waiting for the remaining workers.
    Draining,
    /// A failure was observed; remaining workers are being torn down.
    DrainingOnFailure,
}

/// Callback trait for scheduling progress reporting.
pub trait ScheduleCallback: Send + Sync {
    /// Called after a job's worker has been spawned.
    fn on_job_started(&self, job_id: JobId);

    /// Called when a job's result has been collected.
    fn on_job_completed(&self, job_id: JobId);

    /// Called when a job failed. `propagated` tells whether the failure ends
    /// the run or is being masked.
    fn on_job_failed(&self, job_id: JobId, failure: &JobFailure, propagated: bool);

    /// Called when the scheduler moves to another phase.
    fn on_phase_changed(&self, _phase: Phase) {}
}
