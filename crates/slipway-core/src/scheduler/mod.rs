//! Sliding-window scheduler.
//!
//! Runs a task once per job while keeping at most `concurrency_limit` workers
//! alive. A finished worker is replaced right away, so slow jobs never hold
//! up a whole batch.
//!
//! # Phases
//!
//! ```text
//! Filling ──(all jobs admitted)──► Draining ──(window empty)──► Completed
//!    │                                 │
//!    └──────(failure observed)─────────┴──► DrainingOnFailure ──► Failed
//! ```
//!
//! Results come back in completion order. With a concurrency limit of 1 (or
//! the inline backend) that is also submission order.

mod callback;
mod window;

pub use callback::{Phase, ScheduleCallback};
pub use window::Window;

use std::sync::Arc;

use crate::channel::{Delivery, ResultChannel};
use crate::config::SchedulerConfig;
use crate::error::{Error, JobFailure, Result};
use crate::execute::{ActiveWorker, Backend};
use crate::job::{Job, JobArgs, JobId, Kwargs, Outcome, ResultEnvelope};
use crate::task::Task;

/// Run `task` once per job and collect the results.
///
/// Equivalent to `Scheduler::new(config)?.run(task, jobs)`.
///
/// # Errors
///
/// - [`Error::Config`] if the configuration is invalid. Nothing is spawned.
/// - [`Error::Job`] for the first observed job failure when
///   `propagate_failures` is set. All other workers are killed first.
/// - [`Error::InvalidJob`] if a job does not match `with_keyword_args`.
/// - Transport errors ([`Error::WorkerLost`], [`Error::Spawn`], ...) are
///   always fatal, whatever `propagate_failures` says.
pub fn schedule<T, I>(task: &T, jobs: I, config: SchedulerConfig) -> Result<Vec<T::Output>>
where
    T: Task,
    I: IntoIterator<Item = JobArgs<T::Args>>,
{
    Scheduler::new(config)?.run(task, jobs)
}

/// Reusable scheduler: a validated configuration plus an optional callback.
///
/// Every [`run`](Self::run) is independent. Nothing carries over between runs.
pub struct Scheduler {
    config: SchedulerConfig,
    callback: Option<Arc<dyn ScheduleCallback>>,
}

impl Scheduler {
    /// Create a scheduler, validating the configuration.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            callback: None,
        })
    }

    /// Set the callback for progress reporting.
    pub fn with_callback(mut self, callback: impl ScheduleCallback + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `task` once per job and block until every job is done or one
    /// failure ends the run.
    pub fn run<T, I>(&self, task: &T, jobs: I) -> Result<Vec<T::Output>>
    where
        T: Task,
        I: IntoIterator<Item = JobArgs<T::Args>>,
    {
        let mut jobs = jobs.into_iter().peekable();
        if jobs.peek().is_none() {
            tracing::debug!("no jobs for '{}'", T::NAME);
            return Ok(Vec::new());
        }

        let backend = Backend::from_config(&self.config)?;
        tracing::debug!(
            "scheduling '{}' on {:?} backend, window of {}",
            T::NAME,
            backend.kind(),
            self.config.concurrency_limit
        );

        let run = Run {
            task,
            config: &self.config,
            callback: self.callback.as_deref(),
            backend,
            window: Window::new(self.config.concurrency_limit),
            channel: ResultChannel::new(),
            results: Vec::new(),
            phase: Phase::Filling,
        };
        run.execute(jobs)
    }
}

/// State of one scheduling call.
struct Run<'a, T: Task> {
    task: &'a T,
    config: &'a SchedulerConfig,
    callback: Option<&'a dyn ScheduleCallback>,
    backend: Backend,
    window: Window<ActiveWorker>,
    channel: ResultChannel<T::Output>,
    /// Success payloads in arrival order.
    results: Vec<T::Output>,
    phase: Phase,
}

impl<T: Task> Run<'_, T> {
    fn execute(mut self, jobs: impl Iterator<Item = JobArgs<T::Args>>) -> Result<Vec<T::Output>> {
        match self.schedule_all(jobs) {
            Ok(()) => {
                tracing::debug!("'{}' completed with {} results", T::NAME, self.results.len());
                Ok(self.results)
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    fn schedule_all(&mut self, jobs: impl Iterator<Item = JobArgs<T::Args>>) -> Result<()> {
        self.enter(Phase::Filling);

        for (n, args) in jobs.enumerate() {
            let job = self.make_job(JobId::new(n as u64), args)?;
            if self.window.is_full() {
                self.collect_one()?;
            }
            self.admit(job)?;
        }

        self.enter(Phase::Draining);
        while !self.window.is_empty() {
            self.collect_one()?;
        }
        Ok(())
    }

    fn make_job(&self, job_id: JobId, args: JobArgs<T::Args>) -> Result<Job<T::Args>> {
        match (args, self.config.with_keyword_args) {
            (JobArgs::Positional(args), false) => Ok(Job::new(job_id, args, Kwargs::new())),
            (JobArgs::Keyword(args, kwargs), true) => Ok(Job::new(job_id, args, kwargs)),
            (JobArgs::Positional(_), true) => Err(Error::InvalidJob {
                job_id,
                message: "expected (args, kwargs) because keyword arguments are enabled"
                    .to_string(),
            }),
            (JobArgs::Keyword(..), false) => Err(Error::InvalidJob {
                job_id,
                message: "got keyword arguments but keyword arguments are disabled".to_string(),
            }),
        }
    }

    fn admit(&mut self, job: Job<T::Args>) -> Result<()> {
        let job_id = job.id;
        let worker = self.backend.spawn(self.task, job, self.channel.sender())?;

        if let Err(mut worker) = self.window.admit(job_id, worker) {
            worker.terminate();
            let _ = worker.join();
            return Err(Error::Ipc(format!("no free worker slot for {}", job_id)));
        }

        tracing::debug!("admitted {} ({} active)", job_id, self.window.len());
        if let Some(callback) = self.callback {
            callback.on_job_started(job_id);
        }
        Ok(())
    }

    /// Block for one delivery and act on it.
    fn collect_one(&mut self) -> Result<()> {
        let delivery = self.channel.recv()?;
        let job_id = delivery.job_id();
        if !self.window.contains(job_id) {
            return Err(Error::Ipc(format!("received a result for unknown {}", job_id)));
        }

        match delivery {
            Delivery::Envelope(ResultEnvelope {
                outcome: Outcome::Success(output),
                ..
            }) => {
                self.results.push(output);
                self.release(job_id)?;
                tracing::debug!("collected {}", job_id);
                if let Some(callback) = self.callback {
                    callback.on_job_completed(job_id);
                }
            }
            Delivery::Envelope(ResultEnvelope {
                outcome: Outcome::Failure(payload),
                ..
            }) => {
                let failure = JobFailure::new(job_id, payload);
                if self.config.propagate_failures {
                    tracing::debug!("{} failed, stopping: {}", job_id, failure.message());
                    if let Some(callback) = self.callback {
                        callback.on_job_failed(job_id, &failure, true);
                    }
                    self.fail(job_id);
                    return Err(Error::Job(failure));
                }

                tracing::debug!("masking failure of {}: {}", job_id, failure.message());
                if let Some(callback) = self.callback {
                    callback.on_job_failed(job_id, &failure, false);
                }
                self.release(job_id)?;
            }
            Delivery::Undeliverable { message, .. } => {
                tracing::warn!("no result from {}: {}", job_id, message);
                self.fail(job_id);
                return Err(Error::WorkerLost { job_id, message });
            }
        }
        Ok(())
    }

    /// Join a worker whose result has been observed and free its slot.
    fn release(&mut self, job_id: JobId) -> Result<()> {
        if let Some(mut worker) = self.window.release(job_id) {
            worker.join()?;
        }
        Ok(())
    }

    /// Kill every other worker, then let go of the one that reported.
    fn fail(&mut self, job_id: JobId) {
        self.enter(Phase::DrainingOnFailure);

        for (other, worker) in self.window.iter_mut() {
            if other != job_id {
                tracing::debug!("terminating {}", other);
                worker.terminate();
            }
        }

        if let Err(e) = self.release(job_id) {
            tracing::warn!("failed to join worker for {}: {}", job_id, e);
        }
    }

    /// Kill and join whatever is still running, then discard any result that
    /// arrived in the meantime.
    fn teardown(&mut self) {
        self.enter(Phase::DrainingOnFailure);

        for (_, worker) in self.window.iter_mut() {
            worker.terminate();
        }
        for (job_id, mut worker) in self.window.drain() {
            if let Err(e) = worker.join() {
                tracing::warn!("failed to join worker for {}: {}", job_id, e);
            }
        }

        let discarded = self.channel.drain();
        if discarded > 0 {
            tracing::debug!("discarded {} late results", discarded);
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        tracing::debug!("phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        if let Some(callback) = self.callback {
            callback.on_phase_changed(phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::job::FailureKind;

    #[derive(Debug, thiserror::Error)]
    #[error("ouch!")]
    struct CrashError;

    /// Echoes its argument, fails on odd numbers when asked to.
    struct Picky;

    impl Task for Picky {
        const NAME: &'static str = "picky";
        type Args = (u32, bool);
        type Output = u32;
        type Error = CrashError;

        fn run(
            &self,
            (n, fail_odd): (u32, bool),
            _: &Kwargs,
        ) -> std::result::Result<u32, CrashError> {
            if fail_odd && n % 2 == 1 {
                return Err(CrashError);
            }
            Ok(n)
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ScheduleCallback for Arc<Recorder> {
        fn on_job_started(&self, job_id: JobId) {
            self.events.lock().unwrap().push(format!("start {}", job_id));
        }
        fn on_job_completed(&self, job_id: JobId) {
            self.events.lock().unwrap().push(format!("done {}", job_id));
        }
        fn on_job_failed(&self, job_id: JobId, failure: &JobFailure, propagated: bool) {
            assert_eq!(failure.kind(), FailureKind::Error);
            self.events
                .lock()
                .unwrap()
                .push(format!("fail {} {}", job_id, propagated));
        }
        fn on_phase_changed(&self, phase: Phase) {
            self.events.lock().unwrap().push(format!("{:?}", phase));
        }
    }

    fn inline(limit: usize) -> SchedulerConfig {
        SchedulerConfig::default().inline().with_concurrency_limit(limit)
    }

    fn jobs(n: u32, fail_odd: bool) -> impl Iterator<Item = JobArgs<(u32, bool)>> {
        (0..n).map(move |i| JobArgs::Positional((i, fail_odd)))
    }

    #[test]
    fn test_zero_limit_fails_before_running() {
        let result = schedule(&Picky, jobs(3, false), inline(0));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_jobs_never_touch_backend() {
        // A missing worker binary is fine when nothing needs to run.
        let config = SchedulerConfig::default().with_worker_path("/definitely/not/a/worker");
        let results = schedule(&Picky, jobs(0, false), config).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_missing_worker_binary_is_reported() {
        let config = SchedulerConfig::default().with_worker_path("/definitely/not/a/worker");
        assert!(matches!(schedule(&Picky, jobs(1, false), config), Err(Error::Ipc(_))));
    }

    #[test]
    fn test_inline_results_in_submission_order() {
        for limit in [1, 3, 64] {
            let results = schedule(&Picky, jobs(10, false), inline(limit)).unwrap();
            assert_eq!(results, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_first_failure_propagates() {
        let err = schedule(&Picky, jobs(10, true), inline(4)).unwrap_err();
        let failure = err.as_job_failure().expect("job failure");
        assert_eq!(failure.job_id(), JobId::new(1));
        assert!(failure.is::<CrashError>());
        assert_eq!(failure.message(), "ouch!");
    }

    #[test]
    fn test_failures_masked() {
        let config = inline(4).with_propagate_failures(false);
        let results = schedule(&Picky, jobs(10, true), config).unwrap();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_keyword_shape_mismatch() {
        let config = inline(2).with_keyword_args(true);
        let err = schedule(&Picky, jobs(2, false), config).unwrap_err();
        assert!(matches!(err, Error::InvalidJob { job_id, .. } if job_id == JobId::new(0)));

        let mixed = vec![
            JobArgs::Positional((0, false)),
            JobArgs::Keyword((1, false), Kwargs::new()),
        ];
        let err = schedule(&Picky, mixed, inline(2)).unwrap_err();
        assert!(matches!(err, Error::InvalidJob { job_id, .. } if job_id == JobId::new(1)));
    }

    #[test]
    fn test_callback_sees_window_slide() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Scheduler::new(inline(2)).unwrap().with_callback(recorder.clone());
        scheduler.run(&Picky, jobs(3, false)).unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start job_0",
                "start job_1",
                "done job_0",
                "start job_2",
                "Draining",
                "done job_1",
                "done job_2",
            ]
        );
    }

    #[test]
    fn test_callback_sees_failure_phase() {
        let recorder = Arc::new(Recorder::default());
        let config = inline(1);
        let scheduler = Scheduler::new(config).unwrap().with_callback(recorder.clone());
        assert!(scheduler.run(&Picky, jobs(4, true)).is_err());

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start job_0",
                "done job_0",
                "start job_1",
                "fail job_1 true",
                "DrainingOnFailure",
            ]
        );
    }

    #[test]
    fn test_scheduler_is_reusable() {
        let scheduler = Scheduler::new(inline(3)).unwrap();
        assert_eq!(scheduler.config().concurrency_limit, 3);
        let first = scheduler.run(&Picky, jobs(5, false)).unwrap();
        let second = scheduler.run(&Picky, jobs(5, false)).unwrap();
        assert_eq!(first, second);
    }
}
