//! Per-job entry point: run a task and turn whatever happens into an
//! [`Outcome`].
//!
//! Errors are flattened into a [`FailurePayload`] right here. Panics are
//! caught, and the backtrace at the panic site is recorded by a panic hook
//! that only acts for threads currently inside [`run_job`].

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use crate::job::{FailureKind, FailurePayload, Job, Outcome};
use crate::task::Task;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Install the capturing panic hook, chaining to whatever hook was there.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let trace = Backtrace::force_capture().to_string();
                PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

/// Clears the capturing flag even if the task unwinds.
struct CaptureGuard;

impl CaptureGuard {
    fn enter() -> Self {
        PANIC_TRACE.with(|slot| slot.borrow_mut().take());
        CAPTURING.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURING.with(|flag| flag.set(false));
    }
}

/// Run one job to completion and report its outcome.
///
/// Never panics and never returns the task's error as a live value.
pub fn run_job<T: Task>(task: &T, job: Job<T::Args>) -> Outcome<T::Output> {
    install_panic_hook();

    let Job { id, args, kwargs } = job;
    let _span = tracing::debug_span!("job", job_id = %id, task = T::NAME).entered();

    let result = {
        let _guard = CaptureGuard::enter();
        panic::catch_unwind(AssertUnwindSafe(|| task.run(args, &kwargs)))
    };

    match result {
        Ok(Ok(output)) => Outcome::Success(output),
        Ok(Err(error)) => {
            tracing::debug!("task returned an error: {}", error);
            Outcome::Failure(error_payload::<T>(&error, Backtrace::force_capture()))
        }
        Err(panic) => {
            let trace = PANIC_TRACE
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| Backtrace::force_capture().to_string());
            let message = panic_message(panic.as_ref());
            tracing::debug!("task panicked: {}", message);
            Outcome::Failure(FailurePayload {
                kind: FailureKind::Panic,
                error_type: "panic".to_string(),
                message,
                sources: Vec::new(),
                trace,
            })
        }
    }
}

/// Flatten an error returned by task `T` into its serializable form.
///
/// The trace opens with the task name and the error's `Debug` rendering,
/// which carries the creation-site backtrace for `anyhow`-style errors. The
/// backtrace of the capture point follows.
pub fn error_payload<T: Task>(error: &T::Error, trace: Backtrace) -> FailurePayload {
    let mut sources = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        sources.push(cause.to_string());
        source = cause.source();
    }

    FailurePayload {
        kind: FailureKind::Error,
        error_type: std::any::type_name::<T::Error>().to_string(),
        message: error.to_string(),
        sources,
        trace: format!("in task '{}': {:?}\n\n{}", T::NAME, error, trace),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, Kwargs};

    #[derive(Debug, thiserror::Error)]
    #[error("ouch!")]
    struct CrashError;

    #[derive(Debug, thiserror::Error)]
    #[error("could not load job input")]
    struct LoadError(#[source] std::io::Error);

    struct Echo;

    impl Task for Echo {
        const NAME: &'static str = "echo";
        type Args = (u32, String);
        type Output = ((u32, String), Kwargs);
        type Error = CrashError;

        fn run(&self, args: (u32, String), kwargs: &Kwargs) -> Result<Self::Output, CrashError> {
            Ok((args, kwargs.clone()))
        }
    }

    struct Crash;

    impl Task for Crash {
        const NAME: &'static str = "crash";
        type Args = ();
        type Output = ();
        type Error = CrashError;

        fn run(&self, _: (), _: &Kwargs) -> Result<(), CrashError> {
            Err(CrashError)
        }
    }

    struct Load;

    impl Task for Load {
        const NAME: &'static str = "load";
        type Args = ();
        type Output = ();
        type Error = LoadError;

        fn run(&self, _: (), _: &Kwargs) -> Result<(), LoadError> {
            Err(LoadError(std::io::Error::other("disk on fire")))
        }
    }

    struct Explode;

    impl Task for Explode {
        const NAME: &'static str = "explode";
        type Args = u32;
        type Output = u32;
        type Error = CrashError;

        fn run(&self, n: u32, _: &Kwargs) -> Result<u32, CrashError> {
            if n > 0 {
                panic!("boom at {}", n);
            }
            Ok(n)
        }
    }

    #[test]
    fn test_success_passes_args_and_kwargs() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("bla".to_string(), serde_json::json!(1));
        let job = Job::new(JobId::new(10), (3, "x".to_string()), kwargs.clone());

        match run_job(&Echo, job) {
            Outcome::Success((args, echoed)) => {
                assert_eq!(args, (3, "x".to_string()));
                assert_eq!(echoed, kwargs);
            }
            other => panic!("Wrong outcome: {:?}", other),
        }
    }

    #[test]
    fn test_error_is_captured() {
        match run_job(&Crash, Job::new(JobId::new(1), (), Kwargs::new())) {
            Outcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Error);
                assert_eq!(failure.error_type, std::any::type_name::<CrashError>());
                assert_eq!(failure.message, "ouch!");
                assert!(failure.sources.is_empty());
                assert!(failure.trace.starts_with("in task 'crash': CrashError"));
            }
            other => panic!("Wrong outcome: {:?}", other),
        }
    }

    #[test]
    fn test_source_chain_is_rendered() {
        match run_job(&Load, Job::new(JobId::new(2), (), Kwargs::new())) {
            Outcome::Failure(failure) => {
                assert_eq!(failure.message, "could not load job input");
                assert_eq!(failure.sources, vec!["disk on fire".to_string()]);
                assert!(failure.trace.contains("in task 'load'"));
                assert!(failure.trace.contains("LoadError(Custom"));
            }
            other => panic!("Wrong outcome: {:?}", other),
        }
    }

    #[test]
    fn test_panic_is_captured_with_trace() {
        match run_job(&Explode, Job::new(JobId::new(3), 5, Kwargs::new())) {
            Outcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Panic);
                assert_eq!(failure.error_type, "panic");
                assert_eq!(failure.message, "boom at 5");
                assert!(!failure.trace.is_empty());
            }
            other => panic!("Wrong outcome: {:?}", other),
        }

        // The thread keeps working normally afterwards.
        assert!(run_job(&Explode, Job::new(JobId::new(4), 0, Kwargs::new())).is_success());
    }
}
