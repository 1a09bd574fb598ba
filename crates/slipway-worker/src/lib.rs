//! Built-in tasks hosted by the reference `slipway-worker` binary.
//!
//! Positional arguments are JSON arrays, so any tuple of serializable values
//! can be passed. Applications with their own tasks build their own worker
//! around [`slipway_core::ipc::serve`].

use std::convert::Infallible;
use std::time::Duration;

use serde_json::Value;
use slipway_core::{Kwargs, Task, TaskRegistry};

/// Positional arguments as a JSON array.
pub type Args = Vec<Value>;

/// Error raised by [`Crash`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CrashError(pub String);

/// Returns its positional arguments unchanged.
pub struct Identity;

impl Task for Identity {
    const NAME: &'static str = "identity";
    type Args = Args;
    type Output = Args;
    type Error = Infallible;

    fn run(&self, args: Args, _kwargs: &Kwargs) -> Result<Args, Infallible> {
        Ok(args)
    }
}

/// Returns positional and keyword arguments.
pub struct EchoAll;

impl Task for EchoAll {
    const NAME: &'static str = "echo_all";
    type Args = Args;
    type Output = (Args, Kwargs);
    type Error = Infallible;

    fn run(&self, args: Args, kwargs: &Kwargs) -> Result<(Args, Kwargs), Infallible> {
        Ok((args, kwargs.clone()))
    }
}

/// Sleeps for a time derived from the first argument, then echoes.
///
/// Neighbouring integers get very different delays, so a wide window finishes
/// jobs out of submission order.
pub struct Jitter;

impl Jitter {
    pub fn delay(args: &Args) -> Duration {
        let n = args.first().and_then(Value::as_u64).unwrap_or(0);
        Duration::from_millis(n.wrapping_mul(37) % 50)
    }
}

impl Task for Jitter {
    const NAME: &'static str = "jitter";
    type Args = Args;
    type Output = Args;
    type Error = Infallible;

    fn run(&self, args: Args, _kwargs: &Kwargs) -> Result<Args, Infallible> {
        std::thread::sleep(Self::delay(&args));
        Ok(args)
    }
}

/// Sleeps for the given number of milliseconds and returns it.
pub struct SleepMs;

impl Task for SleepMs {
    const NAME: &'static str = "sleep_ms";
    type Args = (u64,);
    type Output = u64;
    type Error = Infallible;

    fn run(&self, (ms,): (u64,), _kwargs: &Kwargs) -> Result<u64, Infallible> {
        std::thread::sleep(Duration::from_millis(ms));
        Ok(ms)
    }
}

/// Always fails with `CrashError("ouch!")`.
pub struct Crash;

impl Task for Crash {
    const NAME: &'static str = "crash";
    type Args = Args;
    type Output = Args;
    type Error = CrashError;

    fn run(&self, _args: Args, _kwargs: &Kwargs) -> Result<Args, CrashError> {
        Err(CrashError("ouch!".to_string()))
    }
}

/// Sleeps for `ms` milliseconds and echoes it, or fails right away when
/// `crash` is set.
pub struct SleepOrCrash;

impl Task for SleepOrCrash {
    const NAME: &'static str = "sleep_or_crash";
    type Args = (u64, bool);
    type Output = u64;
    type Error = CrashError;

    fn run(&self, (ms, crash): (u64, bool), _kwargs: &Kwargs) -> Result<u64, CrashError> {
        if crash {
            return Err(CrashError(format!("crashed instead of sleeping {}ms", ms)));
        }
        std::thread::sleep(Duration::from_millis(ms));
        Ok(ms)
    }
}

/// Always panics.
pub struct Panic;

impl Task for Panic {
    const NAME: &'static str = "panic";
    type Args = Args;
    type Output = Args;
    type Error = Infallible;

    fn run(&self, args: Args, _kwargs: &Kwargs) -> Result<Args, Infallible> {
        panic!("panic task called with {:?}", args);
    }
}

/// Kills its own process without reporting anything.
pub struct Abort;

impl Task for Abort {
    const NAME: &'static str = "abort";
    type Args = Args;
    type Output = Args;
    type Error = Infallible;

    fn run(&self, _args: Args, _kwargs: &Kwargs) -> Result<Args, Infallible> {
        std::process::abort();
    }
}

/// Registry with every built-in task.
pub fn registry() -> TaskRegistry {
    TaskRegistry::new()
        .with(Identity)
        .with(EchoAll)
        .with(Jitter)
        .with(SleepMs)
        .with(Crash)
        .with(SleepOrCrash)
        .with(Panic)
        .with(Abort)
}
