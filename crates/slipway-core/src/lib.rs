//! Core engine for slipway, a sliding-window job scheduler.
//!
//! This crate provides:
//! - The window scheduler that keeps at most N workers busy
//! - Process-isolated and inline execution backends
//! - The IPC protocol spoken with worker processes
//! - The task registry and serve loop used inside worker processes
//!
//! # Example
//!
//! ```no_run
//! use slipway_core::{JobArgs, Kwargs, SchedulerConfig, Task, schedule};
//!
//! struct Square;
//!
//! impl Task for Square {
//!     const NAME: &'static str = "square";
//!     type Args = (i64,);
//!     type Output = i64;
//!     type Error = std::convert::Infallible;
//!
//!     fn run(&self, (x,): (i64,), _kwargs: &Kwargs) -> Result<i64, Self::Error> {
//!         Ok(x * x)
//!     }
//! }
//!
//! // The worker binary must register `Square` too.
//! let jobs = (0..100).map(|x| JobArgs::Positional((x,)));
//! let squares = schedule(&Square, jobs, SchedulerConfig::default())?;
//! assert_eq!(squares.len(), 100);
//! # Ok::<(), slipway_core::Error>(())
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod execute;
pub mod ipc;
pub mod job;
pub mod scheduler;
pub mod task;

pub use config::{BackendKind, SchedulerConfig};
pub use error::{Error, JobFailure, Result};
pub use execute::Backend;
pub use job::{FailureKind, FailurePayload, Job, JobArgs, JobId, Kwargs, Outcome, ResultEnvelope};
pub use scheduler::{Phase, ScheduleCallback, Scheduler, schedule};
pub use task::{Task, TaskRegistry};
