//! Tasks: the functions slipway schedules.
//!
//! A closure cannot be sent to another process, so a task is a type with a
//! stable name. The coordinator sends the name plus serialized arguments, and
//! the worker process looks the task up in its [`TaskRegistry`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::execute::capture;
use crate::ipc::WorkerResponse;
use crate::job::{Job, JobId, Kwargs, Outcome};

/// A function that can be scheduled.
///
/// # Example
///
/// ```
/// use slipway_core::{Kwargs, Task};
///
/// struct Square;
///
/// impl Task for Square {
///     const NAME: &'static str = "square";
///     type Args = (i64,);
///     type Output = i64;
///     type Error = std::convert::Infallible;
///
///     fn run(&self, (x,): (i64,), _kwargs: &Kwargs) -> Result<i64, Self::Error> {
///         Ok(x * x)
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Name the worker process uses to find this task.
    const NAME: &'static str;

    /// Positional arguments.
    type Args: Serialize + DeserializeOwned + Send + 'static;

    /// Success payload.
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    fn run(&self, args: Self::Args, kwargs: &Kwargs) -> Result<Self::Output, Self::Error>;
}

/// Type-erased task as seen from inside a worker process.
trait ErasedTask: Send + Sync {
    fn dispatch(&self, job_id: JobId, args_json: &[u8], kwargs_json: &[u8]) -> WorkerResponse;
}

struct Registered<T>(T);

impl<T: Task> ErasedTask for Registered<T> {
    fn dispatch(&self, job_id: JobId, args_json: &[u8], kwargs_json: &[u8]) -> WorkerResponse {
        let undeliverable = |message: String| WorkerResponse::Undeliverable {
            job_id: job_id.as_u64(),
            message,
        };

        let args: T::Args = match serde_json::from_slice(args_json) {
            Ok(args) => args,
            Err(e) => {
                return undeliverable(format!(
                    "failed to decode arguments for '{}': {}",
                    T::NAME,
                    e
                ));
            }
        };
        let kwargs: Kwargs = match serde_json::from_slice(kwargs_json) {
            Ok(kwargs) => kwargs,
            Err(e) => {
                return undeliverable(format!(
                    "failed to decode keyword arguments for '{}': {}",
                    T::NAME,
                    e
                ));
            }
        };

        match capture::run_job(&self.0, Job::new(job_id, args, kwargs)) {
            Outcome::Success(output) => match serde_json::to_vec(&output) {
                Ok(payload_json) => WorkerResponse::Completed {
                    job_id: job_id.as_u64(),
                    payload_json,
                },
                Err(e) => undeliverable(format!("failed to encode result of '{}': {}", T::NAME, e)),
            },
            Outcome::Failure(failure) => WorkerResponse::Failed {
                job_id: job_id.as_u64(),
                failure,
            },
        }
    }
}

/// Tasks a worker process can run, keyed by [`Task::NAME`].
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<&'static str, Box<dyn ErasedTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. A task registered under the same name is replaced.
    pub fn register<T: Task>(&mut self, task: T) -> &mut Self {
        if self.tasks.insert(T::NAME, Box::new(Registered(task))).is_some() {
            tracing::warn!("task '{}' registered twice, keeping the last one", T::NAME);
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: Task>(mut self, task: T) -> Self {
        self.register(task);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tasks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run one job of the named task and build the response for the
    /// coordinator.
    pub fn dispatch(
        &self,
        task: &str,
        job_id: JobId,
        args_json: &[u8],
        kwargs_json: &[u8],
    ) -> WorkerResponse {
        match self.tasks.get(task) {
            Some(entry) => entry.dispatch(job_id, args_json, kwargs_json),
            None => WorkerResponse::Undeliverable {
                job_id: job_id.as_u64(),
                message: format!("worker has no task named '{}'", task),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::FailureKind;

    struct Double;

    impl Task for Double {
        const NAME: &'static str = "double";
        type Args = (i64,);
        type Output = i64;
        type Error = std::num::TryFromIntError;

        fn run(&self, (x,): (i64,), _kwargs: &Kwargs) -> Result<i64, Self::Error> {
            // Negative inputs fail through a real conversion error.
            let x = u32::try_from(x)?;
            Ok(i64::from(x) * 2)
        }
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new().with(Double)
    }

    #[test]
    fn test_dispatch_success() {
        let response = registry().dispatch("double", JobId::new(7), b"[21]", b"{}");
        match response {
            WorkerResponse::Completed { job_id, payload_json } => {
                assert_eq!(job_id, 7);
                assert_eq!(payload_json, b"42");
            }
            other => panic!("Wrong response: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_failure_carries_error_type() {
        let response = registry().dispatch("double", JobId::new(1), b"[-1]", b"{}");
        match response {
            WorkerResponse::Failed { job_id, failure } => {
                assert_eq!(job_id, 1);
                assert_eq!(failure.kind, FailureKind::Error);
                assert_eq!(
                    failure.error_type,
                    std::any::type_name::<std::num::TryFromIntError>()
                );
            }
            other => panic!("Wrong response: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_task_is_undeliverable() {
        let response = registry().dispatch("triple", JobId::new(0), b"[1]", b"{}");
        match response {
            WorkerResponse::Undeliverable { message, .. } => assert!(message.contains("triple")),
            other => panic!("Wrong response: {:?}", other),
        }
    }

    #[test]
    fn test_bad_arguments_are_undeliverable() {
        let response = registry().dispatch("double", JobId::new(0), b"\"nope\"", b"{}");
        assert!(matches!(response, WorkerResponse::Undeliverable { .. }));
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = registry();
        registry.register(Double);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["double"]);
        assert!(registry.contains("double"));
    }
}
