//! Process-isolated execution.
//!
//! Every job gets a freshly spawned worker process with its own memory. A
//! crash inside a worker cannot touch scheduler state, and a worker can be
//! killed at any time without its cooperation.

use std::path::{Path, PathBuf};

use crate::channel::ResultSender;
use crate::error::{Error, Result};
use crate::ipc::{WorkerCommand, WorkerProcess, locate_worker_binary};
use crate::job::Job;
use crate::task::Task;

/// Backend that runs each job in its own worker process.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
}

impl ProcessBackend {
    /// Use the given worker binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find the worker binary, preferring `explicit` when given.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        let program = locate_worker_binary(explicit)?;
        tracing::debug!("using worker binary {}", program.display());
        Ok(Self { program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Start a worker process for `job`.
    ///
    /// Arguments are encoded here, so a payload that cannot be serialized
    /// fails before any process is started.
    pub fn spawn<T: Task>(
        &self,
        job: Job<T::Args>,
        results: ResultSender<T::Output>,
    ) -> Result<WorkerProcess> {
        let args_json = serde_json::to_vec(&job.args).map_err(|e| {
            Error::Serialization(format!("arguments of {} for '{}': {}", job.id, T::NAME, e))
        })?;
        let kwargs_json = serde_json::to_vec(&job.kwargs).map_err(|e| {
            Error::Serialization(format!(
                "keyword arguments of {} for '{}': {}",
                job.id,
                T::NAME,
                e
            ))
        })?;

        let command = WorkerCommand::Run {
            task: T::NAME.to_string(),
            job_id: job.id.as_u64(),
            args_json,
            kwargs_json,
        };

        WorkerProcess::spawn(&self.program, job.id, command, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ResultChannel;
    use crate::job::{JobId, Kwargs};

    struct Unsendable;

    /// Arguments whose serialization always fails.
    struct Opaque;

    impl serde::Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque value"))
        }
    }

    impl<'de> serde::Deserialize<'de> for Opaque {
        fn deserialize<D: serde::Deserializer<'de>>(_: D) -> std::result::Result<Self, D::Error> {
            Ok(Opaque)
        }
    }

    impl Task for Unsendable {
        const NAME: &'static str = "unsendable";
        type Args = Opaque;
        type Output = ();
        type Error = std::convert::Infallible;

        fn run(&self, _: Opaque, _: &Kwargs) -> std::result::Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_unserializable_arguments_fail_before_spawn() {
        // The program does not exist: reaching the spawn would give Error::Spawn.
        let backend = ProcessBackend::new("/definitely/not/a/worker");
        let channel = ResultChannel::new();
        let result = backend.spawn::<Unsendable>(
            Job::new(JobId::new(0), Opaque, Kwargs::new()),
            channel.sender(),
        );
        match result {
            Err(Error::Serialization(message)) => assert!(message.contains("opaque value")),
            Err(other) => panic!("Wrong error: {}", other),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[test]
    fn test_locate_explicit() {
        let exe = std::env::current_exe().unwrap();
        let backend = ProcessBackend::locate(Some(&exe)).unwrap();
        assert_eq!(backend.program(), exe.as_path());
    }
}
