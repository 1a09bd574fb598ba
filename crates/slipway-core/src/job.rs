//! Jobs and the envelopes that report their outcome.

use rkyv::{Archive, Deserialize, Serialize};

/// Keyword arguments passed to a task, ordered by key.
pub type Kwargs = serde_json::Map<String, serde_json::Value>;

/// Identifier of a job within one scheduling call.
///
/// Assigned by the scheduler in submission order, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

/// Arguments for one job as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum JobArgs<A> {
    /// Positional arguments only.
    Positional(A),
    /// Positional arguments plus keyword arguments.
    Keyword(A, Kwargs),
}

/// A unit of work admitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Job<A> {
    pub id: JobId,
    pub args: A,
    pub kwargs: Kwargs,
}

impl<A> Job<A> {
    pub fn new(id: JobId, args: A, kwargs: Kwargs) -> Self {
        Self { id, args, kwargs }
    }
}

/// How a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum FailureKind {
    /// The task returned an error.
    Error,
    /// The task panicked.
    Panic,
}

/// Serialized form of a job failure.
///
/// This is what crosses the worker boundary in place of the live error.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct FailurePayload {
    pub kind: FailureKind,
    /// `std::any::type_name` of the error, or `"panic"`.
    pub error_type: String,
    pub message: String,
    /// Rendered `source()` chain, outermost first.
    pub sources: Vec<String>,
    pub trace: String,
}

/// Outcome of a single job. Exactly one of success or failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<O> {
    Success(O),
    Failure(FailurePayload),
}

impl<O> Outcome<O> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Outcome of a job tagged with the job that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEnvelope<O> {
    pub job_id: JobId,
    pub outcome: Outcome<O>,
}

impl<O> ResultEnvelope<O> {
    pub fn new(job_id: JobId, outcome: Outcome<O>) -> Self {
        Self { job_id, outcome }
    }
}
