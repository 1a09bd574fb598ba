//! Result channel between workers and the scheduler.
//!
//! Any number of workers deliver into one receiver. Deliveries arrive in
//! completion order, which depends on timing and is not deterministic across
//! workers.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::{Error, Result};
use crate::job::{JobId, ResultEnvelope};

/// Something a worker reports back to the scheduler.
#[derive(Debug)]
pub enum Delivery<O> {
    /// The job ran and produced an envelope.
    Envelope(ResultEnvelope<O>),
    /// No envelope could be delivered for the job (worker died, payload did
    /// not encode or decode).
    Undeliverable { job_id: JobId, message: String },
}

impl<O> Delivery<O> {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Envelope(envelope) => envelope.job_id,
            Self::Undeliverable { job_id, .. } => *job_id,
        }
    }
}

/// Receiving end owned by the scheduler for the duration of one call.
pub struct ResultChannel<O> {
    tx: Sender<Delivery<O>>,
    rx: Receiver<Delivery<O>>,
}

impl<O> ResultChannel<O> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// Create a sender for one worker.
    pub fn sender(&self) -> ResultSender<O> {
        ResultSender {
            tx: self.tx.clone(),
        }
    }

    /// Block until the next delivery arrives.
    pub fn recv(&self) -> Result<Delivery<O>> {
        self.rx
            .recv()
            .map_err(|_| Error::Ipc("result channel closed".to_string()))
    }

    /// Discard everything currently queued. Returns how many deliveries were
    /// dropped.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }
}

impl<O> Default for ResultChannel<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending end handed to a worker.
pub struct ResultSender<O> {
    tx: Sender<Delivery<O>>,
}

impl<O> Clone for ResultSender<O> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<O> ResultSender<O> {
    /// Deliver a job's envelope.
    pub fn deliver(&self, envelope: ResultEnvelope<O>) {
        self.send(Delivery::Envelope(envelope));
    }

    /// Report that no envelope can be delivered for a job.
    pub fn undeliverable(&self, job_id: JobId, message: impl Into<String>) {
        self.send(Delivery::Undeliverable {
            job_id,
            message: message.into(),
        });
    }

    fn send(&self, delivery: Delivery<O>) {
        let job_id = delivery.job_id();
        // The scheduler only drops its receiver once it has stopped listening.
        if self.tx.send(delivery).is_err() {
            tracing::trace!("dropping delivery for {}: scheduler gone", job_id);
        }
    }
}
