//! Inter-process communication for slipway worker processes.
//!
//! This module provides the protocol between the scheduler and its worker
//! processes, the scheduler-side process handle, and the worker-side serve
//! loop.

pub mod protocol;
mod serve;
mod worker;

pub use protocol::{WorkerCommand, WorkerResponse, read_message, write_message};
pub use serve::{serve, serve_if_worker, serve_one};
pub use worker::{WORKER_ENV, WORKER_PATH_ENV, WorkerProcess, locate_worker_binary};
