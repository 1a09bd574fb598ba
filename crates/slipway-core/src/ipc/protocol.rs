//! IPC protocol messages for slipway worker processes.
//!
//! Uses length-prefixed rkyv messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + rkyv-encoded message.
//! User payloads travel as JSON bytes inside the rkyv frame.

use std::io::{Read, Write};

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::FailurePayload;

/// Frames larger than this are rejected as corrupt.
const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Command sent from the scheduler to a worker process.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum WorkerCommand {
    /// Run one job of a registered task.
    Run {
        /// Registered task name.
        task: String,
        /// Job id, echoed back in the response.
        job_id: u64,
        /// JSON-encoded positional arguments.
        args_json: Vec<u8>,
        /// JSON-encoded keyword arguments (an object).
        kwargs_json: Vec<u8>,
    },
}

/// Response sent from a worker process to the scheduler.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum WorkerResponse {
    /// The task returned normally.
    Completed {
        job_id: u64,
        /// JSON-encoded task output.
        payload_json: Vec<u8>,
    },

    /// The task returned an error or panicked.
    Failed {
        job_id: u64,
        failure: FailurePayload,
    },

    /// The job could not be run or its result could not be encoded.
    Undeliverable {
        job_id: u64,
        message: String,
    },
}

impl WorkerResponse {
    pub fn job_id(&self) -> u64 {
        match self {
            Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Undeliverable { job_id, .. } => *job_id,
        }
    }
}

/// Write a message to a writer using length-prefixed rkyv encoding.
pub fn write_message<W: Write>(
    writer: &mut W,
    message: &impl for<'a> Serialize<
        rkyv::rancor::Strategy<
            rkyv::ser::Serializer<
                rkyv::util::AlignedVec,
                rkyv::ser::allocator::ArenaHandle<'a>,
                rkyv::ser::sharing::Share,
            >,
            rkyv::rancor::Error,
        >,
    >,
) -> Result<()> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;

    let len = u32::try_from(bytes.len()).map_err(|_| {
        Error::Serialization(format!("IPC message too large: {} bytes", bytes.len()))
    })?;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read a message from a reader using length-prefixed rkyv encoding.
///
/// # Safety
///
/// Uses unchecked deserialization. Only safe when reading from trusted
/// sources: our own scheduler or worker processes.
pub fn read_message<R: Read, T>(reader: &mut R) -> Result<T>
where
    T: Archive,
    T::Archived: Deserialize<T, rkyv::rancor::Strategy<rkyv::de::Pool, rkyv::rancor::Error>>,
{
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    // rkyv needs the archive aligned; a plain Vec<u8> gives no such promise.
    let mut bytes = rkyv::util::AlignedVec::<16>::with_capacity(len);
    bytes.resize(len, 0);
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    // SAFETY: frames only ever come from our own scheduler or worker.
    let message = unsafe { rkyv::from_bytes_unchecked::<T, rkyv::rancor::Error>(&bytes) }
        .map_err(|e| Error::Deserialization(format!("Failed to decode IPC message: {}", e)))?;

    Ok(message)
}
