//! Wire protocol of the replay service.
//!
//! Every message is a bincode (standard config) payload behind a 4-byte
//! big-endian length prefix:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │ len: u32 BE  │ bincode(Request | Response) │
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! A connection carries strictly alternating request/response pairs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use crate::core::transition::Transition;
use crate::core::variable_channel::VariableSnapshot;
use crate::error::Result;

/// Upper bound on a single frame. Larger prefixes mean a corrupt stream.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Client to server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Commit {
        table: String,
        transition: Transition,
        priority: f64,
    },
    Sample {
        table: String,
        batch_size: usize,
    },
    Len {
        table: String,
    },
    Checkpoint {
        table: String,
    },
    Push {
        table: String,
        actor: Vec<u8>,
        train_step: u64,
    },
    Pull {
        table: String,
    },
    SetStop {
        table: String,
    },
    IsStopped {
        table: String,
    },
}

impl Request {
    /// Table addressed by the request.
    pub fn table(&self) -> &str {
        match self {
            Request::Commit { table, .. }
            | Request::Sample { table, .. }
            | Request::Len { table }
            | Request::Checkpoint { table }
            | Request::Push { table, .. }
            | Request::Pull { table }
            | Request::SetStop { table }
            | Request::IsStopped { table } => table,
        }
    }

    /// Whether applying the request twice has the same effect as once.
    ///
    /// A second `Commit` would store the transition again. A `Push` with the
    /// same `train_step` is accepted and leaves the same slot contents.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Request::Commit { .. })
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Commit { .. } => "commit",
            Request::Sample { .. } => "sample",
            Request::Len { .. } => "len",
            Request::Checkpoint { .. } => "checkpoint",
            Request::Push { .. } => "push",
            Request::Pull { .. } => "pull",
            Request::SetStop { .. } => "set_stop",
            Request::IsStopped { .. } => "is_stopped",
        }
    }
}

/// Server to client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Write accepted.
    Ok,
    /// Sample result. `None` while the table is below its minimum size.
    Batch(Option<Vec<Transition>>),
    /// Table size.
    Len(usize),
    /// Checkpoint location, `None` when checkpointing is disabled.
    Checkpoint(Option<PathBuf>),
    /// Pull result. `None` maps to `Pull::Unavailable`.
    Snapshot(Option<VariableSnapshot>),
    /// Stop flag.
    Stopped(bool),
    /// The request failed on the server.
    Error(String),
}

/// Encode `message` and write it as one length-prefixed frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let payload = bincode::serde::encode_to_vec(message, bincode::config::standard())?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(oversized(payload.len()).into());
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame and decode it.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(oversized(len).into());
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let (message, _) = bincode::serde::decode_from_slice(&payload, bincode::config::standard())?;
    Ok(message)
}

fn oversized(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
    )
}
