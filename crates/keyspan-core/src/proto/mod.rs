//! Coordinator/worker wire protocol.
//!
//! Every message travels in a single length-prefixed frame: a 4-byte
//! big-endian length followed by a protobuf [`wire::Envelope`] holding the
//! message kind, a 128-bit correlation id and a kind-specific payload.
//! Length-prefixing means payload bytes can never be mistaken for a frame
//! boundary.
//!
//! ```text
//! worker                     coordinator
//!   | -- Hello ------------------> |
//!   | <------------------- Ack --- |
//!   | -- Idle -------------------> |
//!   | <------------------- Task -- |
//!   | -- Finished ---------------> |   (worker is idle again)
//!   | <------------------- Task -- |
//!   | <------------------- Leave - |
//! ```

mod codec;
#[cfg(test)]
mod tests;
pub mod wire;

pub use codec::*;

use crate::{Error, Job, JobId, JobResult, MessageId, Result};
use bytes::Bytes;
use prost::Message as _;
use wire::MessageKind;

/// A worker-side failure reported to the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientError {
    pub job_id: Option<JobId>,
    pub reason: String,
}

/// Typed protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Worker introduces itself after connecting.
    Hello,
    /// Coordinator accepts the worker.
    Ack,
    /// Worker is ready for a task.
    Idle,
    Task(Job),
    Finished(JobResult),
    ClientError(ClientError),
    /// Coordinator asks the worker to disconnect.
    Leave,
}

impl Message {
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Hello => MessageKind::Hello,
            Self::Ack => MessageKind::Ack,
            Self::Idle => MessageKind::Idle,
            Self::Task(_) => MessageKind::Task,
            Self::Finished(_) => MessageKind::Finished,
            Self::ClientError(_) => MessageKind::ClientError,
            Self::Leave => MessageKind::Leave,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::Hello | Self::Ack | Self::Idle | Self::Leave => Vec::new(),
            Self::Task(job) => job.encode(),
            Self::Finished(result) => result.encode(),
            Self::ClientError(err) => wire::ClientError {
                job_id: err.job_id.map(|id| id.to_bytes().to_vec()),
                reason: err.reason.clone(),
            }
            .encode_to_vec(),
        }
    }

    fn from_payload(kind: MessageKind, payload: &[u8]) -> Result<Self> {
        Ok(match kind {
            MessageKind::Hello => Self::Hello,
            MessageKind::Ack => Self::Ack,
            MessageKind::Idle => Self::Idle,
            MessageKind::Leave => Self::Leave,
            MessageKind::Task => Self::Task(Job::decode(payload)?),
            MessageKind::Finished => Self::Finished(JobResult::decode(payload)?),
            MessageKind::ClientError => {
                let raw = wire::ClientError::decode(payload)?;
                Self::ClientError(ClientError {
                    job_id: raw.job_id.as_deref().map(JobId::from_slice).transpose()?,
                    reason: raw.reason,
                })
            }
        })
    }
}

/// A [`Message`] with its correlation id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub id: MessageId,
    pub message: Message,
}

impl Frame {
    /// Wraps `message` with a fresh correlation id.
    pub fn new(message: Message) -> Self {
        Self {
            id: MessageId::new(),
            message,
        }
    }

    /// Serializes the frame body (without the length prefix).
    pub fn encode(&self) -> Bytes {
        wire::Envelope {
            kind: self.message.kind().into(),
            id: self.id.to_bytes().to_vec(),
            payload: Bytes::from(self.message.payload()),
        }
        .encode_to_vec()
        .into()
    }

    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `bytes` is not a valid envelope or its
    /// payload does not match its kind.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope = wire::Envelope::decode(bytes)?;
        let kind = MessageKind::try_from(envelope.kind)
            .map_err(|_| Error::decode(format!("unknown message kind {}", envelope.kind)))?;
        Ok(Self {
            id: MessageId::from_slice(&envelope.id)?,
            message: Message::from_payload(kind, &envelope.payload)?,
        })
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}
