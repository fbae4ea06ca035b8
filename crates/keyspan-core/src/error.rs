//! Error types shared by the coordinator and its workers.
//!
//! This module defines the central `Error` enum, which captures every failure
//! the keyspace, job and protocol layers can report.
//!
//! ## Error Cases
//! - `OutOfRange`: An offset does not address a candidate inside the keyspace.
//! - `EmptyAlphabet` / `InvalidLength`: A keyspace cannot be constructed.
//! - `DivisionByZero` / `Underflow` / `InvalidNumber`: Arbitrary-precision
//!   arithmetic misuse.
//! - `Decode`: Bytes received from a peer could not be decoded.
//! - `FrameTooLarge`: An outgoing message exceeds the negotiated frame limit.
//! - `UnexpectedMessage`: A message arrived in a state that does not accept it.
//! - `Io`: The underlying transport failed.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for keyspace, job and protocol operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The requested offset lies outside `0..alphabet_size^length`.
    #[error("Offset {offset} is out of range for a keyspace of {size} candidates")]
    OutOfRange { offset: String, size: String },

    /// An alphabet needs at least one symbol.
    #[error("Alphabet must contain at least one symbol")]
    EmptyAlphabet,

    /// Candidate length must be at least one symbol.
    #[error("Invalid candidate length: {reason}")]
    InvalidLength { reason: String },

    #[error("Division by zero")]
    DivisionByZero,

    /// Subtraction would produce a negative keyspace position.
    #[error("Subtraction underflow: {lhs} - {rhs}")]
    Underflow { lhs: String, rhs: String },

    /// A decimal string could not be parsed as a keyspace position.
    #[error("Invalid decimal number: {input:?}")]
    InvalidNumber { input: String },

    /// Peer bytes could not be decoded into a protocol value.
    #[error("Decode error: {reason}")]
    Decode { reason: String },

    /// An encoded message exceeds the configured frame length.
    #[error("Frame too large: max {max_frame_bytes} got {got_bytes}")]
    FrameTooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },

    /// A message was received in a state that does not accept it.
    #[error("Unexpected {kind} message: {context}")]
    UnexpectedMessage { kind: &'static str, context: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Self::decode(err.to_string())
    }
}
