//! Error taxonomy for per-frame processing.
//!
//! None of these are fatal to the process. Each maps to a local recovery:
//! - `DecodeError`: the frame is answered with an error result, the session stays open.
//! - `DetectorFailure`: the failing detector reports `NotFound` for that frame.
//! - `ProtocolViolation`: the offending message is answered or rejected, the session stays open.
//! - `SessionTerminated`: the session tears down and sends nothing further.

use std::time::Duration;

use thiserror::Error;

/// The frame bytes could not be turned into an image.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is empty")]
    Empty,

    #[error("frame is not a recognized image encoding")]
    UnrecognizedEncoding,

    #[error("frame declared as {declared} but bytes are {actual}")]
    EncodingMismatch {
        declared: &'static str,
        actual: &'static str,
    },

    #[error("frame is truncated or corrupt: {0}")]
    Malformed(String),

    #[error("frame payload is not valid base64: {0}")]
    InvalidBase64(String),
}

/// A single detector could not produce an outcome for a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectorFailure {
    #[error("detector timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("detector panicked")]
    Panicked,

    #[error("external service error: {0}")]
    Service(String),

    #[error("malformed external response: {0}")]
    MalformedResponse(String),

    #[error("image processing failed: {0}")]
    Image(String),
}

/// The peer sent something the session cannot accept as a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("expected a {expected} message, got {got}")]
    UnexpectedMessageKind {
        expected: &'static str,
        got: &'static str,
    },

    #[error("malformed frame envelope: {0}")]
    MalformedEnvelope(String),

    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
}

/// The connection ended; nothing further is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("session terminated: {reason}")]
pub struct SessionTerminated {
    pub reason: String,
}
