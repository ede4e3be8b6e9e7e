//! Domain-specific error types for capture and transfer.
//!
//! All fallible operations return `Result<T, LongformError>`.
//! The transfer state machine records its failure as one of the three
//! protocol-level kinds (`ProtocolError`, `LinkError`, `EncodingError`)
//! so callers can tell a rejected offer from a dropped link.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the longform crates.
#[derive(Debug, Error)]
pub enum LongformError {
    // ── Transfer Errors ──────────────────────────────────────────
    /// The peer or its GATT profile did not behave as the protocol requires.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The wireless link dropped or refused an operation.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// A payload or file name could not be framed.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    // ── Infrastructure Errors ────────────────────────────────────
    /// The IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A state machine was asked for a transition its current phase forbids.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// A fixture or config file could not be parsed.
    #[error("invalid config: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── ProtocolError ────────────────────────────────────────────────

/// Violations of the offer/response/chunk exchange or the GATT profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A required service, characteristic or descriptor is absent.
    #[error("{0} not found")]
    MissingEndpoint(&'static str),

    /// The peer refused to enable indications on the server characteristic.
    #[error("failed to enable indications (status: {status})")]
    IndicationsRejected { status: u8 },

    /// Local subscription to the server characteristic failed.
    #[error("failed to enable local notifications")]
    SubscribeFailed,

    /// Service discovery completed with a failure status.
    #[error("service discovery failed")]
    DiscoveryFailed,

    /// The peer answered the offer with a nonzero status.
    #[error("Error #{code} occurred")]
    PeerRejected { code: i32 },

    /// A frame was shorter than its fixed header or otherwise inconsistent.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// The leading frame type field did not match any known frame.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(u32),

    /// A transaction id outside `1..=i32::MAX`.
    #[error("invalid transaction id: {0}")]
    InvalidTransactionId(u32),

    /// A frame carried a transaction id belonging to another session.
    #[error("transaction id mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u32, actual: u32 },

    /// A chunk arrived at an offset other than the next expected byte.
    #[error("unexpected chunk offset: expected {expected}, got {actual}")]
    UnexpectedOffset { expected: u32, actual: u32 },
}

// ── LinkError ────────────────────────────────────────────────────

/// Failures of the underlying wireless (or emulated) link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The peer disconnected or the link dropped mid-session.
    #[error("link lost")]
    Lost,

    /// The link could not be opened.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A write did not complete successfully.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The peer stayed silent past the configured deadline.
    #[error("peer silent for {0:?}")]
    Timeout(Duration),

    /// The session was aborted locally.
    #[error("aborted")]
    Aborted,

    /// An operation was issued on a link that is not open.
    #[error("link not connected")]
    NotConnected,
}

// ── EncodingError ────────────────────────────────────────────────

/// Framing problems. Name overflow is resolved by truncation and only
/// reported; the other variants stop the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The file name did not fit the offer frame and was shortened.
    #[error("file name truncated from {original} to {truncated} bytes")]
    NameTruncated { original: usize, truncated: usize },

    /// The negotiated size leaves no room for chunk payload.
    #[error(
        "no room for payload: negotiated {negotiated}, header {header}, overhead {overhead}"
    )]
    WindowTooSmall {
        negotiated: usize,
        header: usize,
        overhead: usize,
    },

    /// The payload length does not fit the 32-bit length field.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LongformError {
    fn from(s: String) -> Self {
        LongformError::Other(s)
    }
}

impl From<&str> for LongformError {
    fn from(s: &str) -> Self {
        LongformError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LongformError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LongformError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for LongformError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        LongformError::Other(format!("bincode: {e}"))
    }
}

impl From<serde_json::Error> for LongformError {
    fn from(e: serde_json::Error) -> Self {
        LongformError::Config(e.to_string())
    }
}
