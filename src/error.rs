//! Error types for the EtherNet/IP + CIP session core.
//!
//! Three kinds are distinguished per the severity of the failure to the
//! session: a [`CipError::Transport`] failure is fatal to the TCP
//! connection, a [`CipError::Protocol`] failure is fatal to the CIP
//! connection but may leave the encapsulation session intact, and a
//! [`CipError::Encoding`] failure is local to the request that triggered it.

use thiserror::Error;

/// Unified error type returned by the session core.
#[derive(Debug, Error)]
pub enum CipError {
    /// TCP connect/send/recv failure, including timeouts. Always fatal to
    /// the current session; the caller must `close()` then `open()`.
    #[error("transport error: {0}")]
    Transport(String),

    /// Header status non-zero, length mismatch, context mismatch,
    /// truncated reply, or unexpected service code. Fatal to the current
    /// CIP connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid symbolic path, out-of-range array index, or unsupported
    /// data type. Local to the request; does not affect session state.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The operation needs a session stage the `Session` has not yet
    /// reached, carrying a `(group, message)` pair mirroring `last_status`.
    #[error("comm error ({0}): {1}")]
    Comm(u8, String),
}

impl CipError {
    pub fn transport(msg: impl Into<String>) -> Self {
        CipError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        CipError::Protocol(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        CipError::Encoding(msg.into())
    }

    pub fn comm(group: u8, msg: impl Into<String>) -> Self {
        CipError::Comm(group, msg.into())
    }
}

impl From<std::io::Error> for CipError {
    fn from(e: std::io::Error) -> Self {
        CipError::Transport(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type CipResult<T> = Result<T, CipError>;
