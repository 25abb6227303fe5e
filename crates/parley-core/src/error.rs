//! Error types for the Parley core.
//!
//! Framework-level errors (pattern registration, dispatch) are defined in
//! `parley-framework`.

use thiserror::Error;

/// Errors that can occur while talking to a chat transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Pulling pending inbound messages failed.
    #[error("failed to receive messages from '{transport}': {reason}")]
    ReceiveFailed {
        /// Name of the transport.
        transport: String,
        /// Reason for failure.
        reason: String,
    },

    /// Delivering an outbound message failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The transport has been shut down and will produce no more messages.
    #[error("transport '{0}' is closed")]
    Closed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
