//! Relay error taxonomy.
//!
//! Every variant is scoped to a single message or a single connection. The
//! handler logs these and keeps going; none of them abort a connection task.

use thiserror::Error;

/// Failure of the transport's outbound send primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote end is gone or the writer task has stopped.
    #[error("connection closed")]
    Closed,
    /// The per-connection send buffer is full.
    #[error("send buffer full")]
    Full,
    /// Any other fault reported by the transport.
    #[error("{0}")]
    Other(String),
}

/// Errors raised while handling a connection's events.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound payload is not a JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// `toUserId` is blank or names a user with no live connection here.
    #[error("recipient '{to_user_id}' is not connected to this server")]
    UnknownRecipient {
        /// The requested recipient (empty when missing or blank).
        to_user_id: String,
    },

    /// The send primitive refused the frame.
    #[error("failed to deliver to '{user_id}': {source}")]
    DeliveryFailure {
        /// Whose connection the frame was meant for.
        user_id: String,
        /// What the transport reported.
        #[source]
        source: TransportError,
    },

    /// The transport reported a fault on this connection.
    #[error("transport fault: {0}")]
    TransportFault(#[from] TransportError),
}

impl RelayError {
    /// Short, stable name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "malformed_payload",
            Self::UnknownRecipient { .. } => "unknown_recipient",
            Self::DeliveryFailure { .. } => "delivery_failure",
            Self::TransportFault(_) => "transport_fault",
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
