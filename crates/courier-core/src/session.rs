//! Connection handles and the transport's send primitive.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::TransportError;

/// Outbound half of a transport session.
///
/// Implementations write one text frame per call. A failed send is reported
/// to the caller and never retried.
pub trait TransportSession: Send + Sync {
    /// Write a single text frame.
    fn send_text(&self, text: &str) -> Result<(), TransportError>;
}

/// One live client session, as stored in the registry.
pub struct ConnectionHandle {
    user_id: String,
    connection_id: String,
    session: Arc<dyn TransportSession>,
    connected_at: Instant,
}

impl ConnectionHandle {
    /// Create a handle with a fresh connection ID.
    pub fn new(user_id: impl Into<String>, session: Arc<dyn TransportSession>) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id: uuid::Uuid::now_v7().to_string(),
            session,
            connected_at: Instant::now(),
        }
    }

    /// Client-supplied user identifier.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Server-assigned identifier, unique per handle instance.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Time since the handle was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Push a text frame to this client.
    pub fn send_message(&self, text: &str) -> Result<(), TransportError> {
        self.session.send_text(text)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("user_id", &self.user_id)
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}
