//! Per-connection event handling and message routing.
//!
//! The transport adapter owns one [`SessionHandler`] per socket and feeds it
//! events in order through [`ConnectionEvents`]. Events for one connection
//! are therefore processed sequentially; different connections only meet in
//! the shared [`SessionRegistry`].

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::envelope::Envelope;
use crate::errors::{RelayError, Result, TransportError};
use crate::metrics::{
    CONNECTIONS_TOTAL, DELIVERY_FAILURES_TOTAL, DISCONNECTIONS_TOTAL, MESSAGES_MALFORMED_TOTAL,
    MESSAGES_RELAYED_TOTAL, MESSAGES_UNDELIVERABLE_TOTAL, TRANSPORT_FAULTS_TOTAL,
};
use crate::registry::SessionRegistry;
use crate::session::{ConnectionHandle, TransportSession};

/// Events a transport delivers for one connection.
pub trait ConnectionEvents {
    /// The upgrade completed and the session can send.
    fn on_open(&mut self);
    /// A decoded text frame arrived.
    fn on_message(&mut self, payload: &str);
    /// The session ended, normally or not.
    fn on_close(&mut self);
    /// The transport hit a fault. A close event is expected to follow.
    fn on_error(&mut self, fault: &TransportError);
}

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, open event not yet seen.
    Connecting,
    /// Registered and relaying.
    Open,
    /// Terminal.
    Closed,
}

/// Routing logic for one client connection.
pub struct SessionHandler {
    handle: Arc<ConnectionHandle>,
    registry: Arc<SessionRegistry>,
    state: ConnectionState,
}

impl SessionHandler {
    /// Create a handler in the [`ConnectionState::Connecting`] state.
    pub fn new(
        user_id: impl Into<String>,
        session: Arc<dyn TransportSession>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            handle: Arc::new(ConnectionHandle::new(user_id, session)),
            registry,
            state: ConnectionState::Connecting,
        }
    }

    /// This connection's user ID.
    pub fn user_id(&self) -> &str {
        self.handle.user_id()
    }

    /// The handle this handler registers.
    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Route one non-blank payload to its recipient.
    ///
    /// Returns the recipient's user ID once the frame has been handed to its
    /// send primitive.
    pub fn relay(&self, payload: &str) -> Result<String> {
        let mut envelope = Envelope::parse(payload)?;
        envelope.stamp_sender(self.user_id());

        let Some(to_user_id) = envelope.recipient() else {
            return Err(RelayError::UnknownRecipient {
                to_user_id: String::new(),
            });
        };
        let Some(target) = self.registry.lookup(&to_user_id) else {
            return Err(RelayError::UnknownRecipient { to_user_id });
        };

        let frame = envelope.to_json()?;
        target
            .send_message(&frame)
            .map_err(|source| RelayError::DeliveryFailure {
                user_id: to_user_id.clone(),
                source,
            })?;
        Ok(to_user_id)
    }

    fn send_confirmation(&self) {
        let confirmation = serde_json::json!({
            "type": "connection.established",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "data": {
                "userId": self.user_id(),
            },
        });
        if let Err(e) = self.handle.send_message(&confirmation.to_string()) {
            counter!(DELIVERY_FAILURES_TOTAL, "path" => "confirmation").increment(1);
            warn!(user_id = self.user_id(), error = %e, "failed to send connection confirmation");
        }
    }
}

impl ConnectionEvents for SessionHandler {
    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            warn!(user_id = self.user_id(), state = ?self.state, "open event ignored");
            return;
        }
        self.state = ConnectionState::Open;
        counter!(CONNECTIONS_TOTAL).increment(1);

        let registration = self.registry.register(self.handle.clone());
        if registration.replaced {
            info!(
                user_id = self.user_id(),
                connection_id = self.handle.connection_id(),
                online = registration.online,
                "user reconnected, previous connection superseded"
            );
        } else {
            info!(
                user_id = self.user_id(),
                connection_id = self.handle.connection_id(),
                online = registration.online,
                "user connected"
            );
        }
        self.send_confirmation();
    }

    fn on_message(&mut self, payload: &str) {
        if payload.trim().is_empty() {
            return;
        }
        if self.state != ConnectionState::Open {
            debug!(user_id = self.user_id(), state = ?self.state, "message on inactive connection dropped");
            return;
        }
        debug!(user_id = self.user_id(), len = payload.len(), "message received");

        match self.relay(payload) {
            Ok(to_user_id) => {
                counter!(MESSAGES_RELAYED_TOTAL).increment(1);
                debug!(user_id = self.user_id(), to_user_id = to_user_id.as_str(), "message relayed");
            }
            Err(RelayError::UnknownRecipient { to_user_id }) => {
                counter!(MESSAGES_UNDELIVERABLE_TOTAL).increment(1);
                warn!(
                    user_id = self.user_id(),
                    to_user_id = to_user_id.as_str(),
                    "recipient not connected to this server"
                );
            }
            Err(e @ RelayError::MalformedPayload(_)) => {
                counter!(MESSAGES_MALFORMED_TOTAL).increment(1);
                warn!(user_id = self.user_id(), error = %e, "discarding malformed message");
            }
            Err(e) => {
                counter!(DELIVERY_FAILURES_TOTAL, "path" => "relay").increment(1);
                warn!(user_id = self.user_id(), error = %e, kind = e.kind(), "failed to relay message");
            }
        }
    }

    fn on_close(&mut self) {
        if self.state == ConnectionState::Closed {
            debug!(user_id = self.user_id(), "close event for already closed connection");
            return;
        }
        let was_open = self.state == ConnectionState::Open;
        self.state = ConnectionState::Closed;
        if !was_open {
            debug!(user_id = self.user_id(), "connection closed before opening");
            return;
        }
        counter!(DISCONNECTIONS_TOTAL).increment(1);

        let removal = self
            .registry
            .unregister_connection(self.user_id(), self.handle.connection_id());
        if removal.removed {
            info!(
                user_id = self.user_id(),
                connection_id = self.handle.connection_id(),
                online = removal.online,
                duration_secs = self.handle.age().as_secs(),
                "user disconnected"
            );
        } else {
            info!(
                user_id = self.user_id(),
                connection_id = self.handle.connection_id(),
                online = removal.online,
                "superseded connection closed"
            );
        }
    }

    fn on_error(&mut self, fault: &TransportError) {
        counter!(TRANSPORT_FAULTS_TOTAL).increment(1);
        let err = RelayError::TransportFault(fault.clone());
        warn!(user_id = self.user_id(), error = %err, "transport error");
    }
}
