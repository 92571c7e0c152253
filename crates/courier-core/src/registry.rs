//! Process-wide map from user ID to live connection.
//!
//! Map mutations and the online counter move together under one write lock,
//! so a connect storm can never lose or double-count an increment. The
//! counter is also kept in an atomic so [`SessionRegistry::current_count`]
//! never has to touch the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::errors::{RelayError, Result};
use crate::metrics::{DELIVERY_FAILURES_TOTAL, ONLINE_USERS, RECONNECTS_TOTAL};
use crate::session::ConnectionHandle;

/// Outcome of [`SessionRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    /// An entry for the same user was superseded.
    pub replaced: bool,
    /// Online count after the call.
    pub online: usize,
}

/// Outcome of [`SessionRegistry::unregister`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Removal {
    /// An entry was removed by this call.
    pub removed: bool,
    /// Online count after the call.
    pub online: usize,
}

/// Live connections indexed by user ID.
#[derive(Default)]
pub struct SessionRegistry {
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
    online: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handle` under its user ID, superseding any existing entry.
    ///
    /// Only an absent → present transition bumps the online count.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Registration {
        let mut conns = self.connections.write();
        let user_id = handle.user_id().to_owned();
        let replaced = conns.insert(user_id, handle).is_some();
        let online = if replaced {
            counter!(RECONNECTS_TOTAL).increment(1);
            self.online.load(Ordering::SeqCst)
        } else {
            self.online.fetch_add(1, Ordering::SeqCst) + 1
        };
        drop(conns);
        record_online(online);
        Registration { replaced, online }
    }

    /// Remove whatever is registered under `user_id`.
    pub fn unregister(&self, user_id: &str) -> Removal {
        let mut conns = self.connections.write();
        let removed = conns.remove(user_id).is_some();
        self.finish_removal(removed, conns)
    }

    /// Remove the entry for `user_id` only if it is still `connection_id`.
    ///
    /// A connection that was superseded by a reconnect leaves the newer
    /// entry and the online count alone.
    pub fn unregister_connection(&self, user_id: &str, connection_id: &str) -> Removal {
        let mut conns = self.connections.write();
        let owned = conns
            .get(user_id)
            .is_some_and(|h| h.connection_id() == connection_id);
        let removed = owned && conns.remove(user_id).is_some();
        self.finish_removal(removed, conns)
    }

    fn finish_removal(
        &self,
        removed: bool,
        conns: parking_lot::RwLockWriteGuard<'_, HashMap<String, Arc<ConnectionHandle>>>,
    ) -> Removal {
        let online = if removed {
            self.online.fetch_sub(1, Ordering::SeqCst) - 1
        } else {
            self.online.load(Ordering::SeqCst)
        };
        drop(conns);
        if removed {
            record_online(online);
        }
        Removal { removed, online }
    }

    /// Current handle for `user_id`.
    pub fn lookup(&self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().get(user_id).cloned()
    }

    /// Number of distinct users online.
    pub fn current_count(&self) -> usize {
        self.online.load(Ordering::SeqCst)
    }

    /// Sorted snapshot of the registered user IDs.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.connections.read().keys().cloned().collect();
        users.sort_unstable();
        users
    }

    /// Server-initiated push to a single user.
    ///
    /// Returns `Ok(false)` when the user is not online here; that case is
    /// logged, not treated as an error.
    pub fn send_to(&self, user_id: &str, message: &str) -> Result<bool> {
        let target = if user_id.trim().is_empty() {
            None
        } else {
            self.lookup(user_id)
        };
        let Some(target) = target else {
            warn!(user_id, "target not online");
            return Ok(false);
        };
        debug!(user_id, len = message.len(), "pushing message");
        target.send_message(message).map_err(|source| {
            counter!(DELIVERY_FAILURES_TOTAL, "path" => "push").increment(1);
            warn!(user_id, error = %source, "failed to push message");
            RelayError::DeliveryFailure {
                user_id: user_id.to_owned(),
                source,
            }
        })?;
        Ok(true)
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_online(online: usize) {
    gauge!(ONLINE_USERS).set(online as f64);
}
