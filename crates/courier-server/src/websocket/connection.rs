//! Channel-backed send side of a `WebSocket` connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use courier_core::{TransportError, TransportSession};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Outbound queue for one socket plus its heartbeat bookkeeping.
///
/// `send_text` never blocks: frames go into a bounded channel drained by the
/// connection's writer task. A full or closed channel is reported as a
/// [`TransportError`] so the caller sees the failure.
#[derive(Debug)]
pub struct ChannelSession {
    tx: mpsc::Sender<String>,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ChannelSession {
    /// Wrap the sending half of the writer's channel.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Record inbound activity (Pong or any frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if there was activity since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last recorded activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Frames refused because the channel was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

impl TransportSession for ChannelSession {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.tx.try_send(text.to_owned()).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => TransportError::Full,
                TrySendError::Closed(_) => TransportError::Closed,
            }
        })
    }
}
