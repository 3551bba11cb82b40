//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Authentication state of a single connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No successful sign-in yet.
    Unauthenticated,
    /// Signed in as the given identity.
    Authenticated(String),
}

/// Represents a connected WebSocket client.
///
/// Wraps the outbound half of the transport (a queue drained by the
/// session's write task) and carries the identity this connection has
/// signed in as.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Bound identity (set after a successful sign-in).
    identity: Mutex<Option<String>>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Cancelled when the server asks the transport to close.
    close: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of messages dropped due to full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            identity: Mutex::new(None),
            tx,
            close: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Bind this connection to an identity. Rebinding replaces the previous
    /// identity.
    pub fn bind_identity(&self, identity: String) {
        *self.identity.lock() = Some(identity);
    }

    /// Get the currently bound identity.
    pub fn identity(&self) -> Option<String> {
        self.identity.lock().clone()
    }

    /// Current authentication state.
    pub fn state(&self) -> SessionState {
        match self.identity() {
            Some(identity) => SessionState::Authenticated(identity),
            None => SessionState::Unauthenticated,
        }
    }

    /// Send a text message to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Send an owned string.
    pub fn send_text(&self, message: impl Into<String>) -> bool {
        self.send(Arc::new(message.into()))
    }

    /// Serialize a value as JSON and send it to the client.
    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                tracing::error!(
                    conn_id = %self.id,
                    error = %e,
                    "failed to serialize outbound message"
                );
                false
            }
        }
    }

    /// Ask the transport to close this connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether [`close`](Self::close) has been requested.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Token the session loop watches for close requests.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
