//! Session lifecycle notifications.

use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// Broadcast after a borrowed connection finished its session setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCreated {
    /// Alias the connection belongs to.
    pub alias: String,
    /// Server process serving the session.
    pub backend_pid: u32,
}

/// Fan-out channel for [`ConnectionCreated`] events.
///
/// Cloning yields a handle to the same channel, so several wrappers can
/// report to one set of subscribers. Events sent while nobody listens are
/// dropped; a subscriber that falls more than the channel capacity behind
/// receives `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct Signals {
    tx: broadcast::Sender<ConnectionCreated>,
}

impl Signals {
    /// Create a channel buffering [`DEFAULT_CAPACITY`] events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a channel buffering `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionCreated> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub(crate) fn connection_created(&self, alias: &str, backend_pid: u32) {
        let event = ConnectionCreated {
            alias: alias.to_string(),
            backend_pid,
        };
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}
