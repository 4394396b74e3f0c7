//! The broadcast channel abstraction and the in-process backend.
//!
//! The replication protocol is transport-agnostic. A backend provides named
//! broadcast scopes with this delivery contract:
//!
//! - at-most-once delivery per message
//! - FIFO order within one sender's own stream only
//! - no ordering guarantee across senders
//! - the sender's own messages are echoed back (backends are not required
//!   to self-filter; the replicator drops echoes by device id)
//!
//! [`LocalBus`] is the in-process backend over `tokio::sync::broadcast`.
//! A networked backend pumps its socket into the same [`TransportLink`]
//! channel pair.

use crate::error::{LiveError, Result};
use crate::state::SyncMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

/// Per-scope channel capacity before slow receivers start missing messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// The broadcast scope name for a live session.
pub fn session_scope(setlist_id: &str) -> String {
    format!("livesession:{}", setlist_id)
}

/// An attachment to one broadcast scope.
///
/// Every attached participant receives every message any participant sends,
/// including its own.
pub struct TransportLink {
    tx: broadcast::Sender<SyncMessage>,
    rx: broadcast::Receiver<SyncMessage>,
}

impl TransportLink {
    pub fn new(tx: broadcast::Sender<SyncMessage>, rx: broadcast::Receiver<SyncMessage>) -> Self {
        Self { tx, rx }
    }

    /// A clonable send handle onto this scope.
    pub fn sender(&self) -> broadcast::Sender<SyncMessage> {
        self.tx.clone()
    }

    /// Broadcast a message to every attached participant.
    ///
    /// Returns how many receivers the message reached; a scope with no
    /// receivers swallows the message rather than failing.
    pub fn send(&self, message: SyncMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    /// Receive the next message on this scope.
    ///
    /// Lagging behind the channel capacity drops the oldest messages and
    /// continues; `None` means the scope was torn down.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Transport receiver lagged, skipping ahead");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A named-broadcast-scope transport backend.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Attach to a scope, creating it if needed.
    async fn attach(&self, scope: &str) -> Result<TransportLink>;
}

/// In-process broadcast backend.
///
/// One `tokio::sync::broadcast` channel per scope, created lazily on first
/// attach. All participants within the process sharing this bus see each
/// other's messages.
pub struct LocalBus {
    channels: Mutex<HashMap<String, broadcast::Sender<SyncMessage>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl BroadcastTransport for LocalBus {
    async fn attach(&self, scope: &str) -> Result<TransportLink> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|e| LiveError::Transport(format!("Bus lock poisoned: {}", e)))?;

        let tx = channels
            .entry(scope.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        let rx = tx.subscribe();

        Ok(TransportLink::new(tx, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LiveState, MessageKind};

    fn message(sender: &str, sent_at: i64) -> SyncMessage {
        SyncMessage {
            kind: MessageKind::StateUpdate,
            payload: Some(LiveState::new("setlist-1")),
            sender_id: sender.to_string(),
            sent_at,
        }
    }

    #[test]
    fn test_session_scope_naming() {
        assert_eq!(session_scope("abc"), "livesession:abc");
    }

    #[tokio::test]
    async fn test_all_participants_receive_messages() {
        let bus = LocalBus::default();
        let sender = bus.attach("livesession:s1").await.unwrap();
        let mut receiver_a = bus.attach("livesession:s1").await.unwrap();
        let mut receiver_b = bus.attach("livesession:s1").await.unwrap();

        let reached = sender.send(message("device-1", 1));
        // The sender's own receiver half counts too
        assert_eq!(reached, 3);

        assert_eq!(receiver_a.recv().await.unwrap().sender_id, "device-1");
        assert_eq!(receiver_b.recv().await.unwrap().sender_id, "device-1");
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let bus = LocalBus::default();
        let sender = bus.attach("livesession:s1").await.unwrap();
        let mut other_scope = bus.attach("livesession:s2").await.unwrap();

        sender.send(message("device-1", 1));

        // Nothing arrives on the other scope
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            other_scope.recv(),
        )
        .await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_sender_fifo_order_is_preserved() {
        let bus = LocalBus::default();
        let sender = bus.attach("livesession:s1").await.unwrap();
        let mut receiver = bus.attach("livesession:s1").await.unwrap();

        for i in 0..5 {
            sender.send(message("device-1", i));
        }

        for i in 0..5 {
            assert_eq!(receiver.recv().await.unwrap().sent_at, i);
        }
    }

    #[tokio::test]
    async fn test_send_with_no_receivers_is_swallowed() {
        let bus = LocalBus::default();
        let link = bus.attach("livesession:solo").await.unwrap();
        let tx = link.sender();

        // The link held the scope's only receiver
        drop(link);

        assert!(tx.send(message("device-1", 1)).is_err());

        // A fresh attachment swallows the error through the link API
        let solo = bus.attach("livesession:solo").await.unwrap();
        assert_eq!(solo.send(message("device-1", 2)), 1);
    }
}
