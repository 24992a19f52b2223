//! Hot reload notifications.
//!
//! The server remembers the content hash of the last bundle it served for each
//! entry. When a later request produces different content, an
//! [`HotEvent::Update`] is broadcast to every `/__hot__` subscriber.

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, broadcast, watch};

/// Subscribers that fall this far behind miss events rather than block senders.
const CHANNEL_CAPACITY: usize = 64;

/// An event pushed to hot reload clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HotEvent {
    /// An entry's bundle content changed since it was last served.
    Update { entry: String, hash: String },
}

/// Broadcast hub for hot reload clients.
pub struct HotChannel {
    sender: broadcast::Sender<HotEvent>,
    last_hashes: Mutex<HashMap<String, String>>,
    closed: watch::Sender<bool>,
}

impl HotChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (closed, _) = watch::channel(false);
        Self {
            sender,
            last_hashes: Mutex::new(HashMap::new()),
            closed,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HotEvent> {
        self.sender.subscribe()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static + use<> {
        let mut rx = self.closed.subscribe();
        async move {
            // Err means the channel itself is gone, which is closed too
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    /// End every open event stream so the server can shut down.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Record a served bundle. Broadcasts and returns an update when the
    /// content differs from the previously served bundle for `entry`.
    pub async fn record(&self, entry: &str, content: &[u8]) -> Option<HotEvent> {
        let hash = content_hash(content);

        let previous = {
            let mut hashes = self.last_hashes.lock().await;
            hashes.insert(entry.to_string(), hash.clone())
        };

        match previous {
            Some(previous) if previous != hash => {
                let event = HotEvent::Update {
                    entry: entry.to_string(),
                    hash,
                };
                // No subscribers is not an error
                let receivers = self.sender.send(event.clone()).unwrap_or(0);
                tracing::debug!(entry, receivers, "hot update broadcast");
                Some(event)
            }
            _ => None,
        }
    }
}

impl Default for HotChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex SHA-256 of bundle content.
pub(crate) fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
