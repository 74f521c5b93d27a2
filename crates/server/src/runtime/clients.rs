//! Window clients connected over server-sent events.
//!
//! A page opens `GET /__tether/events?url=<page>` and keeps the stream open. The
//! registry hands each connection an id and a channel; navigation commands are
//! pushed down that channel. Closed streams are pruned lazily.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tether_core::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{Clients, WindowClient};

/// Pending commands per client before sends start failing.
const CHANNEL_CAPACITY: usize = 8;

/// A command delivered to one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Sent once when the stream opens.
    Connected { id: u64 },
    /// Load `url` now.
    Navigate { url: String },
}

struct Connection {
    url: String,
    controlled: bool,
    tx: mpsc::Sender<ClientEvent>,
}

#[derive(Default)]
pub struct ClientRegistry {
    connections: Mutex<HashMap<u64, Connection>>,
    next_id: AtomicU64,
    /// Set once the active worker has claimed; later connections start controlled.
    claimed: AtomicBool,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window showing `url` and return its event stream.
    pub fn connect(&self, url: impl Into<String>) -> (u64, ReceiverStream<ClientEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        // Fresh channel with spare capacity, cannot fail.
        let _ = tx.try_send(ClientEvent::Connected { id });

        let connection = Connection { url: url.into(), controlled: self.claimed.load(Ordering::SeqCst), tx };
        self.lock().insert(id, connection);
        tracing::debug!(client = id, "window connected");

        (id, ReceiverStream::new(rx))
    }

    /// Number of live connections.
    pub fn connected(&self) -> usize {
        let mut connections = self.lock();
        connections.retain(|_, c| !c.tx.is_closed());
        connections.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Connection>> {
        self.connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Clients for ClientRegistry {
    async fn claim(&self) -> usize {
        self.claimed.store(true, Ordering::SeqCst);
        let mut connections = self.lock();
        connections.retain(|_, c| !c.tx.is_closed());

        let mut claimed = 0;
        for connection in connections.values_mut().filter(|c| !c.controlled) {
            connection.controlled = true;
            claimed += 1;
        }
        claimed
    }

    async fn windows(&self, include_uncontrolled: bool) -> Vec<WindowClient> {
        let mut connections = self.lock();
        connections.retain(|_, c| !c.tx.is_closed());

        let mut windows: Vec<WindowClient> = connections
            .iter()
            .filter(|(_, c)| include_uncontrolled || c.controlled)
            .map(|(id, c)| WindowClient { id: *id, url: c.url.clone(), controlled: c.controlled })
            .collect();
        windows.sort_by_key(|w| w.id);
        windows
    }

    async fn navigate(&self, id: u64, url: &str) -> Result<(), Error> {
        let tx = self
            .lock()
            .get(&id)
            .map(|c| c.tx.clone())
            .ok_or_else(|| Error::Client(format!("client {id} is not connected")))?;

        if tx.send(ClientEvent::Navigate { url: url.to_string() }).await.is_err() {
            self.lock().remove(&id);
            return Err(Error::Client(format!("client {id} went away")));
        }

        if let Some(connection) = self.lock().get_mut(&id) {
            connection.url = url.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_connect_sends_id() {
        let registry = ClientRegistry::new();
        let (id, mut events) = registry.connect("/blog/");
        assert_eq!(events.next().await, Some(ClientEvent::Connected { id }));
        assert_eq!(registry.connected(), 1);
    }

    #[tokio::test]
    async fn test_windows_before_claim_are_uncontrolled() {
        let registry = ClientRegistry::new();
        let (_id, _events) = registry.connect("/blog/");

        assert!(registry.windows(false).await.is_empty());
        let all = registry.windows(true).await;
        assert_eq!(all.len(), 1);
        assert!(!all[0].controlled);
    }

    #[tokio::test]
    async fn test_claim_controls_existing_and_later_windows() {
        let registry = ClientRegistry::new();
        let (_a, _ea) = registry.connect("/a/");
        let (_b, _eb) = registry.connect("/b/");

        assert_eq!(registry.claim().await, 2);
        assert_eq!(registry.claim().await, 0);

        let (_c, _ec) = registry.connect("/c/");
        assert_eq!(registry.windows(false).await.len(), 3);
    }

    #[tokio::test]
    async fn test_navigate_delivers_event() {
        let registry = ClientRegistry::new();
        let (id, mut events) = registry.connect("/blog/");
        events.next().await;

        registry.navigate(id, "/blog/").await.unwrap();
        assert_eq!(events.next().await, Some(ClientEvent::Navigate { url: "/blog/".into() }));
    }

    #[tokio::test]
    async fn test_closed_streams_are_pruned() {
        let registry = ClientRegistry::new();
        let (id, events) = registry.connect("/blog/");
        drop(events);

        assert!(registry.windows(true).await.is_empty());
        assert!(registry.navigate(id, "/blog/").await.is_err());
        assert_eq!(registry.connected(), 0);
    }
}
