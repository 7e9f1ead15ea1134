//! Live channels for WebSocket connections accepted by this process

use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::transport::{DeliveryError, DeliveryTransport};

/// Default per-connection outbound buffer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maps connection ids to the outbound channel of their socket task.
///
/// A missing or closed channel means the socket is gone. A full channel
/// blocks the delivery until it drains or the broadcaster's timeout fires.
pub struct WebSocketHub {
    channels: DashMap<String, mpsc::Sender<Message>>,
    capacity: usize,
}

impl WebSocketHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open the outbound channel for a connection.
    ///
    /// The socket task drains the returned receiver into the socket sink.
    pub fn attach(&self, connection_id: &str) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.channels.insert(connection_id.to_string(), tx);
        rx
    }

    pub fn detach(&self, connection_id: &str) {
        self.channels.remove(connection_id);
    }

    /// Drop a dead channel unless the id was re-attached in the meantime
    fn evict(&self, connection_id: &str, stale: &mpsc::Sender<Message>) -> bool {
        self.channels
            .remove_if(connection_id, |_, current| current.same_channel(stale))
            .is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    /// Send a Close frame to every connection, then drop all channels
    pub async fn close_all(&self) {
        let senders: Vec<mpsc::Sender<Message>> =
            self.channels.iter().map(|e| e.value().clone()).collect();
        let count = senders.len();

        for sender in senders {
            let _ = sender.send(Message::Close(None)).await;
        }
        self.channels.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WebSocketHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl DeliveryTransport for WebSocketHub {
    async fn deliver(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        // Clone the sender out so no map guard is held across the await
        let sender = self
            .channels
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .ok_or(DeliveryError::Gone)?;

        if sender.send(Message::Text(payload.to_string())).await.is_err() {
            self.evict(connection_id, &sender);
            return Err(DeliveryError::Gone);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_deliver_to_attached() {
        let hub = WebSocketHub::default();
        let mut rx = hub.attach("conn-a");

        hub.deliver("conn-a", "{\"action\":\"x\"}").await.unwrap();

        match rx.recv().await {
            Some(Message::Text(text)) => assert_eq!(text, "{\"action\":\"x\"}"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_connection_is_gone() {
        let hub = WebSocketHub::default();
        assert_eq!(hub.deliver("nobody", "{}").await, Err(DeliveryError::Gone));
    }

    #[tokio::test]
    async fn test_closed_receiver_is_gone() {
        let hub = WebSocketHub::default();
        let rx = hub.attach("conn-a");
        drop(rx);

        assert_eq!(hub.deliver("conn-a", "{}").await, Err(DeliveryError::Gone));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_reattached_channel_survives_stale_eviction() {
        let hub = WebSocketHub::default();
        let old_rx = hub.attach("conn-a");
        let stale = hub.channels.get("conn-a").map(|e| e.value().clone()).unwrap();
        drop(old_rx);

        // Same id attached again before the failed delivery cleans up
        let mut new_rx = hub.attach("conn-a");
        assert!(!hub.evict("conn-a", &stale));
        assert_eq!(hub.connection_count(), 1);

        hub.deliver("conn-a", "fresh").await.unwrap();
        assert!(matches!(new_rx.recv().await, Some(Message::Text(text)) if text == "fresh"));

        let current = hub.channels.get("conn-a").map(|e| e.value().clone()).unwrap();
        assert!(hub.evict("conn-a", &current));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_full_channel_blocks() {
        let hub = WebSocketHub::new(1);
        let _rx = hub.attach("conn-a");

        hub.deliver("conn-a", "first").await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), hub.deliver("conn-a", "second")).await;
        assert!(second.is_err());
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let hub = WebSocketHub::default();
        let mut rx = hub.attach("conn-a");

        hub.close_all().await;

        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
        assert_eq!(hub.connection_count(), 0);
    }
}
