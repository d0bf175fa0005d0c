//! Cluster broadcast fabric
//!
//! Delivers room events to every subscribed connection across all nodes.
//! Each node keeps a local registry of room subscribers and republishes
//! local sends to a shared pub/sub relay; a per-room listener task feeds
//! other nodes' publications back into the local registry. Payloads carry
//! the publishing node's id so a node skips its own relay echoes.
//!
//! Ordering: delivery order matches publish order only within a single
//! node's single room channel. No cross-room or cross-node total order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::constants::ROOM_CHANNEL_PREFIX;
use crate::core::events::ServerEvent;
use crate::error::{ChatPipeError, Result};
use crate::storage::traits::PubSubRelay;

/// Per-connection outbound channel; the transport layer pumps these
/// payloads onto the socket.
pub type ConnectionSender = mpsc::UnboundedSender<String>;

#[derive(Serialize, Deserialize)]
struct RelayEnvelope {
    node_id: String,
    payload: String,
}

pub struct BroadcastFabric {
    node_id: String,
    relay: Arc<dyn PubSubRelay>,
    /// room id -> (connection id -> outbound sender)
    rooms: RwLock<HashMap<String, HashMap<String, ConnectionSender>>>,
    /// room id -> relay listener task feeding remote publications
    relay_listeners: RwLock<HashMap<String, JoinHandle<()>>>,
}

impl BroadcastFabric {
    pub fn new(node_id: String, relay: Arc<dyn PubSubRelay>) -> Self {
        Self {
            node_id,
            relay,
            rooms: RwLock::new(HashMap::new()),
            relay_listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn channel_name(room_id: &str) -> String {
        format!("{}{}", ROOM_CHANNEL_PREFIX, room_id)
    }

    /// Register a local connection as a subscriber of a room. The first
    /// local subscriber of a room also attaches this node to the room's
    /// relay channel.
    pub async fn subscribe(
        self: &Arc<Self>,
        room_id: &str,
        connection_id: &str,
        sender: ConnectionSender,
    ) -> Result<()> {
        {
            let mut rooms = self.rooms.write().await;
            rooms
                .entry(room_id.to_string())
                .or_insert_with(HashMap::new)
                .insert(connection_id.to_string(), sender);
        }

        let mut listeners = self.relay_listeners.write().await;
        if !listeners.contains_key(room_id) {
            // Attach to the relay before the listener loop starts so a
            // publication racing this subscribe is not silently missed.
            let receiver = self.relay.subscribe(&Self::channel_name(room_id)).await?;
            let fabric = Arc::clone(self);
            let room = room_id.to_string();
            listeners.insert(
                room_id.to_string(),
                tokio::spawn(async move {
                    fabric.run_relay_listener(room, receiver).await;
                }),
            );
        }

        Ok(())
    }

    async fn run_relay_listener(
        &self,
        room_id: String,
        mut receiver: tokio::sync::broadcast::Receiver<String>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(raw) => {
                    let envelope: RelayEnvelope = match serde_json::from_str(&raw) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            log::warn!("dropping malformed relay payload for {}: {}", room_id, e);
                            continue;
                        }
                    };

                    // Local sends were already delivered locally at publish.
                    if envelope.node_id == self.node_id {
                        continue;
                    }

                    let delivered = self.deliver_local(&room_id, &envelope.payload).await;
                    log::trace!(
                        "relayed event into room {} reached {} local connections",
                        room_id,
                        delivered
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "relay listener for room {} lagged, skipped {} payloads",
                        room_id,
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Drop one connection's subscription to one room.
    pub async fn unsubscribe(&self, room_id: &str, connection_id: &str) {
        let emptied = {
            let mut rooms = self.rooms.write().await;
            let emptied = match rooms.get_mut(room_id) {
                Some(subscribers) => {
                    subscribers.remove(connection_id);
                    subscribers.is_empty()
                }
                None => false,
            };
            if emptied {
                rooms.remove(room_id);
            }
            emptied
        };

        if emptied {
            self.detach_listener(room_id).await;
        }
    }

    /// Drop every subscription of a connection (disconnect path).
    pub async fn unsubscribe_all(&self, connection_id: &str) {
        let emptied: Vec<String> = {
            let mut rooms = self.rooms.write().await;
            let mut emptied = Vec::new();
            rooms.retain(|room_id, subscribers| {
                subscribers.remove(connection_id);
                if subscribers.is_empty() {
                    emptied.push(room_id.clone());
                    false
                } else {
                    true
                }
            });
            emptied
        };

        for room_id in emptied {
            self.detach_listener(&room_id).await;
        }
    }

    async fn detach_listener(&self, room_id: &str) {
        if let Some(listener) = self.relay_listeners.write().await.remove(room_id) {
            listener.abort();
        }
    }

    /// Broadcast an event to a room: deliver to local subscribers, then
    /// republish through the relay for the other nodes. Returns the number
    /// of local connections reached.
    pub async fn publish(&self, room_id: &str, event: &ServerEvent) -> Result<usize> {
        let payload = serde_json::to_string(event)?;

        let delivered = self.deliver_local(room_id, &payload).await;

        let envelope = serde_json::to_string(&RelayEnvelope {
            node_id: self.node_id.clone(),
            payload,
        })?;
        self.relay
            .publish(&Self::channel_name(room_id), envelope)
            .await
            .map_err(|e| ChatPipeError::BroadcastError(e.to_string()))?;

        Ok(delivered)
    }

    /// Send a payload to every local subscriber of a room, pruning
    /// connections whose receiving side is gone.
    async fn deliver_local(&self, room_id: &str, payload: &str) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;

        {
            let rooms = self.rooms.read().await;
            if let Some(subscribers) = rooms.get(room_id) {
                for (connection_id, sender) in subscribers {
                    if sender.send(payload.to_string()).is_ok() {
                        delivered += 1;
                    } else {
                        dead.push(connection_id.clone());
                    }
                }
            }
        }

        for connection_id in dead {
            log::debug!(
                "pruning closed connection {} from room {}",
                connection_id,
                room_id
            );
            self.unsubscribe(room_id, &connection_id).await;
        }

        delivered
    }

    /// Number of local subscribers of a room.
    pub async fn local_subscriber_count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::codes;
    use crate::storage::memory::MemoryRelay;
    use std::time::Duration;

    fn fabric(node: &str, relay: Arc<dyn PubSubRelay>) -> Arc<BroadcastFabric> {
        Arc::new(BroadcastFabric::new(node.to_string(), relay))
    }

    #[tokio::test]
    async fn test_local_delivery_and_count() {
        let relay: Arc<dyn PubSubRelay> = Arc::new(MemoryRelay::new());
        let fabric = fabric("node-a", relay);

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        fabric.subscribe("general", "c1", tx1).await.unwrap();
        fabric.subscribe("general", "c2", tx2).await.unwrap();

        let event = ServerEvent::error(codes::MESSAGE_ERROR, "x");
        let delivered = fabric.publish("general", &event).await.unwrap();
        assert_eq!(delivered, 2);
        assert!(rx1.recv().await.unwrap().contains("MESSAGE_ERROR"));
        assert!(rx2.recv().await.unwrap().contains("MESSAGE_ERROR"));
    }

    #[tokio::test]
    async fn test_cross_node_delivery_skips_own_echo() {
        let relay: Arc<dyn PubSubRelay> = Arc::new(MemoryRelay::new());
        let node_a = fabric("node-a", relay.clone());
        let node_b = fabric("node-b", relay);

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        node_a.subscribe("general", "a1", tx_a).await.unwrap();
        node_b.subscribe("general", "b1", tx_b).await.unwrap();

        let event = ServerEvent::Joined {
            room: "general".to_string(),
        };
        node_a.publish("general", &event).await.unwrap();

        // The remote node receives the relayed payload.
        let remote = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(remote.contains("joined"));

        // The publishing node got exactly its direct local delivery, no echo.
        assert!(rx_a.recv().await.is_some());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let relay: Arc<dyn PubSubRelay> = Arc::new(MemoryRelay::new());
        let fabric = fabric("node-a", relay);

        let (tx, mut rx) = mpsc::unbounded_channel();
        fabric.subscribe("general", "c1", tx).await.unwrap();
        fabric.unsubscribe("general", "c1").await;

        let event = ServerEvent::error(codes::MESSAGE_ERROR, "x");
        let delivered = fabric.publish("general", &event).await.unwrap();
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(fabric.local_subscriber_count("general").await, 0);
    }
}
