//! In-memory storage implementations for single-node use and testing
//!
//! These keep the same contracts as the distributed backends: per-key
//! atomicity, TTL expiry, and channel fan-out, all inside one process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::traits::{MessageStore, PubSubRelay, RateLimitStore, SessionStore, StoredFile};
use crate::core::message::ChatMessage;
use crate::core::session::Session;
use crate::error::{ChatPipeError, Result};

/// In-memory session store with lazy TTL expiry.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session: Session) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.user_id.clone(), session.clone());
        Ok(session)
    }

    async fn find(&self, user_id: &str) -> Result<Option<Session>> {
        // Expired entries are evicted on read, mirroring key expiry in a
        // TTL-backed store.
        let mut sessions = self.sessions.write().await;
        let expired = sessions
            .get(user_id)
            .map(|session| session.is_expired(self.ttl))
            .unwrap_or(false);
        if expired {
            sessions.remove(user_id);
            return Ok(None);
        }
        Ok(sessions.get(user_id).cloned())
    }

    async fn delete(&self, user_id: &str, _session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(user_id);
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        self.sessions.write().await.remove(user_id);
        Ok(())
    }
}

struct WindowCounter {
    count: u64,
    expires_at: Instant,
}

/// In-memory fixed-window counter store.
pub struct MemoryRateLimitStore {
    counters: RwLock<HashMap<String, WindowCounter>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<(u64, Duration)> {
        let now = Instant::now();
        let mut counters = self.counters.write().await;

        let counter = counters
            .entry(key.to_string())
            .and_modify(|c| {
                if c.expires_at <= now {
                    // Window elapsed: this increment opens a fresh window.
                    c.count = 0;
                    c.expires_at = now + window;
                }
            })
            .or_insert_with(|| WindowCounter {
                count: 0,
                expires_at: now + window,
            });

        counter.count += 1;
        let remaining = counter.expires_at.saturating_duration_since(now);
        Ok((counter.count, remaining))
    }
}

/// In-memory durable message store.
pub struct MemoryMessageStore {
    messages: RwLock<HashMap<String, ChatMessage>>,
    room_index: RwLock<HashMap<String, Vec<String>>>,
    files: RwLock<HashMap<String, StoredFile>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            room_index: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a file record, standing in for the upload flow.
    pub async fn insert_file(&self, file: StoredFile) {
        self.files.write().await.insert(file.id.clone(), file);
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn get(&self, id: &str) -> Option<ChatMessage> {
        self.messages.read().await.get(id).cloned()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save(&self, mut message: ChatMessage) -> Result<ChatMessage> {
        if message.id.is_some() {
            return Err(ChatPipeError::StorageError(
                "message already persisted".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        message.id = Some(id.clone());

        self.messages.write().await.insert(id.clone(), message.clone());
        self.room_index
            .write()
            .await
            .entry(message.room_id.clone())
            .or_insert_with(Vec::new)
            .push(id);

        Ok(message)
    }

    async fn find_file_by_id(&self, file_id: &str) -> Result<Option<StoredFile>> {
        Ok(self.files.read().await.get(file_id).cloned())
    }

    async fn count_recent(&self, room_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let room_index = self.room_index.read().await;
        let messages = self.messages.read().await;

        let count = room_index
            .get(room_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| messages.get(id))
                    .filter(|m| m.timestamp >= since)
                    .count()
            })
            .unwrap_or(0);

        Ok(count as u64)
    }
}

/// Capacity of each in-memory relay channel. Receivers that fall behind
/// skip payloads (RecvError::Lagged) rather than blocking publishers.
const RELAY_CHANNEL_CAPACITY: usize = 4096;

/// In-process pub/sub relay: one broadcast channel per room channel name.
///
/// Single-node stand-in for the shared-store relay; also lets tests wire
/// several fabric instances to one relay to exercise cross-node delivery.
pub struct MemoryRelay {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(RELAY_CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubRelay for MemoryRelay {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        // send() errs when there are no subscribers; that is not a failure.
        let _ = self.sender(channel).await.send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>> {
        Ok(self.sender(channel).await.subscribe())
    }
}
