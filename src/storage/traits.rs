//! Abstract interfaces for the distributed and durable backends
//!
//! Every external collaborator of the pipeline sits behind one of these
//! traits: an in-memory implementation backs single-node deployments and
//! tests, a shared-store implementation backs a clustered deployment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::core::message::ChatMessage;
use crate::core::session::Session;
use crate::error::Result;

/// Distributed session store, keyed by user id with a fixed TTL.
///
/// Per-key atomicity of the backing store is relied upon; no cross-key
/// transactions are needed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert a session and reset its TTL.
    async fn save(&self, session: Session) -> Result<Session>;

    /// Look up the session for a user. `Ok(None)` means no live session.
    async fn find(&self, user_id: &str) -> Result<Option<Session>>;

    /// Delete one session of a user.
    async fn delete(&self, user_id: &str, session_id: &str) -> Result<()>;

    /// Delete every session of a user (cluster-wide sign-out).
    async fn delete_all(&self, user_id: &str) -> Result<()>;
}

/// Distributed counter store backing the fixed-window rate limiter.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increment the counter for `key`, creating it with expiry
    /// `window` if absent. Returns the post-increment count and the
    /// remaining window TTL.
    async fn increment(&self, key: &str, window: Duration) -> Result<(u64, Duration)>;
}

/// A file record referenced by file messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: u64,
}

/// Durable message store. Internals are opaque to the pipeline: it only
/// appends messages and resolves file references.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning its id. Failures surface to the sender;
    /// there is no automatic retry.
    async fn save(&self, message: ChatMessage) -> Result<ChatMessage>;

    /// Resolve a file reference for a file message.
    async fn find_file_by_id(&self, file_id: &str) -> Result<Option<StoredFile>>;

    /// Messages in a room since `since` (used by surrounding reporting).
    async fn count_recent(&self, room_id: &str, since: DateTime<Utc>) -> Result<u64>;
}

/// Cross-node pub/sub relay carrying room broadcasts between nodes.
///
/// Delivery order is only guaranteed to match publish order within a
/// single node's single channel.
#[async_trait]
pub trait PubSubRelay: Send + Sync {
    /// Publish a payload to a channel. Publishing to a channel nobody
    /// subscribes to is not an error.
    async fn publish(&self, channel: &str, payload: String) -> Result<()>;

    /// Subscribe to a channel, receiving payloads published after this call.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>>;
}

pub type SharedSessionStore = std::sync::Arc<dyn SessionStore>;
pub type SharedRateLimitStore = std::sync::Arc<dyn RateLimitStore>;
pub type SharedMessageStore = std::sync::Arc<dyn MessageStore>;
pub type SharedRelay = std::sync::Arc<dyn PubSubRelay>;
