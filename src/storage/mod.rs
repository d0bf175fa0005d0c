//! Storage backends and collaborator interfaces

pub mod memory;
pub mod traits;

pub use memory::{MemoryMessageStore, MemoryRateLimitStore, MemoryRelay, MemorySessionStore};
pub use traits::{
    MessageStore, PubSubRelay, RateLimitStore, SessionStore, SharedMessageStore,
    SharedRateLimitStore, SharedRelay, SharedSessionStore, StoredFile,
};
