//! Core functionality of the message ingestion pipeline

pub mod broadcast;
pub mod events;
pub mod membership;
pub mod message;
pub mod pipeline;
pub mod rate_limiter;
pub mod session;

// Re-export main components for convenience
pub use broadcast::{BroadcastFabric, ConnectionSender};
pub use events::{ChatMessagePayload, ClientEvent, MessageEvent, ServerEvent};
pub use membership::RoomMembershipIndex;
pub use message::{ChatMessage, MessageContent, MessageType};
pub use pipeline::{
    LogMentionSink, MentionSink, MessagePipeline, PipelineOutcome, SocketIdentity,
};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use session::{Session, SessionService, SessionValidation};
