//! Event types crossing the transport boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::message::{ChatMessage, MessageType};
use crate::core::session::Session;
use crate::storage::traits::StoredFile;

/// Stable error codes reported to the originating connection.
pub mod codes {
    pub const MESSAGE_ERROR: &str = "MESSAGE_ERROR";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const MESSAGE_REJECTED: &str = "MESSAGE_REJECTED";
}

/// Payload of an inbound chat message event. Arrives as the event's `data`
/// field; a missing `data` is rejected by the pipeline, not by serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub room: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    pub content: Option<String>,
    #[serde(rename = "fileData", skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

/// File reference attached to a file message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    #[serde(rename = "_id")]
    pub id: Option<String>,
}

/// Client-to-server events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Send a chat message into a room
    #[serde(rename = "chat_message")]
    ChatMessage { data: Option<ChatMessagePayload> },

    /// Join a room
    #[serde(rename = "join_room")]
    JoinRoom { room: String },

    /// Leave a room
    #[serde(rename = "leave_room")]
    LeaveRoom { room: String },
}

/// Sender summary embedded in broadcast payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderSummary {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SenderSummary {
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.user_id.clone(),
            username: session.username.clone(),
            email: session.email.clone(),
        }
    }
}

/// File summary embedded in broadcast payloads of file messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: String,
    #[serde(rename = "originalName")]
    pub original_name: String,
    pub mimetype: String,
    pub size: u64,
}

impl FileSummary {
    pub fn from_stored(file: &StoredFile) -> Self {
        Self {
            id: file.id.clone(),
            original_name: file.original_name.clone(),
            mimetype: file.mimetype.clone(),
            size: file.size,
        }
    }
}

/// A persisted message as broadcast to a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "messageType")]
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender: SenderSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSummary>,
    pub mentions: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl MessageEvent {
    /// Assemble the broadcast payload for a persisted message. The id is
    /// present by the time this runs; an unsaved message is a programming
    /// error surfaced as an empty id rather than a panic.
    pub fn from_parts(message: &ChatMessage, session: &Session, file: Option<&StoredFile>) -> Self {
        Self {
            id: message.id.clone().unwrap_or_default(),
            room_id: message.room_id.clone(),
            message_type: message.message_type,
            content: message.content.clone(),
            timestamp: message.timestamp,
            sender: SenderSummary::from_session(session),
            file: file.map(FileSummary::from_stored),
            mentions: message.mentions.clone(),
            metadata: message.metadata.clone(),
        }
    }
}

/// Server-to-client events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Connection established
    #[serde(rename = "connected")]
    Connected {
        socket_id: String,
        authenticated: bool,
    },

    /// A message broadcast to a room
    #[serde(rename = "message")]
    Message(MessageEvent),

    /// Acknowledgement of a room join
    #[serde(rename = "joined")]
    Joined { room: String },

    /// Acknowledgement of a room leave
    #[serde(rename = "left")]
    Left { room: String },

    /// Error delivered to the originating connection only
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
}

impl ServerEvent {
    pub fn error(code: &str, message: &str) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
            retry_after: None,
        }
    }

    pub fn error_with_retry(code: &str, message: &str, retry_after_secs: u64) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
            retry_after: Some(retry_after_secs),
        }
    }
}
