//! Domain message model and content parsing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::storage::traits::StoredFile;

/// Kind of chat message accepted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    File,
}

/// A chat message flowing through the pipeline.
///
/// `id` is assigned exactly once, by the durable store at persistence;
/// `timestamp` is assigned exactly once, at construction, by the node that
/// processed the message. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub room_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub mentions: Vec<String>,
    pub file_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ChatMessage {
    /// Build a text message. Empty trimmed content yields `None`: empty
    /// messages are ignored upstream, not persisted.
    pub fn text(room_id: &str, sender_id: &str, content: &MessageContent) -> Option<Self> {
        if content.is_empty() {
            return None;
        }

        Some(Self {
            id: None,
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            message_type: MessageType::Text,
            content: content.trimmed().to_string(),
            timestamp: Utc::now(),
            mentions: content.mentions().to_vec(),
            file_id: None,
            metadata: HashMap::new(),
        })
    }

    /// Build a file message carrying metadata resolved from the stored file
    /// record. Ownership of the file has already been checked by the caller.
    pub fn file(
        room_id: &str,
        sender_id: &str,
        content: &MessageContent,
        file: &StoredFile,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("fileType".to_string(), file.mimetype.clone());
        metadata.insert("fileSize".to_string(), file.size.to_string());
        metadata.insert("originalName".to_string(), file.original_name.clone());

        Self {
            id: None,
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            message_type: MessageType::File,
            content: content.trimmed().to_string(),
            timestamp: Utc::now(),
            mentions: content.mentions().to_vec(),
            file_id: Some(file.id.clone()),
            metadata,
        }
    }
}

/// Parsed message content: trimmed text plus extracted mention tokens.
///
/// Parsing never fails; malformed mention syntax degrades to "no mentions".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    trimmed: String,
    mentions: Vec<String>,
}

impl MessageContent {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().to_string();

        let mut mentions = Vec::new();
        for token in trimmed.split_whitespace() {
            if let Some(rest) = token.strip_prefix('@') {
                let name: String = rest
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                    .collect();
                if !name.is_empty() && !mentions.contains(&name) {
                    mentions.push(name);
                }
            }
        }

        Self { trimmed, mentions }
    }

    pub fn trimmed(&self) -> &str {
        &self.trimmed
    }

    pub fn is_empty(&self) -> bool {
        self.trimmed.is_empty()
    }

    pub fn mentions(&self) -> &[String] {
        &self.mentions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let content = MessageContent::parse("  hello world \n");
        assert_eq!(content.trimmed(), "hello world");
        assert!(!content.is_empty());
    }

    #[test]
    fn test_parse_extracts_mentions() {
        let content = MessageContent::parse("hey @alice and @bob-2, ping @alice");
        assert_eq!(content.mentions(), ["alice", "bob-2"]);
    }

    #[test]
    fn test_malformed_mentions_degrade_to_none() {
        let content = MessageContent::parse("lone @ and email foo@bar");
        assert!(content.mentions().is_empty());
    }

    #[test]
    fn test_empty_text_message_is_none() {
        let content = MessageContent::parse("   \t ");
        assert!(content.is_empty());
        assert!(ChatMessage::text("room", "user", &content).is_none());
    }
}
