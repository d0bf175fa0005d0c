use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum ChatPipeError {
    // Session errors
    SessionStore(String),
    SessionNotFound(String),

    // Storage errors
    StorageError(String),

    // Message errors
    MessageParseError(String),
    InvalidFileReference(String),

    // Broadcast errors
    BroadcastError(String),

    // Validation errors
    ValidationError(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for ChatPipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStore(msg) => write!(f, "Session store error: {}", msg),
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::InvalidFileReference(msg) => write!(f, "Invalid file reference: {}", msg),
            Self::BroadcastError(msg) => write!(f, "Broadcast error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for ChatPipeError {}

impl From<serde_json::Error> for ChatPipeError {
    fn from(err: serde_json::Error) -> Self {
        ChatPipeError::MessageParseError(err.to_string())
    }
}

// Generic result type for ChatPipe
pub type Result<T> = std::result::Result<T, ChatPipeError>;
