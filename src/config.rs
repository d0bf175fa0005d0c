//! Pipeline configuration module
//! Handles dynamic configuration parameters for the message ingestion pipeline

use crate::constants::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RATE_LIMIT_MAX_MESSAGES, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_SESSION_TTL_SECS, DEFAULT_STORE_TIMEOUT_MS,
};
use crate::error::{ChatPipeError, Result};
use std::env;
use std::time::Duration;

/// Pipeline configuration parameters
///
/// Constructed explicitly and passed into the pipeline so tests can inject
/// arbitrary word lists and budgets without process-wide side effects.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub host: String,
    pub port: u16,
    /// Banned word list fed into the moderation automaton (reloadable at runtime)
    pub banned_words: Vec<String>,
    /// Rate limit: messages per window per user
    pub rate_limit_max_messages: u64,
    /// Rate limit window length
    pub rate_limit_window: Duration,
    /// Session expiry measured from last activity
    pub session_ttl: Duration,
    /// Upper bound for any single distributed-store call on the hot path
    pub store_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        panic!("PipelineConfig::default() is not allowed. Use PipelineConfig::from_env() instead.");
    }
}

impl PipelineConfig {
    /// Create a test configuration with a small fixed word list
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            banned_words: vec!["spam".to_string(), "scam".to_string()],
            rate_limit_max_messages: 60,
            rate_limit_window: Duration::from_secs(60),
            session_ttl: Duration::from_secs(3600),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("CHATPIPE_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("CHATPIPE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        // The banned word list is mandatory: an empty automaton is a
        // configuration error, not a silently disabled filter.
        let banned_words = env::var("CHATPIPE_BANNED_WORDS")
            .map_err(|_| {
                ChatPipeError::ConfigError(
                    "CHATPIPE_BANNED_WORDS environment variable is required \
                     (comma-separated list of banned words)"
                        .to_string(),
                )
            })?
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>();

        if banned_words.is_empty() {
            return Err(ChatPipeError::ConfigError(
                "CHATPIPE_BANNED_WORDS must contain at least one word".to_string(),
            ));
        }

        let rate_limit_max_messages = env::var("CHATPIPE_RATE_LIMIT_MAX")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_MESSAGES);

        let rate_limit_window_secs = env::var("CHATPIPE_RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);

        let session_ttl_secs = env::var("CHATPIPE_SESSION_TTL_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let store_timeout_ms = env::var("CHATPIPE_STORE_TIMEOUT_MS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

        if rate_limit_max_messages == 0 {
            return Err(ChatPipeError::ConfigError(
                "CHATPIPE_RATE_LIMIT_MAX must be greater than zero".to_string(),
            ));
        }

        if rate_limit_window_secs == 0 {
            return Err(ChatPipeError::ConfigError(
                "CHATPIPE_RATE_LIMIT_WINDOW_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            banned_words,
            rate_limit_max_messages,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            session_ttl: Duration::from_secs(session_ttl_secs),
            store_timeout: Duration::from_millis(store_timeout_ms),
        })
    }
}
