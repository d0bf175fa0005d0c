//! Message ingestion pipeline
//!
//! One inbound chat event runs the fixed stage order
//! validation -> authentication -> rate limit -> room authorization ->
//! content parsing -> moderation -> persistence -> broadcast -> side
//! effects, with early exit on any rejection. The pipeline holds no locks
//! of its own on the hot path: it reads the immutable automaton and
//! delegates atomic operations to the distributed stores. Any number of
//! runs for the same user or room may execute concurrently.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use async_trait::async_trait;

use crate::config::PipelineConfig;
use crate::core::broadcast::BroadcastFabric;
use crate::core::events::{codes, ChatMessagePayload, MessageEvent, ServerEvent};
use crate::core::membership::RoomMembershipIndex;
use crate::core::message::{ChatMessage, MessageContent};
use crate::core::rate_limiter::RateLimiter;
use crate::core::session::{SessionService, SessionValidation};
use crate::error::{ChatPipeError, Result};
use crate::metrics::{outcome, PipelineMetrics};
use crate::moderation::BannedWordChecker;
use crate::storage::traits::{MessageStore, RateLimitStore, SessionStore, StoredFile};

/// Identity attached to a connection at upgrade time, carried for the
/// lifetime of the socket. The login flow that issued it is external.
#[derive(Debug, Clone)]
pub struct SocketIdentity {
    pub user_id: String,
    pub auth_session_id: String,
    pub socket_id: String,
}

/// Mention-based side effect collaborator, dispatched after broadcast
/// without blocking pipeline completion.
#[async_trait]
pub trait MentionSink: Send + Sync {
    async fn handle_mentions(
        &self,
        room_id: &str,
        sender_id: &str,
        mentions: &[String],
    ) -> Result<()>;
}

/// Default sink: records the trigger and does nothing else.
pub struct LogMentionSink;

#[async_trait]
impl MentionSink for LogMentionSink {
    async fn handle_mentions(
        &self,
        room_id: &str,
        sender_id: &str,
        mentions: &[String],
    ) -> Result<()> {
        log::debug!(
            "mentions in room {} from {}: {:?}",
            room_id,
            sender_id,
            mentions
        );
        Ok(())
    }
}

/// Result of one pipeline run. Drives both the client response and the
/// metrics label.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Rejected; the event goes back to the originating connection only.
    Rejected {
        reason: &'static str,
        event: ServerEvent,
    },
    /// Empty text message: not an error, not a success, nothing persisted.
    Ignored,
    /// Persisted and broadcast to the room.
    Persisted(ChatMessage),
}

impl PipelineOutcome {
    fn rejected(reason: &'static str, code: &str, message: &str) -> Self {
        Self::Rejected {
            reason,
            event: ServerEvent::error(code, message),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

pub struct MessagePipeline {
    sessions: SessionService,
    rate_limiter: RateLimiter,
    membership: Arc<RoomMembershipIndex>,
    /// Swapped wholesale on banned-word reload; readers clone the Arc and
    /// scan without holding the lock.
    banned_words: RwLock<Arc<BannedWordChecker>>,
    messages: Arc<dyn MessageStore>,
    fabric: Arc<BroadcastFabric>,
    metrics: Arc<PipelineMetrics>,
    mentions: Arc<dyn MentionSink>,
}

impl MessagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &PipelineConfig,
        session_store: Arc<dyn SessionStore>,
        rate_limit_store: Arc<dyn RateLimitStore>,
        message_store: Arc<dyn MessageStore>,
        membership: Arc<RoomMembershipIndex>,
        fabric: Arc<BroadcastFabric>,
        metrics: Arc<PipelineMetrics>,
        mentions: Arc<dyn MentionSink>,
    ) -> Result<Self> {
        let banned_words = BannedWordChecker::new(config.banned_words.clone())?;

        Ok(Self {
            sessions: SessionService::new(
                session_store,
                config.session_ttl,
                config.store_timeout,
            ),
            rate_limiter: RateLimiter::new(
                rate_limit_store,
                config.rate_limit_max_messages,
                config.rate_limit_window,
                config.store_timeout,
            ),
            membership,
            banned_words: RwLock::new(Arc::new(banned_words)),
            messages: message_store,
            fabric,
            metrics,
            mentions,
        })
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn membership(&self) -> &Arc<RoomMembershipIndex> {
        &self.membership
    }

    /// Rebuild the moderation automaton from a new word list and swap it in.
    /// In-flight runs keep scanning against the automaton they started with.
    pub async fn reload_banned_words(&self, words: Vec<String>) -> Result<()> {
        let checker = Arc::new(BannedWordChecker::new(words)?);
        let word_count = checker.word_count();
        *self.banned_words.write().await = checker;
        log::info!("banned word list reloaded, {} words", word_count);
        Ok(())
    }

    /// Run one inbound chat event through the pipeline.
    ///
    /// Never panics the calling task: any unexpected failure inside the
    /// stages is converted into a generic `MESSAGE_ERROR` for the
    /// originating connection and an `exception`-labeled metric.
    pub async fn process(
        &self,
        identity: Option<&SocketIdentity>,
        payload: Option<ChatMessagePayload>,
    ) -> PipelineOutcome {
        let started = Instant::now();
        let type_label = payload
            .as_ref()
            .map(|p| p.message_type.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let outcome = match self.run(identity, payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("message pipeline failed: {}", e);
                PipelineOutcome::rejected(
                    outcome::EXCEPTION,
                    codes::MESSAGE_ERROR,
                    "message could not be processed",
                )
            }
        };

        let label = match &outcome {
            PipelineOutcome::Rejected { reason, .. } => *reason,
            PipelineOutcome::Ignored => outcome::IGNORED,
            PipelineOutcome::Persisted(_) => outcome::SUCCESS,
        };
        self.metrics.record(label, &type_label, started.elapsed()).await;

        outcome
    }

    async fn run(
        &self,
        identity: Option<&SocketIdentity>,
        payload: Option<ChatMessagePayload>,
    ) -> Result<PipelineOutcome> {
        // Received -> Authenticated
        let payload = match payload {
            Some(payload) => payload,
            None => {
                return Ok(PipelineOutcome::rejected(
                    outcome::NULL_DATA,
                    codes::MESSAGE_ERROR,
                    "message payload is missing",
                ))
            }
        };

        let identity = match identity {
            Some(identity) => identity,
            None => {
                return Ok(PipelineOutcome::rejected(
                    outcome::SESSION_NULL,
                    codes::SESSION_EXPIRED,
                    "session expired, please sign in again",
                ))
            }
        };

        let session = match self
            .sessions
            .validate(&identity.user_id, &identity.auth_session_id)
            .await
        {
            SessionValidation::Valid(session) => session,
            SessionValidation::Invalid => {
                return Ok(PipelineOutcome::rejected(
                    outcome::SESSION_EXPIRED,
                    codes::SESSION_EXPIRED,
                    "session expired, please sign in again",
                ))
            }
        };

        // Authenticated -> RateLimitChecked
        let decision = self.rate_limiter.check_and_consume(&session.user_id).await;
        if !decision.allowed {
            log::warn!(
                "rate limit exceeded for user {}, retry after {}s",
                session.user_id,
                decision.retry_after_secs
            );
            return Ok(PipelineOutcome::Rejected {
                reason: outcome::RATE_LIMIT,
                event: ServerEvent::error_with_retry(
                    codes::RATE_LIMIT_EXCEEDED,
                    "message rate limit exceeded, try again shortly",
                    decision.retry_after_secs,
                ),
            });
        }

        // RateLimitChecked -> RoomAuthorized
        let room_id = payload.room.clone();
        if !self.membership.is_member(&session.user_id, &room_id).await {
            return Ok(PipelineOutcome::rejected(
                outcome::ROOM_ACCESS_DENIED,
                codes::MESSAGE_ERROR,
                "no access to this room",
            ));
        }

        // RoomAuthorized -> ContentParsed (parsing never fails)
        let content = MessageContent::parse(payload.content.as_deref().unwrap_or(""));
        log::debug!(
            "message received: type={}, room={}, user={}, has_file={}",
            payload.message_type,
            room_id,
            session.user_id,
            payload.file_data.is_some()
        );

        // ContentParsed -> Moderated
        let checker = self.banned_words.read().await.clone();
        if checker.contains_banned_word(content.trimmed()) {
            return Ok(PipelineOutcome::rejected(
                outcome::BANNED_WORD,
                codes::MESSAGE_REJECTED,
                "message contains a banned word",
            ));
        }

        // Moderated -> Persisted
        let (message, file) = match payload.message_type.as_str() {
            "file" => match self.build_file_message(&payload, &session.user_id, &content).await? {
                Ok(built) => built,
                Err(rejection) => return Ok(rejection),
            },
            "text" => match ChatMessage::text(&room_id, &session.user_id, &content) {
                Some(message) => (message, None),
                None => {
                    log::debug!(
                        "empty message ignored: room={}, user={}",
                        room_id,
                        session.user_id
                    );
                    return Ok(PipelineOutcome::Ignored);
                }
            },
            other => {
                return Err(ChatPipeError::ValidationError(format!(
                    "unsupported message type: {}",
                    other
                )))
            }
        };

        let saved = match self.messages.save(message).await {
            Ok(saved) => saved,
            Err(e) => {
                // No automatic retry: a failed save is a lost message and
                // the sender must hear about it.
                log::error!("failed to persist message in room {}: {}", room_id, e);
                return Ok(PipelineOutcome::rejected(
                    outcome::PERSIST_FAILED,
                    codes::MESSAGE_ERROR,
                    "message could not be saved",
                ));
            }
        };

        // Persisted -> Broadcast
        let event = ServerEvent::Message(MessageEvent::from_parts(&saved, &session, file.as_ref()));
        let delivered = self.fabric.publish(&room_id, &event).await?;
        log::debug!(
            "message {} broadcast to {} local connections in room {}",
            saved.id.as_deref().unwrap_or("?"),
            delivered,
            room_id
        );

        // Broadcast -> SideEffectsDispatched: fire-and-forget so a slow
        // downstream consumer never adds latency to delivery, and a failure
        // never rolls back a message that is already durably visible.
        if !saved.mentions.is_empty() {
            let sink = self.mentions.clone();
            let room = room_id.clone();
            let sender = session.user_id.clone();
            let mentions = saved.mentions.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.handle_mentions(&room, &sender, &mentions).await {
                    log::warn!("mention side effect failed in room {}: {}", room, e);
                }
            });
        }

        Ok(PipelineOutcome::Persisted(saved))
    }

    /// Resolve and validate the file reference of a file message.
    ///
    /// The outer error is fatal-to-message (store failure); the inner
    /// `Err` is an ordinary client rejection.
    async fn build_file_message(
        &self,
        payload: &ChatMessagePayload,
        sender_id: &str,
        content: &MessageContent,
    ) -> Result<std::result::Result<(ChatMessage, Option<StoredFile>), PipelineOutcome>> {
        let file_id = match payload.file_data.as_ref().and_then(|f| f.id.as_deref()) {
            Some(id) => id,
            None => {
                return Ok(Err(PipelineOutcome::rejected(
                    outcome::INVALID_FILE,
                    codes::MESSAGE_ERROR,
                    "file reference is missing",
                )))
            }
        };

        let file = match self.messages.find_file_by_id(file_id).await? {
            Some(file) if file.owner_id == sender_id => file,
            _ => {
                return Ok(Err(PipelineOutcome::rejected(
                    outcome::INVALID_FILE,
                    codes::MESSAGE_ERROR,
                    "file not found or not owned by sender",
                )))
            }
        };

        let message = ChatMessage::file(&payload.room, sender_id, content, &file);
        Ok(Ok((message, Some(file))))
    }
}
