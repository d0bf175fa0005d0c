//! Session records and the distributed session store client
//!
//! Sessions are created by the login flow (outside this crate) and shared
//! through a distributed store so a user may reconnect to any node. This
//! core only reads and refreshes them on the message hot path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::traits::SessionStore;

/// Session metadata keyed by user id in the distributed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub access_count: u64,
    pub username: String,
    pub email: Option<String>,
    /// Opaque metadata carried for the login flow; not interpreted here
    pub metadata: Option<String>,
}

impl Session {
    pub fn new(user_id: String, username: String, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            last_activity: now,
            access_count: 0,
            username,
            email,
            metadata: None,
        }
    }

    /// Expired when `now - last_activity` exceeds the TTL, regardless of
    /// access count.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Utc::now().signed_duration_since(self.last_activity) > ttl
    }

    /// Refresh activity and bump the access counter.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
        self.access_count += 1;
    }
}

/// Result of validating the session attached to a connection.
#[derive(Debug)]
pub enum SessionValidation {
    Valid(Session),
    Invalid,
}

impl SessionValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionValidation::Valid(_))
    }
}

/// Client for the distributed session store.
///
/// Read-path failures (store unavailable, call timed out) are treated as
/// "session not found" and logged as degraded mode: the hot path fails
/// closed and the client is asked to sign in again. Write failures on
/// `save` surface as errors since losing a session write breaks the login
/// flow, not just one message.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    timeout: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout,
        }
    }

    /// Validate the (user, session) pair presented by a connection.
    ///
    /// Valid sessions get their activity refreshed and are re-saved with a
    /// reset TTL; a failed refresh write is logged but does not invalidate
    /// the already-successful read.
    pub async fn validate(&self, user_id: &str, session_id: &str) -> SessionValidation {
        let found = match tokio::time::timeout(self.timeout, self.store.find(user_id)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                log::warn!(
                    "session store degraded, treating session as absent: user={}, error={}",
                    user_id,
                    e
                );
                None
            }
            Err(_) => {
                log::warn!(
                    "session store timed out after {:?}, treating session as absent: user={}",
                    self.timeout,
                    user_id
                );
                None
            }
        };

        let mut session = match found {
            Some(session) => session,
            None => return SessionValidation::Invalid,
        };

        if session.session_id != session_id {
            log::debug!("session id mismatch for user {}", user_id);
            return SessionValidation::Invalid;
        }

        if session.is_expired(self.ttl) {
            log::debug!("session expired for user {}", user_id);
            return SessionValidation::Invalid;
        }

        session.touch();
        let refresh = match tokio::time::timeout(self.timeout, self.store.save(session.clone()))
            .await
        {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(crate::error::ChatPipeError::SessionStore(
                "session refresh timed out".to_string(),
            )),
        };
        if let Err(e) = refresh {
            log::warn!("failed to refresh session for user {}: {}", user_id, e);
        }

        SessionValidation::Valid(session)
    }

    /// Upsert a session with a reset TTL. Errors surface to the caller.
    pub async fn save(&self, session: Session) -> Result<Session> {
        self.store.save(session).await
    }

    pub async fn delete(&self, user_id: &str, session_id: &str) -> Result<()> {
        self.store.delete(user_id, session_id).await
    }

    /// Cluster-wide sign-out for a user.
    pub async fn delete_all(&self, user_id: &str) -> Result<()> {
        self.store.delete_all(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_fresh() {
        let session = Session::new("u1".to_string(), "alice".to_string(), None);
        assert_eq!(session.access_count, 0);
        assert!(!session.is_expired(Duration::from_secs(60)));
    }

    #[test]
    fn test_touch_bumps_access_count() {
        let mut session = Session::new("u1".to_string(), "alice".to_string(), None);
        session.touch();
        session.touch();
        assert_eq!(session.access_count, 2);
    }

    #[test]
    fn test_expiry_ignores_access_count() {
        let mut session = Session::new("u1".to_string(), "alice".to_string(), None);
        session.access_count = 10_000;
        session.last_activity = Utc::now() - chrono::Duration::seconds(120);
        assert!(session.is_expired(Duration::from_secs(60)));
        assert!(!session.is_expired(Duration::from_secs(600)));
    }
}
