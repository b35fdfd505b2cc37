//! In-memory web session repository.
//!
//! Sessions hold arbitrary attributes and expire after a period of
//! inactivity. The repository only knows session ids; mapping requests to
//! ids is the job of the configured session id resolver.

use bearer_session_core::SessionId;
use bearer_session_resolver::SessionData;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A web session.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    data: SessionData,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new, empty session with a generated id.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            data: SessionData::new(),
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the session attributes.
    #[must_use]
    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// Returns the session attributes for mutation.
    pub fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session was last used.
    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    /// Returns true if the session has been idle longer than `max_inactive`.
    #[must_use]
    pub fn is_expired(&self, max_inactive: Duration) -> bool {
        Utc::now() - self.last_accessed_at >= max_inactive
    }

    fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Stores sessions in process memory.
pub struct SessionRepository {
    sessions: RwLock<HashMap<SessionId, Session>>,
    max_inactive: Duration,
}

impl SessionRepository {
    /// Creates a repository discarding sessions idle for `max_inactive`.
    #[must_use]
    pub fn new(max_inactive: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_inactive,
        }
    }

    /// Looks up a live session and marks it accessed.
    ///
    /// Expired sessions are removed and read as absent.
    pub async fn find_by_id(&self, id: &SessionId) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if session.is_expired(self.max_inactive) => {
                sessions.remove(id);
                None
            }
            Some(session) => {
                session.touch();
                Some(session.clone())
            }
            None => None,
        }
    }

    /// Saves a session, replacing any previous state.
    pub async fn save(&self, mut session: Session) {
        session.touch();
        self.sessions
            .write()
            .await
            .insert(session.id().clone(), session);
    }

    /// Deletes a session.
    pub async fn delete(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Deletes every expired session, returning how many were removed.
    pub async fn delete_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.max_inactive));
        before - sessions.len()
    }

    /// Returns the number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
