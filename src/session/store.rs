/// Session store: live sessions by id with a per-user index
///
/// Sessions are shared as `Arc<tokio::sync::Mutex<ExecutionSession>>`; holding the
/// mutex is what makes a start or resume single-flight. Attach-or-create is one
/// atomic step keyed by user id, so two concurrent starts for the same user can
/// never produce two sessions.

use crate::error::EngineError;
use crate::runtime::session::ExecutionSession;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Shared handle to a stored session
pub type SessionHandle = Arc<Mutex<ExecutionSession>>;

/// Outcome of `SessionStore::claim`
pub enum SessionClaim {
    /// The offered session was published; the caller holds its lock
    Created(OwnedMutexGuard<ExecutionSession>),
    /// The user already had a session; the offered one was discarded
    Existing(SessionHandle),
}

impl std::fmt::Debug for SessionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionClaim::Created(guard) => f.debug_tuple("Created").field(&guard.session_id()).finish(),
            SessionClaim::Existing(_) => f.write_str("Existing(..)"),
        }
    }
}

/// Storage of live sessions
///
/// Unknown ids and users yield `Ok(None)` / `Ok(false)`, never errors.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Attach to the user's session, or publish `session` (already locked) as theirs
    async fn claim(&self, session: ExecutionSession) -> Result<SessionClaim, EngineError>;

    /// Record that a stored session was used; no-op if it is no longer stored
    async fn save(&self, session: &ExecutionSession) -> Result<(), EngineError>;

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionHandle>, EngineError>;

    async fn get_user_session(&self, user_id: &str) -> Result<Option<SessionHandle>, EngineError>;

    async fn remove(&self, session_id: Uuid) -> Result<bool, EngineError>;

    async fn remove_user_session(&self, user_id: &str) -> Result<bool, EngineError>;

    /// Remove sessions idle for longer than `max_age`; returns how many were removed
    async fn cleanup_expired(&self, max_age: Duration) -> Result<usize, EngineError>;

    async fn count(&self) -> Result<usize, EngineError>;
}

#[derive(Debug)]
struct StoreEntry {
    handle: SessionHandle,
    user_id: String,
    /// Unix millis of the last recorded activity
    last_active: AtomicI64,
}

/// In-memory session store backed by dashmap
///
/// Lock order is always users index then sessions map; no dashmap guard is ever
/// held across an await.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, Arc<StoreEntry>>,
    /// Key: user id, Value: that user's session id
    users: DashMap<String, Uuid>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, session_id: Uuid) -> Option<SessionHandle> {
        self.sessions.get(&session_id).map(|entry| Arc::clone(&entry.handle))
    }

    fn user_session_id(&self, user_id: &str) -> Option<Uuid> {
        self.users.get(user_id).map(|id| *id)
    }

    fn remove_entry(&self, session_id: Uuid) -> bool {
        match self.sessions.remove(&session_id) {
            Some((_, entry)) => {
                self.users.remove_if(&entry.user_id, |_, indexed| *indexed == session_id);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn claim(&self, session: ExecutionSession) -> Result<SessionClaim, EngineError> {
        let session_id = session.session_id();
        let user_id = session.user_id().to_string();
        let last_active = session.last_active().timestamp_millis();

        let handle = Arc::new(Mutex::new(session));
        let guard = Arc::clone(&handle)
            .try_lock_owned()
            .map_err(|_| EngineError::State("Freshly created session is already locked".to_string()))?;

        match self.users.entry(user_id.clone()) {
            Entry::Occupied(mut indexed) => {
                if let Some(existing) = self.handle(*indexed.get()) {
                    return Ok(SessionClaim::Existing(existing));
                }
                // Index pointed at a session that is gone
                indexed.insert(session_id);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session_id);
            }
        }

        self.sessions.insert(
            session_id,
            Arc::new(StoreEntry {
                handle,
                user_id,
                last_active: AtomicI64::new(last_active),
            }),
        );

        Ok(SessionClaim::Created(guard))
    }

    async fn save(&self, session: &ExecutionSession) -> Result<(), EngineError> {
        if let Some(entry) = self.sessions.get(&session.session_id()) {
            entry
                .last_active
                .store(session.last_active().timestamp_millis(), Ordering::SeqCst);
        }
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionHandle>, EngineError> {
        Ok(self.handle(session_id))
    }

    async fn get_user_session(&self, user_id: &str) -> Result<Option<SessionHandle>, EngineError> {
        Ok(self.user_session_id(user_id).and_then(|session_id| self.handle(session_id)))
    }

    async fn remove(&self, session_id: Uuid) -> Result<bool, EngineError> {
        Ok(self.remove_entry(session_id))
    }

    async fn remove_user_session(&self, user_id: &str) -> Result<bool, EngineError> {
        Ok(self
            .user_session_id(user_id)
            .is_some_and(|session_id| self.remove_entry(session_id)))
    }

    async fn cleanup_expired(&self, max_age: Duration) -> Result<usize, EngineError> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(max_age_ms);
        let is_expired = |entry: &StoreEntry| {
            // A locked session is in the middle of a run
            entry.last_active.load(Ordering::SeqCst) < cutoff && entry.handle.try_lock().is_ok()
        };

        // Collect first so no shard stays locked for the whole scan
        let candidates: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| is_expired(entry.value().as_ref()))
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        for session_id in candidates {
            if let Some((_, entry)) = self.sessions.remove_if(&session_id, |_, entry| is_expired(entry.as_ref())) {
                self.users.remove_if(&entry.user_id, |_, indexed| *indexed == session_id);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("🧹 Removed {} expired sessions", removed);
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, EngineError> {
        Ok(self.sessions.len())
    }
}
