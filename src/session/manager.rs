/// Session manager
///
/// Drives workflows on behalf of users: attach-or-create on start, typed input
/// on resume, status snapshots and cancellation. Each start or resume holds the
/// session's mutex for the whole interpreter run, so at most one call proceeds
/// against a session at a time.
///
/// A run works on a copy of the session and writes it back only once the run
/// ends. If the calling future is dropped mid-run the stored session keeps its
/// last settled state: still paused after a resume, or never paused after a
/// start. An unlocked session that is not paused is therefore abandoned.

use crate::error::EngineError;
use crate::runtime::engine::ExecutionEngine;
use crate::runtime::session::{ExecutionSession, SessionSnapshot, SessionState};
use crate::session::store::{SessionClaim, SessionStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session status reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Active,
    Paused,
    Completed,
    NotFound,
}

impl From<SessionState> for WorkflowStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Active => WorkflowStatus::Active,
            SessionState::Paused => WorkflowStatus::Paused,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowResponse {
    pub session_id: Uuid,
    pub status: WorkflowStatus,
    pub is_existing_session: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<Value>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeWorkflowResponse {
    pub session_id: Uuid,
    pub status: WorkflowStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<Value>,
    pub success: bool,
}

impl ResumeWorkflowResponse {
    fn not_found(session_id: Uuid) -> Self {
        Self {
            session_id,
            status: WorkflowStatus::NotFound,
            message: "Session not found".to_string(),
            screen: None,
            success: false,
        }
    }
}

/// Coordinates the engine and the session store
pub struct SessionManager {
    engine: Arc<ExecutionEngine>,
    store: Arc<dyn SessionStore>,
    /// Parent of every per-call cancellation token
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(engine: Arc<ExecutionEngine>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            engine,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie in-flight runs to an outer shutdown token
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a workflow for a user, or attach to the session they already have
    pub async fn start_workflow(
        &self,
        application_id: Uuid,
        process_id: Uuid,
        user_id: &str,
    ) -> Result<StartWorkflowResponse, EngineError> {
        loop {
            let session = self.engine.new_session(user_id, application_id, process_id);

            match self.store.claim(session).await? {
                SessionClaim::Existing(handle) => {
                    let session = handle.lock().await;
                    // The owning call may have finished and removed it while we waited
                    if self.store.get(session.session_id()).await?.is_none() {
                        continue;
                    }
                    if !session.is_paused() {
                        self.discard_abandoned(&session).await?;
                        continue;
                    }

                    let status = WorkflowStatus::from(session.state());
                    tracing::info!(
                        "🔗 User '{}' attached to existing session {} ({:?})",
                        user_id,
                        session.session_id(),
                        status
                    );
                    return Ok(StartWorkflowResponse {
                        session_id: session.session_id(),
                        status,
                        is_existing_session: true,
                        message: format!("Connected to existing session. Status: {:?}", status),
                        screen: session.screen().cloned(),
                        success: true,
                    });
                }
                SessionClaim::Created(mut session) => {
                    let session_id = session.session_id();

                    if self.engine.cache().get_process(application_id, process_id).is_none() {
                        self.store.remove(session_id).await?;
                        return Err(EngineError::NotFound(format!(
                            "Process module {} not found in application {}",
                            process_id, application_id
                        )));
                    }

                    tracing::info!("🆕 Created session {} for user '{}'", session_id, user_id);
                    let mut working = session.clone();
                    let cancel = self.shutdown.child_token();
                    let result = working.start(&self.engine, &cancel).await;
                    *session = working;
                    let status = self.settle(&session).await?;
                    let success = result.is_success();

                    return Ok(StartWorkflowResponse {
                        session_id,
                        status,
                        is_existing_session: false,
                        message: result.message,
                        screen: session.screen().cloned(),
                        success,
                    });
                }
            }
        }
    }

    /// Feed a value to a paused session and continue it
    ///
    /// `value` is parsed as the field's declared type; a value that does not
    /// parse fails with `Validation` and the session stays paused and unchanged.
    pub async fn resume_workflow(
        &self,
        session_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<ResumeWorkflowResponse, EngineError> {
        let Some(handle) = self.store.get(session_id).await? else {
            return Ok(ResumeWorkflowResponse::not_found(session_id));
        };

        let mut session = handle.lock().await;
        if self.store.get(session_id).await?.is_none() {
            return Ok(ResumeWorkflowResponse::not_found(session_id));
        }

        if !session.is_paused() {
            self.discard_abandoned(&session).await?;
            return Ok(ResumeWorkflowResponse::not_found(session_id));
        }

        if !session.can_resume() {
            tracing::warn!("⚠️ Session {} has no call stack, refusing resume", session_id);
            return Ok(ResumeWorkflowResponse {
                session_id,
                status: WorkflowStatus::from(session.state()),
                message: "Session is not in a resumable state".to_string(),
                screen: None,
                success: false,
            });
        }

        let mut working = session.clone();
        working.set_field_from_text(field_id, value)?;

        let cancel = self.shutdown.child_token();
        let result = working.start(&self.engine, &cancel).await;
        *session = working;
        let status = self.settle(&session).await?;
        let success = result.is_success();

        Ok(ResumeWorkflowResponse {
            session_id,
            status,
            message: result.message,
            screen: session.screen().cloned(),
            success,
        })
    }

    /// Drop a session whose run never settled
    async fn discard_abandoned(&self, session: &ExecutionSession) -> Result<(), EngineError> {
        if self.store.remove(session.session_id()).await? {
            tracing::warn!(
                "🗑️ Discarded abandoned session {} of user '{}'",
                session.session_id(),
                session.user_id()
            );
        }
        Ok(())
    }

    /// Keep a paused session, drop a finished one
    async fn settle(&self, session: &ExecutionSession) -> Result<WorkflowStatus, EngineError> {
        if session.is_paused() {
            self.store.save(session).await?;
            Ok(WorkflowStatus::Paused)
        } else {
            self.store.remove(session.session_id()).await?;
            tracing::info!("✅ Session {} completed and removed", session.session_id());
            Ok(WorkflowStatus::Completed)
        }
    }

    pub async fn get_session_status(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, EngineError> {
        match self.store.get(session_id).await? {
            Some(handle) => Ok(Some(handle.lock().await.snapshot())),
            None => Ok(None),
        }
    }

    pub async fn get_user_session_status(&self, user_id: &str) -> Result<Option<SessionSnapshot>, EngineError> {
        match self.store.get_user_session(user_id).await? {
            Some(handle) => Ok(Some(handle.lock().await.snapshot())),
            None => Ok(None),
        }
    }

    pub async fn cancel_session(&self, session_id: Uuid) -> Result<bool, EngineError> {
        let removed = self.store.remove(session_id).await?;
        if removed {
            tracing::info!("🛑 Cancelled session {}", session_id);
        }
        Ok(removed)
    }

    pub async fn cancel_user_session(&self, user_id: &str) -> Result<bool, EngineError> {
        let removed = self.store.remove_user_session(user_id).await?;
        if removed {
            tracing::info!("🛑 Cancelled session of user '{}'", user_id);
        }
        Ok(removed)
    }

    pub async fn cleanup_expired_sessions(&self, max_age: Duration) -> Result<usize, EngineError> {
        self.store.cleanup_expired(max_age).await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
