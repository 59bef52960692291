/// Session store and manager
///
/// Live sessions, one per user, kept between a dialog pause and the call that
/// resumes it. Idle sessions are swept on a timer.

// Session store trait and the in-memory dashmap store
pub mod store;

// Start / resume / status / cancel on top of the engine and the store
pub mod manager;

// Background TTL sweep
pub mod sweeper;

pub use manager::{ResumeWorkflowResponse, SessionManager, StartWorkflowResponse, WorkflowStatus};
pub use store::{InMemorySessionStore, SessionClaim, SessionHandle, SessionStore};
pub use sweeper::SessionSweeper;
