/// HTTP API Layer
///
/// REST endpoints over the session manager. It handles:
/// - Starting and resuming workflows
/// - Session status and cancellation
/// - Reloading an application's definitions

// Workflow session endpoints
pub mod workflows;

// Re-export router builder
pub use workflows::{create_workflow_routes, AppState};
