/// Stepway: resumable business-process runtime
///
/// This library interprets process modules step by step, pauses on dialogs and
/// resumes when the user answers, keeping one live session per user.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// Definition model, module cache and definition repositories
pub mod definition;

// Named SQL connections used by database actions
pub mod database;

// Runtime execution engine - step interpreter, executors and sessions
pub mod runtime;

// Session store, manager and TTL sweeper
pub mod session;

// HTTP API layer - workflow session endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use definition::{Application, Module, ModuleCache, ModuleKind};
pub use error::EngineError;
pub use runtime::{ActionResult, ExecutionEngine, ExecutionSession, FieldValue};
pub use server::start_server;
pub use session::SessionManager;
