/// Runtime Execution Engine
///
/// This module provides the resumable step interpreter. It handles:
/// - Typed field values and per-user execution sessions
/// - Dispatch of process steps to action executors
/// - Dialog pause and resume across calls
/// - `@Field` substitution and the database statement mini-language

// Engine entry point, limits and application loading
pub mod engine;

// Action executor trait, registry and the built-in strategies
pub mod executor;

// Action outcome type
pub mod result;

// Session state: call stack, field values, pause marker
pub mod session;

// Database statement parser (STATEMENT / CONNECT / RETURNS)
pub mod statement;

// @Field substitution and RETURNS binding
pub mod substitution;

// Typed field values
pub mod value;

// Re-export main types
pub use engine::{EngineLimits, ExecutionEngine};
pub use executor::{ActionContext, ActionExecutor, ExecutorRegistry};
pub use result::{ActionResult, Outcome};
pub use session::{ExecutionFrame, ExecutionSession, PauseMarker, SessionSnapshot, SessionState};
pub use value::{FieldValue, FromFieldValue};
