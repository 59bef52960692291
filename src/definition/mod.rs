/// Definition management module
///
/// Handles application and module definitions: the typed model, the hot-swappable
/// in-memory cache and the repositories definitions are loaded from.

// Core definition types (Application, Module, ModuleKind, details)
pub mod types;

// ArcSwap-based module cache with per-application indexes
pub mod cache;

// Definition repositories (in-memory and SQLite)
pub mod storage;

pub use cache::{ModuleCache, TypedModule};
pub use storage::{DefinitionRepository, InMemoryDefinitionRepository, SqliteDefinitionRepository};
pub use types::*;
