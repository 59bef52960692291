/// Action executors and their registry
///
/// One stateless strategy per action type. The registry is an explicit value owned
/// by the engine, so tests can swap in their own executors.

use crate::definition::types::ActionType;
use crate::error::EngineError;
use crate::runtime::engine::ExecutionEngine;
use crate::runtime::result::ActionResult;
use crate::runtime::session::ExecutionSession;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod calculate;
pub mod compare;
pub mod database;
pub mod dialog;
pub mod process;

pub use calculate::CalculateExecutor;
pub use compare::CompareExecutor;
pub use database::DatabaseActionExecutor;
pub use dialog::DialogExecutor;
pub use process::ProcessModuleExecutor;

/// Shared collaborators handed to every executor call
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    pub engine: &'a ExecutionEngine,
    pub cancel: &'a CancellationToken,
}

/// Strategy executing one kind of action against a target module
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute the action on `module_id`; failures are reported in the result
    async fn execute(&self, ctx: ActionContext<'_>, session: &mut ExecutionSession, module_id: Uuid) -> ActionResult;
}

/// Map from action type to executor
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<ActionType, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the five built-in executors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ActionType::Call, Arc::new(ProcessModuleExecutor));
        registry.register(ActionType::Dialog, Arc::new(DialogExecutor));
        registry.register(ActionType::DatabaseExecute, Arc::new(DatabaseActionExecutor));
        registry.register(ActionType::Compare, Arc::new(CompareExecutor));
        registry.register(ActionType::Calculate, Arc::new(CalculateExecutor));
        registry
    }

    /// Register or replace the executor of an action type
    pub fn register(&mut self, action_type: ActionType, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(action_type, executor);
    }

    pub fn get(&self, action_type: ActionType) -> Result<Arc<dyn ActionExecutor>, EngineError> {
        self.executors
            .get(&action_type)
            .cloned()
            .ok_or(EngineError::UnsupportedAction(action_type))
    }

    pub fn contains(&self, action_type: ActionType) -> bool {
        self.executors.contains_key(&action_type)
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<String> = self.executors.keys().map(|action| format!("{:?}", action)).collect();
        registered.sort();
        f.debug_struct("ExecutorRegistry").field("registered", &registered).finish()
    }
}
