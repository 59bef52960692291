/// Execution engine: the step interpreter's entry point
///
/// Owns the module cache, the executor registry, the SQL gateway and the
/// interpreter limits. Sessions run their root process through `run`, which
/// either starts it from the first step or continues a paused call stack.

use crate::database::SqlGateway;
use crate::definition::{storage::DefinitionRepository, types::ActionType, ModuleCache};
use crate::error::EngineError;
use crate::runtime::executor::{ActionContext, ExecutorRegistry};
use crate::runtime::result::ActionResult;
use crate::runtime::session::ExecutionSession;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Interpreter ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Maximum nesting of process calls
    pub max_call_depth: usize,
    /// Maximum steps per single process invocation
    pub max_iterations: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 20,
            max_iterations: 10_000,
        }
    }
}

pub struct ExecutionEngine {
    cache: Arc<ModuleCache>,
    registry: ExecutorRegistry,
    gateway: Arc<dyn SqlGateway>,
    repository: Arc<dyn DefinitionRepository>,
    limits: EngineLimits,
}

impl ExecutionEngine {
    /// Engine with the built-in executors and default limits
    pub fn new(
        cache: Arc<ModuleCache>,
        gateway: Arc<dyn SqlGateway>,
        repository: Arc<dyn DefinitionRepository>,
    ) -> Self {
        Self {
            cache,
            registry: ExecutorRegistry::with_defaults(),
            gateway,
            repository,
            limits: EngineLimits::default(),
        }
    }

    pub fn with_registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &dyn SqlGateway {
        self.gateway.as_ref()
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Replace the cache contents with every activatable application
    ///
    /// Returns the number of applications loaded.
    pub async fn load_applications(&self, activate_on_start: bool) -> Result<usize, EngineError> {
        let applications = self.repository.load_applications(activate_on_start).await?;

        if applications.is_empty() {
            tracing::warn!("⚠️ No applications to load (activate_on_start = {})", activate_on_start);
        }

        // Load everything before touching the cache so a failing read keeps the old state
        let mut loaded = Vec::with_capacity(applications.len());
        for application in &applications {
            let modules = self.repository.load_modules(application.id).await?;
            tracing::debug!("📥 Application '{}' has {} modules", application.name, modules.len());
            loaded.push((application.id, modules));
        }

        self.cache.clear();
        for (application_id, modules) in loaded {
            self.cache.load_application(application_id, modules);
        }

        tracing::info!("✅ Loaded {} applications into module cache", applications.len());
        Ok(applications.len())
    }

    /// Reload a single application's modules from the repository
    ///
    /// Returns the number of modules now cached for it.
    pub async fn reload_application(&self, application_id: Uuid) -> Result<usize, EngineError> {
        let known = self.cache.has_application(application_id)
            || self
                .repository
                .load_applications(false)
                .await?
                .iter()
                .any(|application| application.id == application_id);
        if !known {
            return Err(EngineError::NotFound(format!("Application {} not found", application_id)));
        }

        let modules = self.repository.load_modules(application_id).await?;
        let count = modules.len();
        self.cache.load_application(application_id, modules);

        tracing::info!("🔥 Hot-reloaded application {} ({} modules)", application_id, count);
        Ok(count)
    }

    /// Create a session bound to this engine's cache
    pub fn new_session(&self, user_id: impl Into<String>, application_id: Uuid, root_process_id: Uuid) -> ExecutionSession {
        ExecutionSession::new(user_id, application_id, root_process_id, Arc::clone(&self.cache))
    }

    /// Run a session's root process, continuing where it paused if suspended
    pub async fn run(&self, session: &mut ExecutionSession, cancel: &CancellationToken) -> ActionResult {
        let resuming = session.is_paused();
        tracing::info!(
            "🚀 {} session {} for user '{}' (process {})",
            if resuming { "Resuming" } else { "Starting" },
            session.session_id(),
            session.user_id(),
            session.root_process_id()
        );

        session.touch();
        session.prepare_run();

        let root_process_id = session.root_process_id();
        let ctx = ActionContext { engine: self, cancel };
        let result = match self.registry.get(ActionType::Call) {
            Ok(executor) => executor.execute(ctx, session, root_process_id).await,
            Err(error) => ActionResult::from_error(error),
        };

        session.finish_run();
        session.touch();

        if session.is_paused() {
            tracing::info!(
                "⏸️ Session {} paused at step {:?}",
                session.session_id(),
                session.paused_at_step()
            );
        } else {
            tracing::info!(
                "🏁 Session {} finished: {:?} - {}",
                session.session_id(),
                result.outcome,
                result.message
            );
        }

        result
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("registry", &self.registry)
            .field("limits", &self.limits)
            .finish()
    }
}
