/// Hot-reload module cache using ArcSwap
///
/// Holds every loaded application's modules indexed by id and by name.
/// Readers take a snapshot pointer and never block; loading or reloading an
/// application swaps the whole map atomically, so in-flight executions keep
/// the snapshot they started with.

use crate::definition::types::{
    CalculateActionModule, CompareActionModule, DatabaseActionModule, DialogActionModule,
    FieldModule, ListModule, Module, ProcessModule,
};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// Lock-free module cache keyed by application id
#[derive(Debug, Default)]
pub struct ModuleCache {
    applications: ArcSwap<HashMap<Uuid, Arc<ApplicationModules>>>,
}

/// Modules of one application with their lookup indexes
#[derive(Debug, Default)]
pub struct ApplicationModules {
    /// Key: module id
    by_id: HashMap<Uuid, Arc<Module>>,
    /// Key: lowercase module name, first module with a given name wins
    by_name: HashMap<String, Uuid>,
}

impl ApplicationModules {
    /// Index an application's modules; a repeated id keeps the first module
    fn build(modules: Vec<Module>) -> Self {
        let mut indexed = Self::default();
        for module in modules {
            if indexed.by_id.contains_key(&module.id) {
                tracing::warn!(
                    "⚠️ Duplicate module id {} ('{}') in application {}, keeping the first",
                    module.id,
                    module.name,
                    module.application_id
                );
                continue;
            }
            warn_duplicate_sequences(&module);
            indexed.insert(Arc::new(module));
        }
        indexed
    }

    fn insert(&mut self, module: Arc<Module>) {
        self.by_name
            .entry(module.name.to_lowercase())
            .or_insert(module.id);
        self.by_id.insert(module.id, module);
    }

    fn rebuild_names(&mut self) {
        // Keep "first name wins" stable by walking in creation order
        let mut ordered: Vec<&Arc<Module>> = self.by_id.values().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut by_name = HashMap::new();
        for module in ordered {
            by_name.entry(module.name.to_lowercase()).or_insert(module.id);
        }
        self.by_name = by_name;
    }
}

fn warn_duplicate_sequences(module: &Module) {
    let Some(process) = module.as_process() else {
        return;
    };
    let duplicates = process.duplicate_sequences();
    if !duplicates.is_empty() {
        tracing::warn!(
            "⚠️ Process '{}' repeats step sequences {:?}, only the first of each runs",
            module.name,
            duplicates
        );
    }
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached modules of an application
    ///
    /// An empty module list still registers the application.
    pub fn load_application(&self, application_id: Uuid, modules: Vec<Module>) {
        let count = modules.len();
        let indexed = Arc::new(ApplicationModules::build(modules));

        self.applications.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(application_id, Arc::clone(&indexed));
            next
        });

        tracing::info!("📦 Loaded {} modules for application {}", count, application_id);
    }

    /// Evict every application
    pub fn clear(&self) {
        self.applications.store(Arc::new(HashMap::new()));
        tracing::info!("🧹 Cleared module cache");
    }

    /// Drop an application from the cache
    pub fn clear_application(&self, application_id: Uuid) -> bool {
        let mut removed = false;
        self.applications.rcu(|current| {
            let mut next = HashMap::clone(current);
            removed = next.remove(&application_id).is_some();
            next
        });

        if removed {
            tracing::info!("🗑️ Unloaded application {}", application_id);
        }
        removed
    }

    /// Insert or replace a single module of a loaded application
    ///
    /// Returns false if the application is not loaded.
    pub fn upsert_module(&self, module: Module) -> bool {
        let application_id = module.application_id;
        warn_duplicate_sequences(&module);
        let module = Arc::new(module);
        let mut applied = false;

        self.applications.rcu(|current| {
            let mut next = HashMap::clone(current);
            applied = match current.get(&application_id) {
                Some(existing) => {
                    let mut modules = ApplicationModules {
                        by_id: existing.by_id.clone(),
                        by_name: HashMap::new(),
                    };
                    modules.by_id.insert(module.id, Arc::clone(&module));
                    modules.rebuild_names();
                    next.insert(application_id, Arc::new(modules));
                    true
                }
                None => false,
            };
            next
        });

        applied
    }

    /// Remove a single module; returns whether it was cached
    pub fn remove_module(&self, application_id: Uuid, module_id: Uuid) -> bool {
        let mut removed = false;

        self.applications.rcu(|current| {
            let mut next = HashMap::clone(current);
            removed = false;
            if let Some(existing) = current.get(&application_id) {
                if existing.by_id.contains_key(&module_id) {
                    let mut modules = ApplicationModules {
                        by_id: existing.by_id.clone(),
                        by_name: HashMap::new(),
                    };
                    modules.by_id.remove(&module_id);
                    modules.rebuild_names();
                    next.insert(application_id, Arc::new(modules));
                    removed = true;
                }
            }
            next
        });

        removed
    }

    fn application(&self, application_id: Uuid) -> Option<Arc<ApplicationModules>> {
        self.applications.load().get(&application_id).cloned()
    }

    /// Get a module by id
    pub fn get_module(&self, application_id: Uuid, module_id: Uuid) -> Option<Arc<Module>> {
        self.application(application_id)?.by_id.get(&module_id).cloned()
    }

    /// Get a module by name (case-insensitive)
    pub fn get_module_by_name(&self, application_id: Uuid, name: &str) -> Option<Arc<Module>> {
        let application = self.application(application_id)?;
        let id = application.by_name.get(&name.to_lowercase())?;
        application.by_id.get(id).cloned()
    }

    /// All modules of an application, in no particular order
    pub fn modules(&self, application_id: Uuid) -> Vec<Arc<Module>> {
        self.application(application_id)
            .map(|application| application.by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn application_ids(&self) -> Vec<Uuid> {
        self.applications.load().keys().copied().collect()
    }

    pub fn has_application(&self, application_id: Uuid) -> bool {
        self.applications.load().contains_key(&application_id)
    }

    pub fn module_count(&self, application_id: Uuid) -> usize {
        self.application(application_id)
            .map(|application| application.by_id.len())
            .unwrap_or(0)
    }

    pub fn get_process(&self, application_id: Uuid, module_id: Uuid) -> Option<TypedModule<ProcessModule>> {
        TypedModule::from_module(self.get_module(application_id, module_id)?, Module::as_process)
    }

    pub fn get_field(&self, application_id: Uuid, module_id: Uuid) -> Option<TypedModule<FieldModule>> {
        TypedModule::from_module(self.get_module(application_id, module_id)?, Module::as_field)
    }

    pub fn get_dialog(&self, application_id: Uuid, module_id: Uuid) -> Option<TypedModule<DialogActionModule>> {
        TypedModule::from_module(self.get_module(application_id, module_id)?, Module::as_dialog)
    }

    pub fn get_database(&self, application_id: Uuid, module_id: Uuid) -> Option<TypedModule<DatabaseActionModule>> {
        TypedModule::from_module(self.get_module(application_id, module_id)?, Module::as_database)
    }

    pub fn get_compare(&self, application_id: Uuid, module_id: Uuid) -> Option<TypedModule<CompareActionModule>> {
        TypedModule::from_module(self.get_module(application_id, module_id)?, Module::as_compare)
    }

    pub fn get_calculate(&self, application_id: Uuid, module_id: Uuid) -> Option<TypedModule<CalculateActionModule>> {
        TypedModule::from_module(self.get_module(application_id, module_id)?, Module::as_calculate)
    }

    pub fn get_list(&self, application_id: Uuid, module_id: Uuid) -> Option<TypedModule<ListModule>> {
        TypedModule::from_module(self.get_module(application_id, module_id)?, Module::as_list)
    }

    /// Resolve a field module by name, ignoring non-field modules of that name
    pub fn get_field_by_name(&self, application_id: Uuid, name: &str) -> Option<TypedModule<FieldModule>> {
        TypedModule::from_module(self.get_module_by_name(application_id, name)?, Module::as_field)
    }
}

/// A cached module known to hold a specific variant
///
/// Keeps the shared `Arc<Module>` alive and hands out the variant payload.
#[derive(Debug, Clone)]
pub struct TypedModule<T> {
    module: Arc<Module>,
    project: fn(&Module) -> Option<&T>,
}

impl<T> TypedModule<T> {
    fn from_module(module: Arc<Module>, project: fn(&Module) -> Option<&T>) -> Option<Self> {
        project(&module)?;
        Some(Self { module, project })
    }

    /// The whole module (id, name, timestamps)
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn id(&self) -> Uuid {
        self.module.id
    }

    pub fn name(&self) -> &str {
        &self.module.name
    }
}

impl<T> std::ops::Deref for TypedModule<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match (self.project)(&self.module) {
            Some(payload) => payload,
            // from_module only builds a TypedModule when the projection matches
            None => unreachable!("typed module projection changed"),
        }
    }
}
