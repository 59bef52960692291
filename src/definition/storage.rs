/// Definition repository: where applications and modules come from
///
/// The engine only needs two reads (activatable applications, modules of one
/// application). The SQLite implementation stores each definition as a JSON
/// document with indexed lookup columns; the in-memory one backs tests and demos.

use crate::definition::types::{Application, Module};
use crate::error::EngineError;
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Source of application and module definitions
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Applications to load; `activate_on_start = true` returns only flagged ones
    async fn load_applications(&self, activate_on_start: bool) -> Result<Vec<Application>, EngineError>;

    /// Every module of an application, with step and calculation details included
    async fn load_modules(&self, application_id: Uuid) -> Result<Vec<Module>, EngineError>;
}

/// Definition repository held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryDefinitionRepository {
    applications: RwLock<HashMap<Uuid, Application>>,
    /// Key: application id, modules kept in insertion order
    modules: RwLock<HashMap<Uuid, Vec<Module>>>,
}

impl InMemoryDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_application(&self, application: Application) {
        self.applications.write().await.insert(application.id, application);
    }

    /// Insert or replace a module, keeping the position of a replaced one
    pub async fn save_module(&self, module: Module) {
        let mut modules = self.modules.write().await;
        let entries = modules.entry(module.application_id).or_default();
        match entries.iter_mut().find(|existing| existing.id == module.id) {
            Some(existing) => *existing = module,
            None => entries.push(module),
        }
    }

    pub async fn delete_module(&self, application_id: Uuid, module_id: Uuid) -> bool {
        let mut modules = self.modules.write().await;
        match modules.get_mut(&application_id) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|module| module.id != module_id);
                entries.len() != before
            }
            None => false,
        }
    }
}

#[async_trait]
impl DefinitionRepository for InMemoryDefinitionRepository {
    async fn load_applications(&self, activate_on_start: bool) -> Result<Vec<Application>, EngineError> {
        let applications = self.applications.read().await;
        let mut selected: Vec<Application> = applications
            .values()
            .filter(|application| !activate_on_start || application.activate_on_start)
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(selected)
    }

    async fn load_modules(&self, application_id: Uuid) -> Result<Vec<Module>, EngineError> {
        Ok(self
            .modules
            .read()
            .await
            .get(&application_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// SQLite-based definition storage
///
/// Definitions are stored as JSON; `applications.activate_on_start` and
/// `modules.application_id` are real columns so the two engine reads are indexed.
#[derive(Debug, Clone)]
pub struct SqliteDefinitionRepository {
    pool: SqlitePool,
}

impl SqliteDefinitionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the definition tables. Safe to call multiple times.
    pub async fn init_schema(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                activate_on_start INTEGER NOT NULL DEFAULT 0,
                definition JSON NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS modules (
                id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                name TEXT NOT NULL,
                module_type TEXT NOT NULL,
                definition JSON NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (application_id, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_applications_activate ON applications(activate_on_start)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Store a new application or update an existing one
    pub async fn save_application(&self, application: &Application) -> Result<(), EngineError> {
        let definition_json = serde_json::to_string(application)?;

        sqlx::query(
            r#"
            INSERT INTO applications (id, name, activate_on_start, definition, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                activate_on_start = excluded.activate_on_start,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(application.id.to_string())
        .bind(&application.name)
        .bind(application.activate_on_start)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new module or update an existing one
    pub async fn save_module(&self, module: &Module) -> Result<(), EngineError> {
        let definition_json = serde_json::to_string(module)?;

        sqlx::query(
            r#"
            INSERT INTO modules (id, application_id, name, module_type, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(application_id, id) DO UPDATE SET
                name = excluded.name,
                module_type = excluded.module_type,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(module.id.to_string())
        .bind(module.application_id.to_string())
        .bind(&module.name)
        .bind(format!("{:?}", module.module_type()))
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_module(&self, application_id: Uuid, module_id: Uuid) -> Result<bool, EngineError> {
        let result = sqlx::query("DELETE FROM modules WHERE application_id = ? AND id = ?")
            .bind(application_id.to_string())
            .bind(module_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DefinitionRepository for SqliteDefinitionRepository {
    async fn load_applications(&self, activate_on_start: bool) -> Result<Vec<Application>, EngineError> {
        let rows = if activate_on_start {
            sqlx::query("SELECT definition FROM applications WHERE activate_on_start = 1 ORDER BY name")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT definition FROM applications ORDER BY name")
                .fetch_all(&self.pool)
                .await?
        };

        let mut applications = Vec::with_capacity(rows.len());
        for row in rows {
            let definition_json: String = row.try_get("definition")?;
            applications.push(serde_json::from_str(&definition_json)?);
        }

        Ok(applications)
    }

    async fn load_modules(&self, application_id: Uuid) -> Result<Vec<Module>, EngineError> {
        let rows = sqlx::query("SELECT definition FROM modules WHERE application_id = ? ORDER BY rowid")
            .bind(application_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut modules = Vec::with_capacity(rows.len());
        for row in rows {
            let definition_json: String = row.try_get("definition")?;
            modules.push(serde_json::from_str(&definition_json)?);
        }

        tracing::debug!("📥 Loaded {} module definitions for application {}", modules.len(), application_id);

        Ok(modules)
    }
}
