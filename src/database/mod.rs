/// Named database connections for database actions
///
/// Connection strings are configured per name; pools are created lazily on first
/// use and cached. `postgres://` URLs get a native Postgres pool so NUMERIC and
/// TIMESTAMP columns decode; every other URL goes through the sqlx Any driver.
/// Every query is raced against the caller's cancellation token.

use crate::error::EngineError;
use crate::runtime::value::FieldValue;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{AnyPool, Column, Row};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Name of the connection used when neither CONNECT nor the session names one
pub const DEFAULT_CONNECTION: &str = "DEFAULT";

/// Executes the SQL of database actions
#[async_trait]
pub trait SqlGateway: Send + Sync {
    /// Whether a connection with this name is configured (case-insensitive)
    fn has_connection(&self, name: &str) -> bool;

    /// Run `sql` on the named connection and return the first row, if any
    ///
    /// Each column is `None` for SQL NULL.
    async fn query_first_row(
        &self,
        connection: &str,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Option<FieldValue>>>, EngineError>;
}

/// Driver family chosen from a connection URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    /// Anything the sqlx Any driver accepts (SQLite, MySQL)
    Any,
}

impl Backend {
    pub fn for_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Backend::Postgres,
            _ => Backend::Any,
        }
    }
}

#[derive(Debug, Clone)]
enum Pool {
    Postgres(PgPool),
    Any(AnyPool),
}

/// Lazy sqlx pools keyed by connection name
#[derive(Debug)]
pub struct ConnectionManager {
    /// Key: uppercase connection name, Value: connection URL
    connection_strings: HashMap<String, String>,
    pools: RwLock<HashMap<String, Pool>>,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(connection_strings: HashMap<String, String>, max_connections: u32, acquire_timeout: Duration) -> Self {
        sqlx::any::install_default_drivers();

        Self {
            connection_strings: connection_strings
                .into_iter()
                .map(|(name, url)| (name.to_uppercase(), url))
                .collect(),
            pools: RwLock::new(HashMap::new()),
            max_connections: max_connections.max(1),
            acquire_timeout,
        }
    }

    /// Configured connection names, sorted
    pub fn connection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connection_strings.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get or create the pool of a named connection
    async fn get_pool(&self, name: &str) -> Result<Pool, EngineError> {
        let key = name.to_uppercase();

        // Try read lock first (fast path for existing pools)
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(&key) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write().await;

        // Double-check pattern (another task might have created it)
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }

        let url = self
            .connection_strings
            .get(&key)
            .ok_or_else(|| EngineError::NotFound(format!("Database connection '{}' not configured", name)))?;

        let backend = Backend::for_url(url);
        tracing::info!("🗄️ Creating connection pool: {} ({:?})", key, backend);

        let pool = match backend {
            Backend::Postgres => Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(self.acquire_timeout)
                    .connect(url)
                    .await?,
            ),
            Backend::Any => Pool::Any(
                AnyPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(self.acquire_timeout)
                    .connect(url)
                    .await?,
            ),
        };

        pools.insert(key.clone(), pool.clone());

        tracing::info!("✅ Connection pool created: {}", key);

        Ok(pool)
    }

    /// Number of pools created so far
    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }
}

#[async_trait]
impl SqlGateway for ConnectionManager {
    fn has_connection(&self, name: &str) -> bool {
        self.connection_strings.contains_key(&name.to_uppercase())
    }

    async fn query_first_row(
        &self,
        connection: &str,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Option<FieldValue>>>, EngineError> {
        let query = async {
            let decoded = match self.get_pool(connection).await? {
                Pool::Postgres(pool) => {
                    let row = sqlx::query(sql).fetch_optional(&pool).await?;
                    row.as_ref().map(decode_pg_row).transpose()?
                }
                Pool::Any(pool) => {
                    let row = sqlx::query(sql).fetch_optional(&pool).await?;
                    row.as_ref().map(decode_any_row).transpose()?
                }
            };
            Ok::<_, EngineError>(decoded)
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::warn!("⛔ Query on '{}' cancelled", connection);
                Err(EngineError::Cancelled)
            }
            result = query => result,
        }
    }
}

/// Decode each column as text, integer, float or boolean, in that order
fn decode_any_row(row: &AnyRow) -> Result<Vec<Option<FieldValue>>, EngineError> {
    (0..row.columns().len()).map(|index| decode_any_column(row, index)).collect()
}

fn decode_any_column(row: &AnyRow, index: usize) -> Result<Option<FieldValue>, EngineError> {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value.map(FieldValue::String));
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Ok(value.map(FieldValue::from));
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return Ok(value.and_then(Decimal::from_f64).map(FieldValue::Number));
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return Ok(value.map(FieldValue::Boolean));
    }
    Err(EngineError::Database(format!("Unsupported column type at position {}", index)))
}

fn decode_pg_row(row: &PgRow) -> Result<Vec<Option<FieldValue>>, EngineError> {
    (0..row.columns().len()).map(|index| decode_pg_column(row, index)).collect()
}

/// Postgres checks column types strictly, so each candidate either fits or errors
fn decode_pg_column(row: &PgRow, index: usize) -> Result<Option<FieldValue>, EngineError> {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value.map(FieldValue::String));
    }
    if let Ok(value) = row.try_get::<Option<Decimal>, _>(index) {
        return Ok(value.map(FieldValue::Number));
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Ok(value.map(FieldValue::from));
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return Ok(value.map(FieldValue::from));
    }
    if let Ok(value) = row.try_get::<Option<i16>, _>(index) {
        return Ok(value.map(|number| FieldValue::from(i32::from(number))));
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return Ok(value.and_then(Decimal::from_f64).map(FieldValue::Number));
    }
    if let Ok(value) = row.try_get::<Option<f32>, _>(index) {
        return Ok(value.and_then(Decimal::from_f32).map(FieldValue::Number));
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return Ok(value.map(FieldValue::Boolean));
    }
    if let Ok(value) = row.try_get::<Option<NaiveDateTime>, _>(index) {
        return Ok(value.map(FieldValue::DateTime));
    }
    if let Ok(value) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return Ok(value.map(|at| FieldValue::DateTime(at.naive_utc())));
    }
    if let Ok(value) = row.try_get::<Option<NaiveDate>, _>(index) {
        return Ok(value
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(FieldValue::DateTime));
    }
    Err(EngineError::Database(format!(
        "Unsupported column type {} at position {}",
        row.columns()[index].type_info(),
        index
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_manager() -> ConnectionManager {
        let mut connections = HashMap::new();
        connections.insert("main".to_string(), "sqlite::memory:".to_string());
        // One connection: every connection to :memory: is a separate database
        ConnectionManager::new(connections, 1, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_first_row_decoding() {
        let manager = sqlite_manager();
        let cancel = CancellationToken::new();

        manager
            .query_first_row(
                "MAIN",
                "CREATE TABLE customers (name TEXT, credit INTEGER, rate REAL, note TEXT)",
                &cancel,
            )
            .await
            .unwrap();
        manager
            .query_first_row(
                "main",
                "INSERT INTO customers VALUES ('O''Brien', 42, 1.5, NULL)",
                &cancel,
            )
            .await
            .unwrap();

        let row = manager
            .query_first_row("Main", "SELECT name, credit, rate, note FROM customers", &cancel)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            row,
            vec![
                Some(FieldValue::from("O'Brien")),
                Some(FieldValue::from(42)),
                Some(FieldValue::Number(Decimal::new(15, 1))),
                None,
            ]
        );
        assert_eq!(manager.pool_count().await, 1);
    }

    #[test]
    fn test_backend_follows_url_scheme() {
        assert_eq!(Backend::for_url("postgres://user@db/orders"), Backend::Postgres);
        assert_eq!(Backend::for_url("PostgreSQL://user@db/orders"), Backend::Postgres);
        assert_eq!(Backend::for_url("sqlite::memory:"), Backend::Any);
        assert_eq!(Backend::for_url("mysql://user@db/orders"), Backend::Any);
    }

    #[test]
    fn test_connection_names_are_uppercased() {
        let mut connections = HashMap::new();
        connections.insert("reports".to_string(), "postgres://r@db/reports".to_string());
        connections.insert("Default".to_string(), "sqlite::memory:".to_string());
        let manager = ConnectionManager::new(connections, 1, Duration::from_secs(5));

        assert_eq!(manager.connection_names(), vec!["DEFAULT".to_string(), "REPORTS".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let manager = sqlite_manager();
        assert!(manager.has_connection("MAIN"));
        assert!(!manager.has_connection("reports"));

        let err = manager
            .query_first_row("reports", "SELECT 1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_query() {
        let manager = sqlite_manager();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager.query_first_row("main", "SELECT 1", &cancel).await.unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }
}
