/// Database action executor
///
/// Parses the module's statement, picks a connection (CONNECT name, then the
/// session's current database, then DEFAULT), substitutes field literals into the
/// SQL, runs it and binds RETURNS columns from the first row. The connection
/// used is reported as the `connection` output parameter.

use crate::database::DEFAULT_CONNECTION;
use crate::error::EngineError;
use crate::runtime::executor::{ActionContext, ActionExecutor};
use crate::runtime::result::ActionResult;
use crate::runtime::session::ExecutionSession;
use crate::runtime::statement::DatabaseStatement;
use crate::runtime::substitution::{bind_returns, substitute_sql};
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseActionExecutor;

#[async_trait]
impl ActionExecutor for DatabaseActionExecutor {
    async fn execute(&self, ctx: ActionContext<'_>, session: &mut ExecutionSession, module_id: Uuid) -> ActionResult {
        let Some(action) = ctx.engine.cache().get_database(session.application_id(), module_id) else {
            return ActionResult::from_error(EngineError::NotFound(format!(
                "Database action module {} not found",
                module_id
            )));
        };

        match run_statement(ctx, session, &action.sql_statement).await {
            Ok((message, connection)) => ActionResult::success(message).with_output("connection", json!(connection)),
            Err(error) => {
                tracing::warn!("❌ Database action '{}' failed: {}", action.name(), error);
                ActionResult::fail_with(format!("Database action '{}' failed: {}", action.name(), error), error)
            }
        }
    }
}

async fn run_statement(
    ctx: ActionContext<'_>,
    session: &mut ExecutionSession,
    template: &str,
) -> Result<(String, String), EngineError> {
    let statement = DatabaseStatement::parse(template)?;
    let gateway = ctx.engine.gateway();

    let connection = match statement.connection.as_deref() {
        Some(name) if gateway.has_connection(name) => name.to_string(),
        Some(name) => {
            return Err(EngineError::NotFound(format!("Database connection '{}' not configured", name)));
        }
        None => session
            .current_database()
            .filter(|name| gateway.has_connection(name))
            .map(str::to_string)
            .or_else(|| gateway.has_connection(DEFAULT_CONNECTION).then(|| DEFAULT_CONNECTION.to_string()))
            .ok_or_else(|| EngineError::NotFound("No database connection configured".to_string()))?,
    };

    let sql = substitute_sql(&statement.sql, session)?;
    tracing::debug!("🗄️ Executing on '{}': {}", connection, sql);

    let row = gateway
        .query_first_row(&connection, &sql, ctx.cancel)
        .await
        .map_err(|error| match error {
            EngineError::Cancelled => EngineError::Cancelled,
            other => EngineError::Execution(other.to_string()),
        })?;

    if statement.connection.is_some() {
        session.set_current_database(connection.clone());
    }

    if statement.returns.is_empty() {
        return Ok((format!("Statement executed on '{}'", connection), connection));
    }

    let row = row.ok_or_else(|| {
        EngineError::Validation(format!(
            "RETURNS expects {} values but the query returned no rows",
            statement.returns.len()
        ))
    })?;
    bind_returns(session, &statement.returns, row)?;

    let message = format!(
        "Statement executed on '{}', {} fields returned",
        connection,
        statement.returns.len()
    );
    Ok((message, connection))
}
