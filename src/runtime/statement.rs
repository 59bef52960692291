/// Parser for the database action mini-language
///
/// Grammar (keywords case-insensitive):
/// `[STATEMENT(] [CONNECT <name>;] <sql> [)] [RETURNS(@f1, @f2, ...)] [;]`

use crate::error::EngineError;
use once_cell::sync::Lazy;
use regex::Regex;

static RETURNS_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)RETURNS\s*\(\s*(@[A-Za-z0-9_]+(?:\s*,\s*@[A-Za-z0-9_]+)*)\s*\)\s*;?\s*$")
        .expect("Valid regex pattern")
});

static STATEMENT_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^STATEMENT\s*\((.*)\)$").expect("Valid regex pattern"));

static CONNECT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*CONNECT\s+([A-Za-z0-9_]+)\s*(?:;|$)").expect("Valid regex pattern"));

/// A parsed database action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStatement {
    /// Connection named by CONNECT, if any
    pub connection: Option<String>,
    /// SQL with `@Field` tokens still in place
    pub sql: String,
    /// RETURNS targets without the `@`, in column order
    pub returns: Vec<String>,
}

impl DatabaseStatement {
    pub fn parse(template: &str) -> Result<Self, EngineError> {
        let mut body = trim_terminators(template).to_string();

        let mut returns = Vec::new();
        if let Some(captures) = RETURNS_CLAUSE.captures(&body) {
            let start = captures.get(0).map(|m| m.start()).unwrap_or(body.len());
            returns = captures[1]
                .split(',')
                .map(|name| name.trim().trim_start_matches('@').to_string())
                .collect();
            body.truncate(start);
        }

        let mut body = trim_terminators(&body).to_string();
        if let Some(captures) = STATEMENT_WRAPPER.captures(&body) {
            body = captures[1].to_string();
        }

        let mut connection = None;
        if let Some(captures) = CONNECT_PREFIX.captures(&body) {
            connection = Some(captures[1].to_string());
            let end = captures.get(0).map(|m| m.end()).unwrap_or(0);
            body = body[end..].to_string();
        }

        let sql = trim_terminators(&body).to_string();
        if sql.is_empty() {
            return Err(EngineError::Validation("Database action has no SQL statement".to_string()));
        }

        Ok(Self { connection, sql, returns })
    }
}

fn trim_terminators(text: &str) -> &str {
    text.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_grammar() {
        let parsed = DatabaseStatement::parse(
            "CONNECT ORDERS; SELECT name, total FROM customers WHERE id = @CustomerId; RETURNS(@Name, @Total)",
        )
        .unwrap();

        assert_eq!(parsed.connection.as_deref(), Some("ORDERS"));
        assert_eq!(parsed.sql, "SELECT name, total FROM customers WHERE id = @CustomerId");
        assert_eq!(parsed.returns, vec!["Name", "Total"]);
    }

    #[test]
    fn test_statement_wrapper_grammar() {
        let parsed = DatabaseStatement::parse(
            "statement(connect crm; UPDATE accounts SET status = @Status) returns ( @Rows );",
        )
        .unwrap();

        assert_eq!(parsed.connection.as_deref(), Some("crm"));
        assert_eq!(parsed.sql, "UPDATE accounts SET status = @Status");
        assert_eq!(parsed.returns, vec!["Rows"]);
    }

    #[test]
    fn test_plain_sql() {
        let parsed = DatabaseStatement::parse("  DELETE FROM audit WHERE age > 30 ; ").unwrap();
        assert_eq!(parsed.connection, None);
        assert_eq!(parsed.sql, "DELETE FROM audit WHERE age > 30");
        assert!(parsed.returns.is_empty());
    }

    #[test]
    fn test_empty_statement_is_rejected() {
        assert!(DatabaseStatement::parse("CONNECT MAIN;").is_err());
        assert!(DatabaseStatement::parse("   ").is_err());
    }
}
