/// `@FieldName` substitution
///
/// SQL mode renders each referenced field as a typed SQL literal and rejects
/// unknown names. Text mode (dialog content) renders display text and leaves
/// unknown tokens in place. Also binds RETURNS columns back into fields.

use crate::error::EngineError;
use crate::runtime::session::ExecutionSession;
use crate::runtime::value::FieldValue;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FIELD_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("Valid regex pattern"));

/// Replace `@Field` tokens with SQL literals of the fields' current values
pub fn substitute_sql(sql: &str, session: &ExecutionSession) -> Result<String, EngineError> {
    let app = session.application_id();
    let cache = session.module_cache();
    let mut rendered = String::with_capacity(sql.len());
    let mut last = 0;

    for captures in FIELD_TOKEN.captures_iter(sql) {
        let (Some(token), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let field = cache
            .get_field_by_name(app, name.as_str())
            .ok_or_else(|| EngineError::NotFound(format!("Field '@{}' not found", name.as_str())))?;

        rendered.push_str(&sql[last..token.start()]);
        match session.get_field_value(field.id()) {
            Some(value) => rendered.push_str(&value.to_sql_literal()),
            None => rendered.push_str("NULL"),
        }
        last = token.end();
    }

    rendered.push_str(&sql[last..]);
    Ok(rendered)
}

/// Replace `@Field` tokens with display text; unknown names are kept verbatim
pub fn substitute_text(text: &str, session: &ExecutionSession) -> String {
    let app = session.application_id();
    let cache = session.module_cache();

    FIELD_TOKEN
        .replace_all(text, |captures: &Captures<'_>| {
            cache
                .get_field_by_name(app, &captures[1])
                .and_then(|field| session.get_field_value(field.id()))
                .map(|value| value.to_string())
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

/// Bind the columns of a result row into RETURNS targets, positionally
///
/// Targets may be field modules (value coerced to the declared type when
/// possible) or list modules (text stored under the list id). A NULL column
/// clears the target's explicit value.
pub fn bind_returns(
    session: &mut ExecutionSession,
    targets: &[String],
    row: Vec<Option<FieldValue>>,
) -> Result<(), EngineError> {
    if targets.len() != row.len() {
        return Err(EngineError::Validation(format!(
            "RETURNS names {} fields but the result row has {} columns",
            targets.len(),
            row.len()
        )));
    }

    let app = session.application_id();
    let cache = std::sync::Arc::clone(session.module_cache());

    // Resolve every target before writing so a bad name leaves the session untouched
    let mut resolved = Vec::with_capacity(targets.len());
    for name in targets {
        let module = cache
            .get_module_by_name(app, name)
            .ok_or_else(|| EngineError::NotFound(format!("Return field '@{}' not found", name)))?;
        let declared = match (module.as_field(), module.as_list()) {
            (Some(field), _) => Some(field.field_type),
            (None, Some(_)) => None,
            (None, None) => {
                return Err(EngineError::Validation(format!(
                    "Return target '@{}' is neither a field nor a list",
                    name
                )))
            }
        };
        resolved.push((module.id, declared));
    }

    for ((target_id, declared), column) in resolved.into_iter().zip(row) {
        match column {
            None => {
                session.remove_field_value(target_id);
            }
            Some(value) => {
                let stored = match declared {
                    Some(field_type) => value.coerce_to(field_type).unwrap_or(value),
                    None => FieldValue::String(value.to_string()),
                };
                session.set_field_value(target_id, stored);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::types::{FieldModule, FieldType, ListModule, Module, ModuleKind};
    use crate::definition::ModuleCache;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    fn field(app: Uuid, name: &str, field_type: FieldType, default: Option<&str>) -> Module {
        Module::new(
            Uuid::new_v4(),
            app,
            name,
            ModuleKind::Field(FieldModule {
                field_type,
                default_value: default.map(str::to_string),
            }),
        )
    }

    fn session_with(modules: Vec<Module>) -> (ExecutionSession, Vec<Uuid>) {
        let app = modules.first().map(|m| m.application_id).unwrap_or_else(Uuid::new_v4);
        let ids = modules.iter().map(|m| m.id).collect();
        let cache = Arc::new(ModuleCache::new());
        cache.load_application(app, modules);
        (ExecutionSession::new("bob", app, Uuid::new_v4(), cache), ids)
    }

    #[test]
    fn test_sql_mode_escapes_and_formats() {
        let app = Uuid::new_v4();
        let (mut session, ids) = session_with(vec![
            field(app, "Customer", FieldType::String, None),
            field(app, "Qty", FieldType::Number, Some("3")),
            field(app, "Active", FieldType::Boolean, None),
        ]);
        session.set_field_value(ids[0], "O'Brien");
        session.set_field_value(ids[2], true);

        let sql = substitute_sql(
            "SELECT * FROM orders WHERE customer = @customer AND qty > @Qty AND active = @Active",
            &session,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM orders WHERE customer = 'O''Brien' AND qty > 3 AND active = 1"
        );
    }

    #[test]
    fn test_sql_mode_rejects_unknown_field() {
        let app = Uuid::new_v4();
        let (session, _) = session_with(vec![field(app, "Qty", FieldType::Number, None)]);

        let err = substitute_sql("SELECT @Missing", &session).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_text_mode_keeps_unknown_tokens() {
        let app = Uuid::new_v4();
        let (mut session, ids) = session_with(vec![field(app, "Name", FieldType::String, None)]);
        session.set_field_value(ids[0], "Ada");

        assert_eq!(
            substitute_text("Hello @Name, mail @Nobody", &session),
            "Hello Ada, mail @Nobody"
        );
    }

    #[test]
    fn test_bind_returns_coerces_and_clears() {
        let app = Uuid::new_v4();
        let list = Module::new(Uuid::new_v4(), app, "Orders", ModuleKind::List(ListModule { max_rows: Some(5) }));
        let (mut session, ids) = session_with(vec![
            field(app, "Total", FieldType::Number, None),
            field(app, "Note", FieldType::String, Some("none")),
            list,
        ]);
        session.set_field_value(ids[1], "old");

        bind_returns(
            &mut session,
            &["Total".to_string(), "Note".to_string(), "Orders".to_string()],
            vec![Some(FieldValue::from("42.5")), None, Some(FieldValue::from("[1,2]"))],
        )
        .unwrap();

        assert_eq!(session.get_field_value(ids[0]), Some(FieldValue::Number(Decimal::new(425, 1))));
        assert_eq!(session.get_field_value(ids[1]), Some(FieldValue::from("none")));
        assert_eq!(session.get_field_value(ids[2]), Some(FieldValue::from("[1,2]")));
    }

    #[test]
    fn test_bind_returns_count_mismatch() {
        let app = Uuid::new_v4();
        let (mut session, ids) = session_with(vec![field(app, "Total", FieldType::Number, None)]);

        let err = bind_returns(&mut session, &["Total".to_string()], vec![]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!session.has_field(ids[0]));
    }
}
