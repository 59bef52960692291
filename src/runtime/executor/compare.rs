/// Compare executor
///
/// Succeeds when the comparison holds and fails otherwise, which is what drives
/// pass/fail branching in the calling step.

use crate::definition::types::{CompareOperator, Operand};
use crate::error::EngineError;
use crate::runtime::executor::{ActionContext, ActionExecutor};
use crate::runtime::result::ActionResult;
use crate::runtime::session::ExecutionSession;
use crate::runtime::value::FieldValue;
use async_trait::async_trait;
use std::cmp::Ordering;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct CompareExecutor;

#[async_trait]
impl ActionExecutor for CompareExecutor {
    async fn execute(&self, ctx: ActionContext<'_>, session: &mut ExecutionSession, module_id: Uuid) -> ActionResult {
        let Some(compare) = ctx.engine.cache().get_compare(session.application_id(), module_id) else {
            return ActionResult::from_error(EngineError::NotFound(format!(
                "Compare action module {} not found",
                module_id
            )));
        };

        let (Some(left), Some(right)) = (
            resolve_operand(compare.input1.as_ref(), session),
            resolve_operand(compare.input2.as_ref(), session),
        ) else {
            return ActionResult::from_error(EngineError::Validation(format!(
                "Compare '{}' has a null operand",
                compare.name()
            )));
        };

        let (left, right) = (left.to_string(), right.to_string());
        if evaluate(compare.operator, &left, &right) {
            ActionResult::success(format!("'{}' {:?} '{}' is true", left, compare.operator, right))
        } else {
            ActionResult::fail(format!("'{}' {:?} '{}' is false", left, compare.operator, right))
        }
    }
}

/// Constant text or the field's current value; `None` for a null operand
pub(crate) fn resolve_operand(operand: Option<&Operand>, session: &ExecutionSession) -> Option<FieldValue> {
    match operand? {
        Operand::Constant(text) => Some(FieldValue::String(text.clone())),
        Operand::Field(field_id) => session.get_field_value(*field_id),
    }
}

fn evaluate(operator: CompareOperator, left: &str, right: &str) -> bool {
    let (left_folded, right_folded) = (left.to_lowercase(), right.to_lowercase());

    match operator {
        CompareOperator::Equals => left_folded == right_folded,
        CompareOperator::NotEquals => left_folded != right_folded,
        CompareOperator::Contains => left_folded.contains(&right_folded),
        CompareOperator::StartsWith => left_folded.starts_with(&right_folded),
        CompareOperator::EndsWith => left_folded.ends_with(&right_folded),
        CompareOperator::GreaterThan => order(left, right) == Ordering::Greater,
        CompareOperator::LessThan => order(left, right) == Ordering::Less,
        CompareOperator::GreaterThanOrEqual => order(left, right) != Ordering::Less,
        CompareOperator::LessThanOrEqual => order(left, right) != Ordering::Greater,
    }
}

/// Numeric order when both sides parse as numbers, else case-insensitive text order
fn order(left: &str, right: &str) -> Ordering {
    let numbers = (
        FieldValue::from(left).as_decimal(),
        FieldValue::from(right).as_decimal(),
    );
    match numbers {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => left.to_lowercase().cmp(&right.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_operators_ignore_case() {
        assert!(evaluate(CompareOperator::Contains, "HELLO WORLD", "world"));
        assert!(evaluate(CompareOperator::Equals, "Yes", "YES"));
        assert!(evaluate(CompareOperator::StartsWith, "Invoice-7", "invoice"));
        assert!(evaluate(CompareOperator::EndsWith, "report.PDF", ".pdf"));
        assert!(!evaluate(CompareOperator::NotEquals, "a", "A"));
    }

    #[test]
    fn test_ordering_prefers_numbers() {
        // Numerically 9 < 10, although "9" > "10" as text
        assert!(evaluate(CompareOperator::LessThan, "9", "10"));
        assert!(evaluate(CompareOperator::GreaterThanOrEqual, "10.0", "10"));
        assert!(evaluate(CompareOperator::GreaterThan, "b", "A"));
        assert!(evaluate(CompareOperator::LessThanOrEqual, "apple", "APPLE"));
    }
}
