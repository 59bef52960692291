/// Calculate executor
///
/// Applies each calculation in sequence order and writes its result field.
/// Arithmetic treats non-numeric operands as zero; division or modulus by zero
/// fails the whole action, leaving earlier calculations applied.

use crate::definition::types::{CalculateModuleDetail, CalculateOperator};
use crate::error::EngineError;
use crate::runtime::executor::compare::resolve_operand;
use crate::runtime::executor::{ActionContext, ActionExecutor};
use crate::runtime::result::ActionResult;
use crate::runtime::session::ExecutionSession;
use crate::runtime::value::FieldValue;
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct CalculateExecutor;

#[async_trait]
impl ActionExecutor for CalculateExecutor {
    async fn execute(&self, ctx: ActionContext<'_>, session: &mut ExecutionSession, module_id: Uuid) -> ActionResult {
        let Some(calculate) = ctx.engine.cache().get_calculate(session.application_id(), module_id) else {
            return ActionResult::from_error(EngineError::NotFound(format!(
                "Calculate action module {} not found",
                module_id
            )));
        };

        let mut details: Vec<&CalculateModuleDetail> = calculate.details.iter().collect();
        details.sort_by_key(|detail| detail.sequence);

        for detail in details {
            if let Err(error) = apply(detail, session) {
                return ActionResult::fail_with(
                    format!("Calculations Execution Failed: {}", error),
                    error,
                );
            }
        }

        ActionResult::success("Calculations completed")
    }
}

fn apply(detail: &CalculateModuleDetail, session: &mut ExecutionSession) -> Result<(), EngineError> {
    let input1 = resolve_operand(detail.input1.as_ref(), session);
    let input2 = resolve_operand(detail.input2.as_ref(), session);

    let result = match detail.operator {
        CalculateOperator::Clear => {
            session.remove_field_value(detail.result_field_id);
            return Ok(());
        }
        CalculateOperator::Assign => match input1 {
            Some(value) => match session.field_type(detail.result_field_id) {
                Some(field_type) => value.coerce_to(field_type).unwrap_or(value),
                None => value,
            },
            None => {
                session.remove_field_value(detail.result_field_id);
                return Ok(());
            }
        },
        CalculateOperator::Concatenate => FieldValue::String(format!(
            "{}{}",
            input1.map(|value| value.to_string()).unwrap_or_default(),
            input2.map(|value| value.to_string()).unwrap_or_default()
        )),
        operator => {
            let (left, right) = (numeric(input1.as_ref()), numeric(input2.as_ref()));
            FieldValue::Number(arithmetic(operator, left, right)?)
        }
    };

    session.set_field_value(detail.result_field_id, result);
    Ok(())
}

fn numeric(value: Option<&FieldValue>) -> Decimal {
    value.and_then(FieldValue::as_decimal).unwrap_or(Decimal::ZERO)
}

fn arithmetic(operator: CalculateOperator, left: Decimal, right: Decimal) -> Result<Decimal, EngineError> {
    let computed = match operator {
        CalculateOperator::Add => left.checked_add(right),
        CalculateOperator::Subtract => left.checked_sub(right),
        CalculateOperator::Multiply => left.checked_mul(right),
        CalculateOperator::Divide | CalculateOperator::Modulus if right.is_zero() => {
            return Err(EngineError::Execution("Cannot divide by zero".to_string()));
        }
        CalculateOperator::Divide => left.checked_div(right),
        CalculateOperator::Modulus => left.checked_rem(right),
        other => {
            return Err(EngineError::Execution(format!("Unknown operator: {:?}", other)));
        }
    };

    computed.ok_or_else(|| EngineError::Execution(format!("Arithmetic overflow in {:?}", operator)))
}
