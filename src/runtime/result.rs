/// Result of executing a single action
///
/// Business failures travel as `Outcome::Fail` with an optional cause; executors
/// never return `Err` to the interpreter.

use crate::error::EngineError;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Outcome {
    Success,
    Fail,
}

/// Outcome of an action plus its message and optional cause/output
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub outcome: Outcome,
    pub message: String,
    pub cause: Option<EngineError>,
    /// Output parameters keyed by name
    pub output: HashMap<String, Value>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            message: message.into(),
            cause: None,
            output: HashMap::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Fail,
            message: message.into(),
            cause: None,
            output: HashMap::new(),
        }
    }

    /// Fail with the error's display text as message
    pub fn from_error(error: EngineError) -> Self {
        Self {
            outcome: Outcome::Fail,
            message: error.to_string(),
            cause: Some(error),
            output: HashMap::new(),
        }
    }

    /// Fail with a custom message and an attached cause
    pub fn fail_with(message: impl Into<String>, cause: EngineError) -> Self {
        Self {
            outcome: Outcome::Fail,
            message: message.into(),
            cause: Some(cause),
            output: HashMap::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_parameters_accumulate() {
        let result = ActionResult::success("done")
            .with_output("connection", json!("REPORTS"))
            .with_output("rows", json!(1));

        assert!(result.is_success());
        assert_eq!(result.output["connection"], "REPORTS");
        assert_eq!(result.output.len(), 2);
    }

    #[test]
    fn test_from_error_keeps_cause() {
        let result = ActionResult::from_error(EngineError::Execution("boom".to_string()));
        assert_eq!(result.outcome, Outcome::Fail);
        assert_eq!(result.message, "Execution failed: boom");
        assert_eq!(result.cause, Some(EngineError::Execution("boom".to_string())));
    }
}
