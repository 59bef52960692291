/// Process module executor: the step interpreter
///
/// Walks a process's steps by sequence number, dispatching each action through
/// the registry and branching on pass/fail labels. Frames are pushed on entry and
/// popped on every exit except a dialog pause, which leaves the frame in place
/// for the next resume.

use crate::definition::cache::TypedModule;
use crate::definition::types::{ActionType, ProcessModule, ProcessModuleDetail};
use crate::error::EngineError;
use crate::runtime::executor::{ActionContext, ActionExecutor};
use crate::runtime::result::{ActionResult, Outcome};
use crate::runtime::session::{ExecutionFrame, ExecutionSession, Reentry};
use async_trait::async_trait;
use uuid::Uuid;

/// First step of a freshly entered process
const FIRST_SEQUENCE: i32 = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessModuleExecutor;

/// Where to go after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStep {
    Sequence(i32),
    End,
}

#[async_trait]
impl ActionExecutor for ProcessModuleExecutor {
    async fn execute(&self, ctx: ActionContext<'_>, session: &mut ExecutionSession, module_id: Uuid) -> ActionResult {
        let Some(process) = ctx.engine.cache().get_process(session.application_id(), module_id) else {
            return ActionResult::from_error(EngineError::NotFound(format!("Process module {} not found", module_id)));
        };

        let (frame_index, start_sequence) = match session.reenter(module_id) {
            Reentry::Fresh => {
                let max_depth = ctx.engine.limits().max_call_depth;
                if session.call_depth() >= max_depth {
                    tracing::warn!("🛑 Call depth {} reached entering '{}'", max_depth, process.name());
                    return ActionResult::from_error(EngineError::ResourceLimit(format!(
                        "Max call depth ({}) exceeded",
                        max_depth
                    )));
                }
                let index = session.push_frame(ExecutionFrame::new(module_id, process.name(), FIRST_SEQUENCE));
                (index, FIRST_SEQUENCE)
            }
            Reentry::Continue { frame_index, sequence } => {
                tracing::debug!("▶️ Resuming '{}' at step {}", process.name(), sequence);
                (frame_index, sequence)
            }
            Reentry::Replay { frame_index, sequence } => {
                tracing::debug!("↪️ Re-entering '{}' through step {}", process.name(), sequence);
                (frame_index, sequence)
            }
            Reentry::Mismatch => {
                return ActionResult::from_error(EngineError::State(format!(
                    "Paused call stack does not match process '{}'",
                    process.name()
                )));
            }
        };

        match self.run_steps(ctx, session, &process, frame_index, start_sequence).await {
            Ok(result) => result,
            Err(error) => {
                session.unwind_to(frame_index);
                ActionResult::fail_with(
                    format!("Process Module '{}' execution failed: {}", process.name(), error),
                    error,
                )
            }
        }
    }
}

impl ProcessModuleExecutor {
    /// Interpreter loop for one process invocation
    ///
    /// Every `Ok` exit except a pause has already popped the frame; an `Err`
    /// leaves unwinding to the caller.
    async fn run_steps(
        &self,
        ctx: ActionContext<'_>,
        session: &mut ExecutionSession,
        process: &TypedModule<ProcessModule>,
        frame_index: usize,
        start_sequence: i32,
    ) -> Result<ActionResult, EngineError> {
        let max_iterations = ctx.engine.limits().max_iterations;
        let mut current = start_sequence;

        for _ in 0..max_iterations {
            if ctx.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let Some(step) = process.step(current) else {
                session.unwind_to(frame_index);
                return Ok(ActionResult::from_error(EngineError::NotFound(format!(
                    "Step with sequence {} not found in process '{}'",
                    current,
                    process.name()
                ))));
            };

            let frame = session
                .frame_mut(frame_index)
                .ok_or_else(|| EngineError::State(format!("Frame of process '{}' was lost", process.name())))?;
            frame.current_sequence = current;

            if step.commented {
                current += 1;
                continue;
            }

            match step.action_type {
                Some(ActionType::ReturnPass) => {
                    session.unwind_to(frame_index);
                    return Ok(ActionResult::success(format!(
                        "Process '{}' completed successfully",
                        process.name()
                    )));
                }
                Some(ActionType::ReturnFail) => {
                    session.unwind_to(frame_index);
                    return Ok(ActionResult::fail(format!("Process '{}' failed", process.name())));
                }
                _ => {}
            }

            tracing::debug!("🔄 '{}' step {} ({:?})", process.name(), current, step.action_type);

            let result = self.execute_step(ctx, session, step).await;

            if session.is_paused() {
                return Ok(result);
            }

            let label = match result.outcome {
                Outcome::Success => step.pass_label.as_deref(),
                Outcome::Fail => step.fail_label.as_deref(),
            };

            match resolve_next(process, current, label) {
                NextStep::Sequence(next) => current = next,
                NextStep::End => {
                    session.unwind_to(frame_index);
                    return Ok(result);
                }
            }
        }

        session.unwind_to(frame_index);
        Ok(ActionResult::from_error(EngineError::ResourceLimit(format!(
            "Maximum iteration limit ({}) reached in process '{}'",
            max_iterations,
            process.name()
        ))))
    }

    /// Dispatch one step's action; malformed steps fail without dispatching
    async fn execute_step(
        &self,
        ctx: ActionContext<'_>,
        session: &mut ExecutionSession,
        step: &ProcessModuleDetail,
    ) -> ActionResult {
        let Some(action_type) = step.action_type else {
            return ActionResult::from_error(EngineError::Validation(format!(
                "Step at sequence {} has no action type",
                step.sequence
            )));
        };

        let Some(module_id) = step.module_id else {
            return ActionResult::from_error(EngineError::Validation(format!(
                "Step at sequence {} with action {:?} has no module ID",
                step.sequence, action_type
            )));
        };

        match ctx.engine.registry().get(action_type) {
            Ok(executor) => executor.execute(ctx, session, module_id).await,
            Err(error) => ActionResult::from_error(error),
        }
    }
}

/// Resolve the next sequence from a branch label
///
/// Empty and NEXT advance by one, PREV steps back by one, anything else jumps
/// to the step declaring that label; an unknown label ends the process.
fn resolve_next(process: &ProcessModule, current: i32, label: Option<&str>) -> NextStep {
    let label = label.map(str::trim).unwrap_or_default();

    if label.is_empty() || label.eq_ignore_ascii_case("NEXT") {
        NextStep::Sequence(current + 1)
    } else if label.eq_ignore_ascii_case("PREV") {
        NextStep::Sequence(current - 1)
    } else {
        process
            .sequence_of_label(label)
            .map(NextStep::Sequence)
            .unwrap_or(NextStep::End)
    }
}
