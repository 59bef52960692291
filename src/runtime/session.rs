/// Resumable execution state of one user's workflow
///
/// A session owns the call stack, the field values and the pause marker. It has
/// no internal locking: the session manager guarantees a single in-flight
/// start/resume per session by holding the session's mutex for the whole run.

use crate::definition::{cache::TypedModule, types::FieldModule, types::FieldType, ModuleCache};
use crate::error::EngineError;
use crate::runtime::engine::ExecutionEngine;
use crate::runtime::result::ActionResult;
use crate::runtime::value::{FieldValue, FromFieldValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One activation record of a process call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFrame {
    pub process_id: Uuid,
    pub process_name: String,
    /// Sequence of the step being executed in this frame
    pub current_sequence: i32,
    pub entered_at: DateTime<Utc>,
}

impl ExecutionFrame {
    pub fn new(process_id: Uuid, process_name: impl Into<String>, current_sequence: i32) -> Self {
        Self {
            process_id,
            process_name: process_name.into(),
            current_sequence,
            entered_at: Utc::now(),
        }
    }
}

/// Where a suspended session resumes, plus the screen it is waiting on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseMarker {
    pub process_id: Uuid,
    /// Step that paused; execution resumes at `step + 1`
    pub step: i32,
    pub screen: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    Paused,
}

/// How a process invocation enters its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reentry {
    /// Normal call: push a new frame
    Fresh,
    /// Innermost paused frame: continue after the pausing step
    Continue { frame_index: usize, sequence: i32 },
    /// Outer frame of a paused stack: replay the call step that led inward
    Replay { frame_index: usize, sequence: i32 },
    /// Stack no longer matches the definitions being resumed
    Mismatch,
}

/// Resumable program state of one user
#[derive(Debug, Clone)]
pub struct ExecutionSession {
    session_id: Uuid,
    user_id: String,
    start_time: DateTime<Utc>,
    last_active: DateTime<Utc>,
    application_id: Uuid,
    root_process_id: Uuid,
    /// Top of the stack is the innermost call
    call_stack: Vec<ExecutionFrame>,
    /// Key: field module id (or list module id for list data)
    field_values: HashMap<Uuid, FieldValue>,
    pause: Option<PauseMarker>,
    current_database: Option<String>,
    /// Next frame to re-enter while replaying a paused stack
    resume_cursor: Option<usize>,
    cache: Arc<ModuleCache>,
}

impl ExecutionSession {
    pub fn new(
        user_id: impl Into<String>,
        application_id: Uuid,
        root_process_id: Uuid,
        cache: Arc<ModuleCache>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            start_time: now,
            last_active: now,
            application_id,
            root_process_id,
            call_stack: Vec::new(),
            field_values: HashMap::new(),
            pause: None,
            current_database: None,
            resume_cursor: None,
            cache,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn application_id(&self) -> Uuid {
        self.application_id
    }

    pub fn root_process_id(&self) -> Uuid {
        self.root_process_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn module_cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Mark the session as used now
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    #[cfg(test)]
    pub(crate) fn set_last_active(&mut self, at: DateTime<Utc>) {
        self.last_active = at;
    }

    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    pub fn set_current_database(&mut self, name: impl Into<String>) {
        self.current_database = Some(name.into());
    }

    // ---- Lifecycle ----

    /// Run the root process, or continue it when paused
    pub async fn start(&mut self, engine: &ExecutionEngine, cancel: &CancellationToken) -> ActionResult {
        engine.run(self, cancel).await
    }

    /// Drop any paused state and run the root process from its first step
    pub async fn restart(&mut self, engine: &ExecutionEngine, cancel: &CancellationToken) -> ActionResult {
        self.reset_execution();
        engine.run(self, cancel).await
    }

    pub fn state(&self) -> SessionState {
        if self.pause.is_some() {
            SessionState::Paused
        } else {
            SessionState::Active
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_some()
    }

    pub fn can_resume(&self) -> bool {
        self.pause.is_some() && !self.call_stack.is_empty()
    }

    pub fn pause_marker(&self) -> Option<&PauseMarker> {
        self.pause.as_ref()
    }

    pub fn paused_at_step(&self) -> Option<i32> {
        self.pause.as_ref().map(|marker| marker.step)
    }

    pub fn paused_process_id(&self) -> Option<Uuid> {
        self.pause.as_ref().map(|marker| marker.process_id)
    }

    pub fn screen(&self) -> Option<&Value> {
        self.pause.as_ref().map(|marker| &marker.screen)
    }

    /// Suspend at `step` of `process_id`, which must own the top frame
    pub fn pause(&mut self, process_id: Uuid, step: i32, screen: Value) -> Result<(), EngineError> {
        match self.call_stack.last() {
            Some(frame) if frame.process_id == process_id => {
                self.pause = Some(PauseMarker { process_id, step, screen });
                Ok(())
            }
            Some(frame) => Err(EngineError::State(format!(
                "Cannot pause process {}: top frame belongs to {}",
                process_id, frame.process_id
            ))),
            None => Err(EngineError::State("No execution frame on stack - cannot pause".to_string())),
        }
    }

    /// Clear the pause marker; the call stack is left untouched
    pub fn resume(&mut self) {
        self.pause = None;
    }

    /// Prepare the stack for an interpreter run from the root process
    pub(crate) fn prepare_run(&mut self) {
        if self.is_paused() {
            self.resume_cursor = Some(0);
        } else {
            self.call_stack.clear();
            self.resume_cursor = None;
        }
    }

    pub(crate) fn finish_run(&mut self) {
        self.resume_cursor = None;
    }

    fn reset_execution(&mut self) {
        self.call_stack.clear();
        self.pause = None;
        self.resume_cursor = None;
    }

    /// Decide how an invocation of `process_id` enters its frame
    pub(crate) fn reenter(&mut self, process_id: Uuid) -> Reentry {
        let Some(cursor) = self.resume_cursor else {
            return Reentry::Fresh;
        };

        let frame_matches = self
            .call_stack
            .get(cursor)
            .is_some_and(|frame| frame.process_id == process_id);
        if !frame_matches {
            self.reset_execution();
            return Reentry::Mismatch;
        }

        if cursor + 1 < self.call_stack.len() {
            self.resume_cursor = Some(cursor + 1);
            return Reentry::Replay {
                frame_index: cursor,
                sequence: self.call_stack[cursor].current_sequence,
            };
        }

        match self.pause.take() {
            Some(marker) if marker.process_id == process_id => {
                self.resume_cursor = None;
                Reentry::Continue {
                    frame_index: cursor,
                    sequence: marker.step + 1,
                }
            }
            _ => {
                self.reset_execution();
                Reentry::Mismatch
            }
        }
    }

    // ---- Call stack ----

    /// Push a frame and return its index
    pub fn push_frame(&mut self, frame: ExecutionFrame) -> usize {
        self.call_stack.push(frame);
        self.call_stack.len() - 1
    }

    pub fn pop_frame(&mut self) -> Option<ExecutionFrame> {
        self.call_stack.pop()
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn current_frame(&self) -> Option<&ExecutionFrame> {
        self.call_stack.last()
    }

    pub fn call_stack(&self) -> &[ExecutionFrame] {
        &self.call_stack
    }

    pub(crate) fn frame_mut(&mut self, index: usize) -> Option<&mut ExecutionFrame> {
        self.call_stack.get_mut(index)
    }

    /// Pop the frame at `index` and everything above it
    pub(crate) fn unwind_to(&mut self, index: usize) {
        self.call_stack.truncate(index);
    }

    // ---- Field values ----

    /// Field module definition for an id, if the id names a field
    pub fn field_module(&self, field_id: Uuid) -> Option<TypedModule<FieldModule>> {
        self.cache.get_field(self.application_id, field_id)
    }

    pub fn field_type(&self, field_id: Uuid) -> Option<FieldType> {
        self.field_module(field_id).map(|field| field.field_type)
    }

    /// Explicit value, else the parsed module default, else the type's zero value
    ///
    /// Returns `None` only when nothing is stored and the id is not a field module.
    pub fn get_field_value(&self, field_id: Uuid) -> Option<FieldValue> {
        if let Some(value) = self.field_values.get(&field_id) {
            return Some(value.clone());
        }
        let field = self.field_module(field_id)?;
        Some(default_value(&field))
    }

    /// Typed read that falls back to `T::default()` on any failure
    pub fn get_field_value_as<T: FromFieldValue + Default>(&self, field_id: Uuid) -> T {
        self.try_get_field_value_as(field_id).unwrap_or_default()
    }

    /// Typed read that reports why a conversion failed
    pub fn try_get_field_value_as<T: FromFieldValue>(&self, field_id: Uuid) -> Result<T, EngineError> {
        let value = self
            .get_field_value(field_id)
            .ok_or_else(|| EngineError::NotFound(format!("Field {} not found", field_id)))?;
        T::from_field_value(&value)
    }

    /// Store a value without checking the declared type
    pub fn set_field_value(&mut self, field_id: Uuid, value: impl Into<FieldValue>) {
        self.field_values.insert(field_id, value.into());
    }

    /// Store a value only if it matches the field's declared type
    pub fn try_set_field_value(&mut self, field_id: Uuid, value: FieldValue) -> Result<(), EngineError> {
        let field = self
            .field_module(field_id)
            .ok_or_else(|| EngineError::NotFound(format!("Field {} not found", field_id)))?;

        if value.field_type() != field.field_type {
            return Err(EngineError::Validation(format!(
                "Field '{}' expects {:?} but got {:?}",
                field.name(),
                field.field_type,
                value.field_type()
            )));
        }

        self.field_values.insert(field_id, value);
        Ok(())
    }

    /// Parse user-entered text per the field's declared type and store it
    ///
    /// Leaves the session unchanged on error.
    pub fn set_field_from_text(&mut self, field_id: Uuid, text: &str) -> Result<(), EngineError> {
        let field_type = self
            .field_type(field_id)
            .ok_or_else(|| EngineError::NotFound(format!("Field {} not found", field_id)))?;
        let value = FieldValue::parse_as(text, field_type)?;
        self.field_values.insert(field_id, value);
        Ok(())
    }

    pub fn remove_field_value(&mut self, field_id: Uuid) -> Option<FieldValue> {
        self.field_values.remove(&field_id)
    }

    /// Whether a value was explicitly stored
    pub fn has_field(&self, field_id: Uuid) -> bool {
        self.field_values.contains_key(&field_id)
    }

    /// Whether a value is stored or the field declares a default
    pub fn has_field_value(&self, field_id: Uuid) -> bool {
        self.has_field(field_id)
            || self
                .field_module(field_id)
                .is_some_and(|field| field.default_value.as_deref().is_some_and(|text| !text.is_empty()))
    }

    pub fn clear_fields(&mut self) {
        self.field_values.clear();
    }

    pub fn field_values(&self) -> &HashMap<Uuid, FieldValue> {
        &self.field_values
    }

    /// Serializable view for status calls
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            user_id: self.user_id.clone(),
            application_id: self.application_id,
            root_process_id: self.root_process_id,
            state: self.state(),
            start_time: self.start_time,
            last_active: self.last_active,
            call_depth: self.call_stack.len(),
            call_stack: self.call_stack.clone(),
            paused_process_id: self.paused_process_id(),
            paused_at_step: self.paused_at_step(),
            screen: self.screen().cloned(),
            current_database: self.current_database.clone(),
            field_values: self.field_values.clone(),
        }
    }
}

fn default_value(field: &FieldModule) -> FieldValue {
    field
        .default_value
        .as_deref()
        .and_then(|text| FieldValue::parse_as(text, field.field_type).ok())
        .unwrap_or_else(|| FieldValue::zero(field.field_type))
}

/// Point-in-time copy of a session's observable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub user_id: String,
    pub application_id: Uuid,
    pub root_process_id: Uuid,
    pub state: SessionState,
    pub start_time: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub call_depth: usize,
    pub call_stack: Vec<ExecutionFrame>,
    pub paused_process_id: Option<Uuid>,
    pub paused_at_step: Option<i32>,
    pub screen: Option<Value>,
    pub current_database: Option<String>,
    pub field_values: HashMap<Uuid, FieldValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::types::{Module, ModuleKind};
    use rust_decimal::Decimal;
    use serde_json::json;

    struct Fixture {
        cache: Arc<ModuleCache>,
        app: Uuid,
        qty: Uuid,
        name: Uuid,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(ModuleCache::new());
        let app = Uuid::new_v4();
        let qty = Uuid::new_v4();
        let name = Uuid::new_v4();
        cache.load_application(
            app,
            vec![
                Module::new(
                    qty,
                    app,
                    "Qty",
                    ModuleKind::Field(FieldModule {
                        field_type: FieldType::Number,
                        default_value: Some("10".to_string()),
                    }),
                ),
                Module::new(
                    name,
                    app,
                    "Name",
                    ModuleKind::Field(FieldModule { field_type: FieldType::String, default_value: None }),
                ),
            ],
        );
        Fixture { cache, app, qty, name }
    }

    fn session(f: &Fixture) -> ExecutionSession {
        ExecutionSession::new("alice", f.app, Uuid::new_v4(), Arc::clone(&f.cache))
    }

    #[test]
    fn test_field_default_then_explicit_value() {
        let f = fixture();
        let mut session = session(&f);

        assert_eq!(session.get_field_value(f.qty), Some(FieldValue::from(10)));
        assert!(!session.has_field(f.qty));
        assert!(session.has_field_value(f.qty));

        session.set_field_value(f.qty, 25);
        assert_eq!(session.get_field_value(f.qty), Some(FieldValue::from(25)));

        session.remove_field_value(f.qty);
        assert_eq!(session.get_field_value(f.qty), Some(FieldValue::from(10)));
    }

    #[test]
    fn test_clear_fields_restores_defaults() {
        let f = fixture();
        let mut session = session(&f);
        session.set_field_value(f.qty, 3);
        session.set_field_value(f.name, "Bob");

        session.clear_fields();
        assert!(session.field_values().is_empty());
        assert_eq!(session.get_field_value(f.qty), Some(FieldValue::from(10)));
        assert_eq!(session.get_field_value(f.name), Some(FieldValue::from("")));
    }

    #[test]
    fn test_zero_value_and_unknown_ids() {
        let f = fixture();
        let session = session(&f);

        assert_eq!(session.get_field_value(f.name), Some(FieldValue::from("")));
        assert!(!session.has_field_value(f.name));
        assert_eq!(session.get_field_value(Uuid::new_v4()), None);
    }

    #[test]
    fn test_try_set_rejects_type_mismatch() {
        let f = fixture();
        let mut session = session(&f);

        let err = session.try_set_field_value(f.qty, FieldValue::from("many")).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!session.has_field(f.qty));

        session.try_set_field_value(f.qty, FieldValue::from(3)).unwrap();
        assert_eq!(session.get_field_value_as::<i64>(f.qty), 3);

        let missing = session.try_set_field_value(Uuid::new_v4(), FieldValue::from(1));
        assert!(matches!(missing, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_get_as_degrades_silently() {
        let f = fixture();
        let mut session = session(&f);
        session.set_field_value(f.name, "not a number");

        assert_eq!(session.get_field_value_as::<Decimal>(f.name), Decimal::ZERO);
        assert!(session.try_get_field_value_as::<Decimal>(f.name).is_err());
        assert_eq!(session.get_field_value_as::<String>(f.name), "not a number");
        assert!(!session.get_field_value_as::<bool>(Uuid::new_v4()));
    }

    #[test]
    fn test_set_field_from_text_keeps_value_on_error() {
        let f = fixture();
        let mut session = session(&f);
        session.set_field_value(f.qty, 5);

        assert!(session.set_field_from_text(f.qty, "abc").is_err());
        assert_eq!(session.get_field_value(f.qty), Some(FieldValue::from(5)));

        session.set_field_from_text(f.qty, "12.5").unwrap();
        assert_eq!(session.get_field_value(f.qty), Some(FieldValue::Number(Decimal::new(125, 1))));
    }

    #[test]
    fn test_pause_requires_top_frame() {
        let f = fixture();
        let mut session = session(&f);
        let process = Uuid::new_v4();

        assert!(matches!(session.pause(process, 1, json!({})), Err(EngineError::State(_))));

        session.push_frame(ExecutionFrame::new(process, "Main", 1));
        session.pause(process, 1, json!({"dialogName": "Ask"})).unwrap();
        assert_eq!(session.state(), SessionState::Paused);
        assert!(session.can_resume());
        assert_eq!(session.paused_at_step(), Some(1));

        session.resume();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.call_depth(), 1);
    }

    #[test]
    fn test_reenter_replays_outer_frames() {
        let f = fixture();
        let mut session = session(&f);
        let outer = Uuid::new_v4();
        let inner = Uuid::new_v4();
        session.push_frame(ExecutionFrame::new(outer, "Outer", 4));
        session.push_frame(ExecutionFrame::new(inner, "Inner", 2));
        session.pause(inner, 2, json!(null)).unwrap();

        session.prepare_run();
        assert_eq!(session.reenter(outer), Reentry::Replay { frame_index: 0, sequence: 4 });
        assert_eq!(session.reenter(inner), Reentry::Continue { frame_index: 1, sequence: 3 });
        assert!(!session.is_paused());
        assert_eq!(session.reenter(inner), Reentry::Fresh);
    }

    #[test]
    fn test_reenter_mismatch_resets_stack() {
        let f = fixture();
        let mut session = session(&f);
        let process = Uuid::new_v4();
        session.push_frame(ExecutionFrame::new(process, "Main", 1));
        session.pause(process, 1, json!(null)).unwrap();

        session.prepare_run();
        assert_eq!(session.reenter(Uuid::new_v4()), Reentry::Mismatch);
        assert_eq!(session.call_depth(), 0);
        assert!(!session.is_paused());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let f = fixture();
        let mut session = session(&f);
        session.set_field_value(f.qty, 7);

        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["state"], "Active");
        assert_eq!(json["callDepth"], 0);
        assert!(json["fieldValues"].get(f.qty.to_string()).is_some());
    }
}
