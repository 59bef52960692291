/// Dialog executor
///
/// Renders the dialog's screen descriptor and suspends the session at the
/// current step. Pausing is a successful outcome; the interpreter notices the
/// pause and returns without popping the frame.

use crate::definition::cache::TypedModule;
use crate::definition::types::{DialogActionModule, DialogType, FieldType};
use crate::error::EngineError;
use crate::runtime::executor::{ActionContext, ActionExecutor};
use crate::runtime::result::ActionResult;
use crate::runtime::session::ExecutionSession;
use crate::runtime::substitution::substitute_text;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct DialogExecutor;

/// Screen descriptor handed to the transport layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogScreen {
    pub dialog_id: Uuid,
    pub dialog_name: String,
    pub dialog_type: DialogType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: DialogContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<DialogPrompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_data: Option<ListData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<DialogOption>>,
    pub session_id: Uuid,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub help_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogPrompt {
    pub field_id: Uuid,
    pub field_name: String,
    pub field_type: FieldType,
    pub current_value: Option<String>,
    pub default_value: Option<String>,
    pub masked: Masking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Masking {
    pub enabled: bool,
    pub character: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListData {
    pub items: Vec<Value>,
    pub max_rows: Option<u32>,
}

/// One function-key option, e.g. `F2:Next` becomes {value: "F2", text: "Next"}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogOption {
    pub value: String,
    pub text: String,
}

#[async_trait]
impl ActionExecutor for DialogExecutor {
    async fn execute(&self, ctx: ActionContext<'_>, session: &mut ExecutionSession, module_id: Uuid) -> ActionResult {
        let Some(dialog) = ctx.engine.cache().get_dialog(session.application_id(), module_id) else {
            return ActionResult::from_error(EngineError::NotFound(format!(
                "Dialog action module {} not found",
                module_id
            )));
        };

        let Some((process_id, step)) = session
            .current_frame()
            .map(|frame| (frame.process_id, frame.current_sequence))
        else {
            return ActionResult::from_error(EngineError::State(
                "No execution frame on stack - cannot pause".to_string(),
            ));
        };

        let screen = build_screen(&dialog, session);
        let screen = match serde_json::to_value(&screen) {
            Ok(screen) => screen,
            Err(e) => return ActionResult::from_error(e.into()),
        };

        if let Err(error) = session.pause(process_id, step, screen) {
            return ActionResult::from_error(error);
        }

        tracing::debug!("💬 Dialog '{}' shown, session {} paused at step {}", dialog.name(), session.session_id(), step);

        ActionResult::success(format!("Dialog '{}' shown", dialog.name()))
    }
}

fn build_screen(dialog: &TypedModule<DialogActionModule>, session: &ExecutionSession) -> DialogScreen {
    let prompt = if dialog.dialog_type.shows_prompt() {
        dialog.result_field_id.and_then(|field_id| build_prompt(dialog, field_id, session))
    } else {
        None
    };

    let list_data = match (dialog.dialog_type, dialog.list_module_id) {
        (DialogType::List, Some(list_id)) => list_data(list_id, session),
        _ => None,
    };

    DialogScreen {
        dialog_id: dialog.id(),
        dialog_name: dialog.name().to_string(),
        dialog_type: dialog.dialog_type,
        description: dialog.module().description.clone(),
        content: build_content(dialog, session),
        prompt,
        list_data,
        options: dialog.options_field_id.map(|field_id| parse_options(&field_text(field_id, session))),
        session_id: session.session_id(),
        user_id: session.user_id().to_string(),
    }
}

fn build_content(dialog: &DialogActionModule, session: &ExecutionSession) -> DialogContent {
    let message = dialog
        .message_field_id
        .map(|field_id| field_text(field_id, session))
        .map(|text| substitute_text(&text, session));

    let help_lines = [dialog.help1_field_id, dialog.help2_field_id, dialog.help3_field_id]
        .into_iter()
        .flatten()
        .map(|field_id| field_text(field_id, session))
        .filter(|text| !text.is_empty())
        .map(|text| substitute_text(&text, session))
        .collect();

    DialogContent { message, help_lines }
}

fn build_prompt(dialog: &DialogActionModule, field_id: Uuid, session: &ExecutionSession) -> Option<DialogPrompt> {
    let field = session.field_module(field_id)?;

    Some(DialogPrompt {
        field_id,
        field_name: field.name().to_string(),
        field_type: field.field_type,
        current_value: session.get_field_value(field_id).map(|value| value.to_string()),
        default_value: field.default_value.clone(),
        masked: Masking {
            enabled: dialog.mask_input,
            character: dialog.mask_character,
        },
    })
}

/// List rows are stored as JSON text under the list module's id
fn list_data(list_id: Uuid, session: &ExecutionSession) -> Option<ListData> {
    let list = session.module_cache().get_list(session.application_id(), list_id)?;

    let items = session
        .get_field_value(list_id)
        .map(|value| value.to_string())
        .filter(|json| !json.is_empty())
        .and_then(|json| serde_json::from_str::<Vec<Value>>(&json).ok())
        .unwrap_or_default();

    Some(ListData {
        items,
        max_rows: list.max_rows,
    })
}

fn field_text(field_id: Uuid, session: &ExecutionSession) -> String {
    session
        .get_field_value(field_id)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

/// Parse `"F2:Next F3:Cancel"` into ordered options; entries without a key are skipped
fn parse_options(text: &str) -> Vec<DialogOption> {
    text.split_whitespace()
        .filter_map(|part| {
            let (value, label) = part.split_once(':')?;
            if value.is_empty() {
                return None;
            }
            Some(DialogOption {
                value: value.trim().to_string(),
                text: label.trim().to_string(),
            })
        })
        .collect()
}
