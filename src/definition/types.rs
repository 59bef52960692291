/// Core definition type definitions
///
/// Applications and their modules as loaded from the definition repository.
/// Modules are a closed variant set: common fields on `Module`, variant payload
/// in `ModuleKind`. These types are serialized/deserialized from JSON for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A deployable application: a named, versioned set of modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Unique application identifier
    pub id: Uuid,
    /// Human-readable application name
    pub name: String,
    /// Version label (e.g. "1.4")
    #[serde(default)]
    pub version: String,
    /// Build label attached to the version
    #[serde(default)]
    pub version_build: String,
    /// Whether the engine loads this application at startup
    #[serde(default)]
    pub activate_on_start: bool,
    #[serde(default)]
    pub last_compiled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Create an application with only the identifying fields set
    pub fn new(id: Uuid, name: impl Into<String>, activate_on_start: bool) -> Self {
        Self {
            id,
            name: name.into(),
            version: String::new(),
            version_build: String::new(),
            activate_on_start,
            last_compiled: None,
            last_activated: None,
            created_at: Some(Utc::now()),
            modified_at: None,
        }
    }
}

/// A single module of an application
///
/// Modules are immutable once loaded; the interpreter only ever reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Unique module identifier within the application
    pub id: Uuid,
    /// Owning application
    pub application_id: Uuid,
    #[serde(default)]
    pub version: i32,
    /// Module name, addressable as `@Name` for field modules
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// User currently editing the module, if any
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
    /// Variant payload, tagged by `moduleType`
    #[serde(flatten)]
    pub kind: ModuleKind,
}

/// Variant payload of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "moduleType")]
pub enum ModuleKind {
    /// Ordered list of steps
    Process(ProcessModule),
    /// Typed storage slot
    Field(FieldModule),
    /// Suspends execution to collect user input
    Dialog(DialogActionModule),
    /// SQL statement with the CONNECT/RETURNS mini-language
    Database(DatabaseActionModule),
    /// Two-operand comparison
    Compare(CompareActionModule),
    /// Ordered list of calculations
    Calculate(CalculateActionModule),
    /// List data populated by database actions
    List(ListModule),
}

/// Module type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    ProcessModule,
    DialogAction,
    DatabaseAction,
    FieldModule,
    CompareAction,
    CalculateAction,
    ListModule,
}

impl Module {
    /// Build a module with fresh timestamps
    pub fn new(id: Uuid, application_id: Uuid, name: impl Into<String>, kind: ModuleKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            application_id,
            version: 1,
            name: name.into(),
            description: None,
            locked_by: None,
            created_at: now,
            modified_at: now,
            kind,
        }
    }

    /// The tag of this module's variant
    pub fn module_type(&self) -> ModuleType {
        match self.kind {
            ModuleKind::Process(_) => ModuleType::ProcessModule,
            ModuleKind::Field(_) => ModuleType::FieldModule,
            ModuleKind::Dialog(_) => ModuleType::DialogAction,
            ModuleKind::Database(_) => ModuleType::DatabaseAction,
            ModuleKind::Compare(_) => ModuleType::CompareAction,
            ModuleKind::Calculate(_) => ModuleType::CalculateAction,
            ModuleKind::List(_) => ModuleType::ListModule,
        }
    }

    pub fn as_process(&self) -> Option<&ProcessModule> {
        match &self.kind {
            ModuleKind::Process(process) => Some(process),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldModule> {
        match &self.kind {
            ModuleKind::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn as_dialog(&self) -> Option<&DialogActionModule> {
        match &self.kind {
            ModuleKind::Dialog(dialog) => Some(dialog),
            _ => None,
        }
    }

    pub fn as_database(&self) -> Option<&DatabaseActionModule> {
        match &self.kind {
            ModuleKind::Database(database) => Some(database),
            _ => None,
        }
    }

    pub fn as_compare(&self) -> Option<&CompareActionModule> {
        match &self.kind {
            ModuleKind::Compare(compare) => Some(compare),
            _ => None,
        }
    }

    pub fn as_calculate(&self) -> Option<&CalculateActionModule> {
        match &self.kind {
            ModuleKind::Calculate(calculate) => Some(calculate),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListModule> {
        match &self.kind {
            ModuleKind::List(list) => Some(list),
            _ => None,
        }
    }
}

/// Process module: the executable unit, an ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessModule {
    #[serde(default)]
    pub comment: Option<String>,
    /// Steps; `sequence` is unique within the process and defines order
    #[serde(default)]
    pub details: Vec<ProcessModuleDetail>,
}

impl ProcessModule {
    /// Find the step with the given sequence number
    pub fn step(&self, sequence: i32) -> Option<&ProcessModuleDetail> {
        self.details.iter().find(|step| step.sequence == sequence)
    }

    /// Sequence numbers used by more than one step, ascending
    pub fn duplicate_sequences(&self) -> Vec<i32> {
        let mut sequences: Vec<i32> = self.details.iter().map(|step| step.sequence).collect();
        sequences.sort_unstable();
        let mut duplicates: Vec<i32> = sequences
            .windows(2)
            .filter(|pair| pair[0] == pair[1])
            .map(|pair| pair[0])
            .collect();
        duplicates.dedup();
        duplicates
    }

    /// Find the sequence of the step declaring `label` (case-insensitive)
    pub fn sequence_of_label(&self, label: &str) -> Option<i32> {
        self.details
            .iter()
            .find(|step| {
                step.label
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(label))
            })
            .map(|step| step.sequence)
    }
}

/// One step of a process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessModuleDetail {
    pub sequence: i32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub action_type: Option<ActionType>,
    /// Target module of the action
    #[serde(default)]
    pub module_id: Option<Uuid>,
    #[serde(default)]
    pub action_module_type: Option<ModuleType>,
    /// Label to jump to when the action succeeds
    #[serde(default)]
    pub pass_label: Option<String>,
    /// Label to jump to when the action fails
    #[serde(default)]
    pub fail_label: Option<String>,
    /// Commented steps are skipped
    #[serde(default)]
    pub commented: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Step action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Call,
    ReturnPass,
    ReturnFail,
    DatabaseExecute,
    Dialog,
    Compare,
    Calculate,
}

/// Field module: a named, typed storage slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldModule {
    pub field_type: FieldType,
    /// Default value as text, parsed lazily on first read
    #[serde(default)]
    pub default_value: Option<String>,
}

/// Declared type of a field module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    DateTime,
}

/// Dialog action module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogActionModule {
    pub dialog_type: DialogType,
    /// Field receiving the user's input
    #[serde(default)]
    pub result_field_id: Option<Uuid>,
    /// Field holding the message text
    #[serde(default)]
    pub message_field_id: Option<Uuid>,
    #[serde(default)]
    pub help1_field_id: Option<Uuid>,
    #[serde(default)]
    pub help2_field_id: Option<Uuid>,
    #[serde(default)]
    pub help3_field_id: Option<Uuid>,
    /// Field holding function-key options, e.g. "F2:Next F3:Cancel"
    #[serde(default)]
    pub options_field_id: Option<Uuid>,
    /// List shown by LIST dialogs
    #[serde(default)]
    pub list_module_id: Option<Uuid>,
    #[serde(default)]
    pub mask_input: bool,
    #[serde(default)]
    pub mask_character: Option<char>,
}

impl DialogActionModule {
    /// Dialog binding a single result field, nothing else
    pub fn prompt(result_field_id: Uuid) -> Self {
        Self {
            dialog_type: DialogType::Prompt,
            result_field_id: Some(result_field_id),
            message_field_id: None,
            help1_field_id: None,
            help2_field_id: None,
            help3_field_id: None,
            options_field_id: None,
            list_module_id: None,
            mask_input: false,
            mask_character: None,
        }
    }
}

/// Dialog presentation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DialogType {
    /// Show input field, collect user input
    Prompt,
    /// Yes/No confirmation, no input field
    Confirm,
    /// Display only
    NoPrompt,
    /// Select from list
    List,
}

impl DialogType {
    /// PROMPT and LIST dialogs carry an input prompt
    pub fn shows_prompt(self) -> bool {
        matches!(self, DialogType::Prompt | DialogType::List)
    }
}

/// Database action module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseActionModule {
    /// SQL template with embedded STATEMENT/CONNECT/RETURNS mini-language
    pub sql_statement: String,
}

/// Input of a compare or calculate operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Operand {
    /// Literal text
    Constant(String),
    /// Current value of a field module
    Field(Uuid),
}

/// Compare action module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareActionModule {
    pub operator: CompareOperator,
    #[serde(default)]
    pub input1: Option<Operand>,
    #[serde(default)]
    pub input2: Option<Operand>,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

/// Calculate action module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateActionModule {
    #[serde(default)]
    pub details: Vec<CalculateModuleDetail>,
}

/// One calculation: `result = input1 <operator> input2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateModuleDetail {
    pub sequence: i32,
    pub operator: CalculateOperator,
    #[serde(default)]
    pub input1: Option<Operand>,
    #[serde(default)]
    pub input2: Option<Operand>,
    pub result_field_id: Uuid,
}

/// Calculation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculateOperator {
    Assign,
    Concatenate,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    /// Removes the result field's stored value
    Clear,
}

/// List module; rows live in the session under the list module's id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModule {
    #[serde(default)]
    pub max_rows: Option<u32>,
}
