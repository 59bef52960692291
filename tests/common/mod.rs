//! Shared fixtures: an application builder over the in-memory repository and a
//! scripted SQL gateway.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use stepway::database::SqlGateway;
use stepway::definition::{
    ActionType, Application, CalculateActionModule, CalculateModuleDetail, CalculateOperator, CompareActionModule,
    CompareOperator, DatabaseActionModule, DialogActionModule, FieldModule, FieldType, InMemoryDefinitionRepository,
    ListModule, Module, ModuleCache, ModuleKind, Operand, ProcessModule, ProcessModuleDetail,
};
use stepway::error::EngineError;
use stepway::runtime::{EngineLimits, ExecutionEngine, FieldValue};
use stepway::session::{InMemorySessionStore, SessionManager};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type Row = Vec<Option<FieldValue>>;

/// Gateway that records SQL and answers with queued rows
#[derive(Default)]
pub struct ScriptedGateway {
    connections: HashSet<String>,
    rows: Mutex<VecDeque<Option<Row>>>,
    executed: Mutex<Vec<(String, String)>>,
    /// While set, queries wait until cancelled
    stalled: AtomicBool,
}

impl ScriptedGateway {
    pub fn with_connections(names: &[&str]) -> Self {
        Self {
            connections: names.iter().map(|name| name.to_uppercase()).collect(),
            ..Default::default()
        }
    }

    pub fn push_row(&self, row: Option<Row>) {
        self.rows.lock().unwrap().push_back(row);
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// (connection, sql) pairs in execution order
    pub fn executed(&self) -> Vec<(String, String)> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGateway for ScriptedGateway {
    fn has_connection(&self, name: &str) -> bool {
        self.connections.contains(&name.to_uppercase())
    }

    async fn query_first_row(
        &self,
        connection: &str,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Row>, EngineError> {
        if self.stalled.load(Ordering::SeqCst) {
            cancel.cancelled().await;
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.executed
            .lock()
            .unwrap()
            .push((connection.to_string(), sql.to_string()));
        Ok(self.rows.lock().unwrap().pop_front().flatten())
    }
}

/// Builds one application's modules
pub struct AppBuilder {
    pub application_id: Uuid,
    modules: Vec<Module>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            application_id: Uuid::new_v4(),
            modules: Vec::new(),
        }
    }

    fn add(&mut self, id: Uuid, name: &str, kind: ModuleKind) -> Uuid {
        self.modules.push(Module::new(id, self.application_id, name, kind));
        id
    }

    pub fn field(&mut self, name: &str, field_type: FieldType, default_value: Option<&str>) -> Uuid {
        self.add(
            Uuid::new_v4(),
            name,
            ModuleKind::Field(FieldModule {
                field_type,
                default_value: default_value.map(str::to_string),
            }),
        )
    }

    pub fn list(&mut self, name: &str) -> Uuid {
        self.add(Uuid::new_v4(), name, ModuleKind::List(ListModule { max_rows: Some(10) }))
    }

    pub fn process_with_id(&mut self, id: Uuid, name: &str, details: Vec<ProcessModuleDetail>) -> Uuid {
        self.add(id, name, ModuleKind::Process(ProcessModule { comment: None, details }))
    }

    pub fn process(&mut self, name: &str, details: Vec<ProcessModuleDetail>) -> Uuid {
        self.process_with_id(Uuid::new_v4(), name, details)
    }

    pub fn prompt(&mut self, name: &str, result_field: Uuid) -> Uuid {
        self.add(Uuid::new_v4(), name, ModuleKind::Dialog(DialogActionModule::prompt(result_field)))
    }

    pub fn database(&mut self, name: &str, sql: &str) -> Uuid {
        self.add(
            Uuid::new_v4(),
            name,
            ModuleKind::Database(DatabaseActionModule {
                sql_statement: sql.to_string(),
            }),
        )
    }

    pub fn compare(&mut self, name: &str, operator: CompareOperator, input1: Operand, input2: Operand) -> Uuid {
        self.add(
            Uuid::new_v4(),
            name,
            ModuleKind::Compare(CompareActionModule {
                operator,
                input1: Some(input1),
                input2: Some(input2),
            }),
        )
    }

    pub fn calculate(
        &mut self,
        name: &str,
        operator: CalculateOperator,
        input1: Option<Operand>,
        input2: Option<Operand>,
        result_field_id: Uuid,
    ) -> Uuid {
        self.add(
            Uuid::new_v4(),
            name,
            ModuleKind::Calculate(CalculateActionModule {
                details: vec![CalculateModuleDetail {
                    sequence: 1,
                    operator,
                    input1,
                    input2,
                    result_field_id,
                }],
            }),
        )
    }

    pub async fn into_repository(self) -> Arc<InMemoryDefinitionRepository> {
        let repository = Arc::new(InMemoryDefinitionRepository::new());
        repository
            .save_application(Application::new(self.application_id, "Test Application", true))
            .await;
        for module in self.modules {
            repository.save_module(module).await;
        }
        repository
    }

    pub async fn build(self, gateway: Arc<ScriptedGateway>) -> Arc<ExecutionEngine> {
        self.build_with_limits(gateway, EngineLimits::default()).await
    }

    pub async fn build_with_limits(self, gateway: Arc<ScriptedGateway>, limits: EngineLimits) -> Arc<ExecutionEngine> {
        let repository = self.into_repository().await;
        let engine = ExecutionEngine::new(Arc::new(ModuleCache::new()), gateway, repository).with_limits(limits);
        engine.load_applications(true).await.unwrap();
        Arc::new(engine)
    }
}

pub fn manager(engine: Arc<ExecutionEngine>) -> SessionManager {
    SessionManager::new(engine, Arc::new(InMemorySessionStore::new()))
}

pub fn step(sequence: i32, action_type: ActionType, module_id: Option<Uuid>) -> ProcessModuleDetail {
    ProcessModuleDetail {
        sequence,
        action_type: Some(action_type),
        module_id,
        ..Default::default()
    }
}

pub fn step_with_labels(
    sequence: i32,
    action_type: ActionType,
    module_id: Option<Uuid>,
    pass_label: &str,
    fail_label: &str,
) -> ProcessModuleDetail {
    ProcessModuleDetail {
        pass_label: Some(pass_label.to_string()),
        fail_label: Some(fail_label.to_string()),
        ..step(sequence, action_type, module_id)
    }
}

pub fn labelled(label: &str, detail: ProcessModuleDetail) -> ProcessModuleDetail {
    ProcessModuleDetail {
        label: Some(label.to_string()),
        ..detail
    }
}

pub fn constant(text: &str) -> Operand {
    Operand::Constant(text.to_string())
}
