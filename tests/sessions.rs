//! Session manager: attach-or-create, pause/resume round trips, cancel and sweep.

mod common;

use common::{manager, step, AppBuilder, ScriptedGateway};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use stepway::definition::{ActionType, FieldType};
use stepway::error::EngineError;
use stepway::runtime::{FieldValue, SessionState};
use stepway::session::{SessionManager, SessionStore, WorkflowStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct PromptApp {
    manager: SessionManager,
    application_id: Uuid,
    process_id: Uuid,
    field_id: Uuid,
}

/// Step 1 prompts for a field, step 2 returns pass
async fn prompt_app(field_type: FieldType) -> PromptApp {
    let mut app = AppBuilder::new();
    let field_id = app.field("Answer", field_type, None);
    let ask = app.prompt("Ask", field_id);
    let process_id = app.process(
        "Main",
        vec![step(1, ActionType::Dialog, Some(ask)), step(2, ActionType::ReturnPass, None)],
    );
    let application_id = app.application_id;
    let engine = app.build(Arc::new(ScriptedGateway::default())).await;

    PromptApp {
        manager: manager(engine),
        application_id,
        process_id,
        field_id,
    }
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let app = prompt_app(FieldType::String).await;

    let started = app
        .manager
        .start_workflow(app.application_id, app.process_id, "alice")
        .await
        .unwrap();
    assert!(started.success);
    assert!(!started.is_existing_session);
    assert_eq!(started.status, WorkflowStatus::Paused);
    assert_eq!(started.screen.as_ref().unwrap()["prompt"]["fieldId"], app.field_id.to_string());

    let snapshot = app.manager.get_session_status(started.session_id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.paused_at_step, Some(1));
    assert_eq!(snapshot.user_id, "alice");

    let resumed = app
        .manager
        .resume_workflow(started.session_id, app.field_id, "hello")
        .await
        .unwrap();
    assert!(resumed.success, "{}", resumed.message);
    assert_eq!(resumed.status, WorkflowStatus::Completed);
    assert!(resumed.screen.is_none());

    assert!(app.manager.get_session_status(started.session_id).await.unwrap().is_none());
    assert_eq!(app.manager.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn second_start_attaches_to_existing_session() {
    let app = prompt_app(FieldType::String).await;

    let first = app
        .manager
        .start_workflow(app.application_id, app.process_id, "alice")
        .await
        .unwrap();
    let second = app
        .manager
        .start_workflow(app.application_id, app.process_id, "alice")
        .await
        .unwrap();

    assert_eq!(first.session_id, second.session_id);
    assert!(second.is_existing_session);
    assert_eq!(second.status, WorkflowStatus::Paused);
    assert_eq!(second.message, "Connected to existing session. Status: Paused");
    assert_eq!(second.screen, first.screen);

    let other = app
        .manager
        .start_workflow(app.application_id, app.process_id, "bob")
        .await
        .unwrap();
    assert_ne!(other.session_id, first.session_id);
    assert_eq!(app.manager.store().count().await.unwrap(), 2);
}

#[tokio::test]
async fn concurrent_starts_for_one_user_share_a_session() {
    let app = prompt_app(FieldType::String).await;

    let (left, right) = tokio::join!(
        app.manager.start_workflow(app.application_id, app.process_id, "carol"),
        app.manager.start_workflow(app.application_id, app.process_id, "carol"),
    );
    let (left, right) = (left.unwrap(), right.unwrap());

    assert_eq!(left.session_id, right.session_id);
    assert!(left.is_existing_session ^ right.is_existing_session);
    assert_eq!(app.manager.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn unparseable_input_leaves_session_paused() {
    let app = prompt_app(FieldType::Number).await;
    let started = app
        .manager
        .start_workflow(app.application_id, app.process_id, "dave")
        .await
        .unwrap();

    let error = app
        .manager
        .resume_workflow(started.session_id, app.field_id, "twelve")
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::Validation(_)), "{:?}", error);

    let snapshot = app.manager.get_session_status(started.session_id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.paused_at_step, Some(1));
    assert!(snapshot.field_values.is_empty());

    let resumed = app
        .manager
        .resume_workflow(started.session_id, app.field_id, "12")
        .await
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn resume_of_unknown_session_reports_not_found() {
    let app = prompt_app(FieldType::String).await;

    let resumed = app
        .manager
        .resume_workflow(Uuid::new_v4(), app.field_id, "x")
        .await
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::NotFound);
    assert_eq!(resumed.message, "Session not found");
    assert!(!resumed.success);
}

#[tokio::test]
async fn cancelled_session_cannot_be_resumed() {
    let app = prompt_app(FieldType::String).await;
    let started = app
        .manager
        .start_workflow(app.application_id, app.process_id, "erin")
        .await
        .unwrap();

    assert!(app.manager.cancel_session(started.session_id).await.unwrap());
    assert!(!app.manager.cancel_session(started.session_id).await.unwrap());
    assert!(app.manager.get_user_session_status("erin").await.unwrap().is_none());

    let resumed = app
        .manager
        .resume_workflow(started.session_id, app.field_id, "late")
        .await
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::NotFound);
}

#[tokio::test]
async fn cancel_user_session_frees_the_user() {
    let app = prompt_app(FieldType::String).await;
    let first = app
        .manager
        .start_workflow(app.application_id, app.process_id, "frank")
        .await
        .unwrap();

    assert!(app.manager.cancel_user_session("frank").await.unwrap());
    let fresh = app
        .manager
        .start_workflow(app.application_id, app.process_id, "frank")
        .await
        .unwrap();
    assert!(!fresh.is_existing_session);
    assert_ne!(fresh.session_id, first.session_id);
}

#[tokio::test]
async fn start_of_unknown_process_is_not_found() {
    let app = prompt_app(FieldType::String).await;

    let error = app
        .manager
        .start_workflow(app.application_id, Uuid::new_v4(), "gina")
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::NotFound(_)));
    assert_eq!(app.manager.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn process_without_dialog_completes_immediately() {
    let mut app = AppBuilder::new();
    let total = app.field("Total", FieldType::Number, Some("10"));
    let process_id = app.process("Quick", vec![step(1, ActionType::ReturnPass, None)]);
    let application_id = app.application_id;
    let engine = app.build(Arc::new(ScriptedGateway::default())).await;
    let manager = manager(engine.clone());

    let started = manager.start_workflow(application_id, process_id, "hank").await.unwrap();
    assert_eq!(started.status, WorkflowStatus::Completed);
    assert!(started.success);
    assert!(manager.get_user_session_status("hank").await.unwrap().is_none());

    let session = engine.new_session("hank", application_id, process_id);
    assert_eq!(session.get_field_value(total), Some(FieldValue::Number(Decimal::from(10))));
}

#[tokio::test]
async fn sweep_removes_only_idle_sessions() {
    let app = prompt_app(FieldType::String).await;
    let idle = app
        .manager
        .start_workflow(app.application_id, app.process_id, "idle")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let recent = app
        .manager
        .start_workflow(app.application_id, app.process_id, "recent")
        .await
        .unwrap();

    let removed = app
        .manager
        .cleanup_expired_sessions(Duration::from_millis(150))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(app.manager.get_session_status(idle.session_id).await.unwrap().is_none());
    assert!(app.manager.get_session_status(recent.session_id).await.unwrap().is_some());
}

/// Step 1 prompts, step 2 runs SQL on a gateway that can be stalled
async fn prompt_then_query_app(gateway: Arc<ScriptedGateway>) -> PromptApp {
    let mut app = AppBuilder::new();
    let field_id = app.field("Answer", FieldType::String, None);
    let ask = app.prompt("Ask", field_id);
    let record = app.database("Record", "INSERT INTO answers VALUES (@Answer)");
    let process_id = app.process(
        "Main",
        vec![
            step(1, ActionType::Dialog, Some(ask)),
            step(2, ActionType::DatabaseExecute, Some(record)),
            step(3, ActionType::ReturnPass, None),
        ],
    );
    let application_id = app.application_id;
    let engine = app.build(gateway).await;

    PromptApp {
        manager: manager(engine),
        application_id,
        process_id,
        field_id,
    }
}

#[tokio::test]
async fn dropped_start_does_not_strand_the_user() {
    let mut app = AppBuilder::new();
    let lookup = app.database("Lookup", "SELECT 1");
    let process_id = app.process(
        "Main",
        vec![step(1, ActionType::DatabaseExecute, Some(lookup)), step(2, ActionType::ReturnPass, None)],
    );
    let application_id = app.application_id;
    let gateway = Arc::new(ScriptedGateway::with_connections(&["DEFAULT"]));
    let manager = manager(app.build(gateway.clone()).await);

    gateway.set_stalled(true);
    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        manager.start_workflow(application_id, process_id, "ivan"),
    )
    .await;
    assert!(dropped.is_err());

    gateway.set_stalled(false);
    let retried = manager.start_workflow(application_id, process_id, "ivan").await.unwrap();
    assert!(!retried.is_existing_session);
    assert_eq!(retried.status, WorkflowStatus::Completed);
    assert!(retried.success, "{}", retried.message);
    assert_eq!(manager.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn abandoned_session_is_not_resumable() {
    let mut app = AppBuilder::new();
    let lookup = app.database("Lookup", "SELECT 1");
    let process_id = app.process("Main", vec![step(1, ActionType::DatabaseExecute, Some(lookup))]);
    let application_id = app.application_id;
    let gateway = Arc::new(ScriptedGateway::with_connections(&["DEFAULT"]));
    gateway.set_stalled(true);
    let manager = manager(app.build(gateway).await);

    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        manager.start_workflow(application_id, process_id, "judy"),
    )
    .await;
    assert!(dropped.is_err());

    let snapshot = manager.get_user_session_status("judy").await.unwrap().unwrap();
    let resumed = manager
        .resume_workflow(snapshot.session_id, Uuid::new_v4(), "x")
        .await
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::NotFound);
    assert_eq!(manager.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn dropped_resume_keeps_the_pause() {
    let gateway = Arc::new(ScriptedGateway::with_connections(&["DEFAULT"]));
    let app = prompt_then_query_app(gateway.clone()).await;
    let started = app
        .manager
        .start_workflow(app.application_id, app.process_id, "kim")
        .await
        .unwrap();
    assert_eq!(started.status, WorkflowStatus::Paused);

    gateway.set_stalled(true);
    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        app.manager.resume_workflow(started.session_id, app.field_id, "first"),
    )
    .await;
    assert!(dropped.is_err());

    let snapshot = app.manager.get_session_status(started.session_id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.paused_at_step, Some(1));
    assert!(snapshot.field_values.is_empty());

    gateway.set_stalled(false);
    let again = app
        .manager
        .start_workflow(app.application_id, app.process_id, "kim")
        .await
        .unwrap();
    assert!(again.is_existing_session);
    assert_eq!(again.status, WorkflowStatus::Paused);

    let resumed = app
        .manager
        .resume_workflow(started.session_id, app.field_id, "second")
        .await
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::Completed);
    assert!(resumed.success, "{}", resumed.message);
    assert_eq!(
        gateway.executed(),
        vec![("DEFAULT".to_string(), "INSERT INTO answers VALUES ('second')".to_string())]
    );
}

#[tokio::test]
async fn restart_drops_the_pause_and_runs_from_the_first_step() {
    let mut app = AppBuilder::new();
    let answer = app.field("Answer", FieldType::String, None);
    let ask = app.prompt("Ask", answer);
    let confirm = app.prompt("Confirm", answer);
    let process_id = app.process(
        "Main",
        vec![
            step(1, ActionType::Dialog, Some(ask)),
            step(2, ActionType::Dialog, Some(confirm)),
            step(3, ActionType::ReturnPass, None),
        ],
    );
    let application_id = app.application_id;
    let engine = app.build(Arc::new(ScriptedGateway::default())).await;
    let cancel = CancellationToken::new();

    let mut session = engine.new_session("lena", application_id, process_id);
    session.start(&engine, &cancel).await;
    session.set_field_from_text(answer, "first").unwrap();
    session.start(&engine, &cancel).await;
    assert_eq!(session.paused_at_step(), Some(2));
    assert_eq!(session.screen().unwrap()["dialogName"], "Confirm");

    let restarted = session.restart(&engine, &cancel).await;
    assert!(restarted.is_success(), "{}", restarted.message);
    assert_eq!(session.paused_at_step(), Some(1));
    assert_eq!(session.screen().unwrap()["dialogName"], "Ask");
    assert_eq!(session.call_depth(), 1);
    assert_eq!(session.get_field_value(answer), Some(FieldValue::from("first")));
}
