use serde_json::json;
use shared::{domain::JsonRow, error::ErrorStatus};
use tokio::sync::{mpsc, watch, Mutex};

use super::*;
use crate::{
    state::GridView,
    support::{app_resource, app_row, app_rows, next_call, scripted, PendingCall},
};

struct Harness {
    executor: MutationExecutor<JsonRow>,
    view: SharedView<JsonRow>,
    events: broadcast::Receiver<GridEvent>,
    calls: mpsc::UnboundedReceiver<PendingCall>,
}

fn seeded_page() -> GridResult<JsonRow> {
    GridResult {
        rows: vec![app_row("W", 1), app_row("X", 4), app_row("Y", 2)],
        total: 30,
    }
}

fn harness() -> Harness {
    let (transport, calls) = scripted();
    let view = Arc::new(watch::Sender::new(GridView {
        result: seeded_page(),
        has_loaded: true,
        revision: 1,
        ..GridView::default()
    }));
    let (events_tx, events) = broadcast::channel(16);
    let executor = MutationExecutor::new(
        Arc::new(app_resource()),
        Arc::new(CommandEncoder::new("/portal/query", "/portal/command")),
        transport,
        Arc::clone(&view),
        events_tx,
    );
    Harness {
        executor,
        view,
        events,
        calls,
    }
}

fn delete_command(row: &JsonRow) -> Result<GridCommand, GridError> {
    GridCommand::for_row("deleteApp", row)
}

struct Decline {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Confirmation for Decline {
    async fn confirm(&self, prompt: &MutationPrompt) -> bool {
        self.prompts.lock().await.push(prompt.to_string());
        false
    }
}

#[tokio::test]
async fn failed_delete_restores_the_exact_snapshot() {
    let Harness {
        executor,
        view,
        mut events,
        mut calls,
    } = harness();
    let row = app_row("X", 4);
    let context = RequestContext::new("h1");

    let (outcome, ()) = tokio::join!(
        executor.mutate(&row, MutationKind::Delete, &context, &AlwaysConfirm, delete_command),
        async {
            let call = next_call(&mut calls).await;
            {
                let optimistic = view.borrow();
                assert_eq!(optimistic.result.rows.len(), 2);
                assert_eq!(optimistic.result.total, 29);
            }
            let envelope = call.envelope();
            assert_eq!(envelope["action"], json!("deleteApp"));
            assert_eq!(envelope["data"]["appId"], json!("X"));
            assert_eq!(envelope["data"]["aggregateVersion"], json!(4));
            call.respond(Ok(json!({"error": {"description": "stale aggregate version"}})));
        }
    );

    assert!(matches!(outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(view.borrow().result, seeded_page());
    match events.try_recv().expect("rollback notice") {
        GridEvent::MutationRolledBack { key, reason } => {
            assert_eq!(key, row.key());
            assert!(reason.contains("stale aggregate version"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn transport_failure_also_rolls_back() {
    let Harness {
        executor,
        view,
        mut calls,
        ..
    } = harness();
    let row = app_row("W", 1);
    let context = RequestContext::new("h1");

    let (outcome, ()) = tokio::join!(
        executor.mutate(&row, MutationKind::Delete, &context, &AlwaysConfirm, delete_command),
        async {
            next_call(&mut calls).await.respond(Err(GridError::Status {
                status: 503,
                body: "unavailable".into(),
            }));
        }
    );

    assert!(matches!(outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(view.borrow().result, seeded_page());
}

#[tokio::test]
async fn successful_delete_keeps_the_optimistic_result() {
    let Harness {
        executor,
        view,
        mut events,
        mut calls,
    } = harness();
    let row = app_row("X", 4);
    let context = RequestContext::new("h1");

    let (outcome, ()) = tokio::join!(
        executor.mutate(&row, MutationKind::Delete, &context, &AlwaysConfirm, delete_command),
        async {
            next_call(&mut calls)
                .await
                .respond(Ok(json!({"data": {"appId": "X"}})));
        }
    );

    assert_eq!(outcome, MutationOutcome::Committed);
    let committed = view.borrow().clone();
    assert_eq!(committed.result.total, 29);
    let keys: Vec<_> = committed.result.rows.iter().map(|r| r.key()).collect();
    assert_eq!(keys, vec![app_row("W", 1).key(), app_row("Y", 2).key()]);
    assert_eq!(
        events.try_recv().expect("commit notice"),
        GridEvent::MutationCommitted { key: row.key() }
    );
}

#[tokio::test]
async fn declined_confirmation_changes_nothing() {
    let mut h = harness();
    let decline = Decline {
        prompts: Mutex::new(Vec::new()),
    };

    let outcome = h
        .executor
        .mutate(
            &app_row("X", 4),
            MutationKind::Delete,
            &RequestContext::new("h1"),
            &decline,
            delete_command,
        )
        .await;

    assert_eq!(outcome, MutationOutcome::Cancelled);
    assert_eq!(h.view.borrow().result, seeded_page());
    assert!(h.calls.try_recv().is_err());
    assert_eq!(
        decline.prompts.lock().await.as_slice(),
        ["Are you sure you want to delete X/h1?".to_string()]
    );
}

#[tokio::test]
async fn missing_host_rolls_back_without_sending() {
    let mut h = harness();

    let outcome = h
        .executor
        .mutate(
            &app_row("X", 4),
            MutationKind::Delete,
            &RequestContext::default(),
            &AlwaysConfirm,
            delete_command,
        )
        .await;

    assert!(matches!(outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(h.view.borrow().result, seeded_page());
    assert!(h.calls.try_recv().is_err());
}

#[tokio::test]
async fn rollback_yields_to_a_newer_server_result() {
    let Harness {
        executor,
        view,
        mut calls,
        ..
    } = harness();
    let row = app_row("X", 4);
    let context = RequestContext::new("h1");
    let fresh = GridResult {
        rows: app_rows(&["W", "Y", "Z"]),
        total: 29,
    };

    let (outcome, ()) = tokio::join!(
        executor.mutate(&row, MutationKind::Delete, &context, &AlwaysConfirm, delete_command),
        async {
            let call = next_call(&mut calls).await;
            view.send_modify(|view| {
                view.result = fresh.clone();
                view.revision += 1;
            });
            call.respond(Err(GridError::Application(ErrorStatus::new("conflict"))));
        }
    );

    assert!(matches!(outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(view.borrow().result, fresh);
}

#[tokio::test]
async fn update_sends_command_without_local_change() {
    let Harness {
        executor,
        view,
        mut calls,
        ..
    } = harness();
    let row = app_row("Y", 2);
    let context = RequestContext::new("h1");

    let (outcome, ()) = tokio::join!(
        executor.mutate(&row, MutationKind::Update, &context, &AlwaysConfirm, |row| {
            GridCommand::for_row("updateApp", row)
        }),
        async {
            let call = next_call(&mut calls).await;
            assert_eq!(view.borrow().result, seeded_page());
            assert_eq!(call.envelope()["action"], json!("updateApp"));
            call.respond(Ok(json!({"data": {}})));
        }
    );

    assert_eq!(outcome, MutationOutcome::Committed);
    assert_eq!(view.borrow().result, seeded_page());
}

#[tokio::test]
async fn failed_delete_does_not_revive_an_overlapping_committed_delete() {
    let Harness {
        executor,
        view,
        mut calls,
        ..
    } = harness();
    let w = app_row("W", 1);
    let x = app_row("X", 4);
    let context = RequestContext::new("h1");

    let (w_outcome, x_outcome, ()) = tokio::join!(
        executor.mutate(&w, MutationKind::Delete, &context, &AlwaysConfirm, delete_command),
        executor.mutate(&x, MutationKind::Delete, &context, &AlwaysConfirm, delete_command),
        async {
            let first = next_call(&mut calls).await;
            let second = next_call(&mut calls).await;
            assert_eq!(view.borrow().result.total, 28);
            let (w_call, x_call) = if first.envelope()["data"]["appId"] == json!("W") {
                (first, second)
            } else {
                (second, first)
            };
            x_call.respond(Ok(json!({"data": {}})));
            w_call.respond(Ok(json!({"error": {"description": "stale aggregate version"}})));
        }
    );

    assert!(matches!(w_outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(x_outcome, MutationOutcome::Committed);
    let after = view.borrow().result.clone();
    assert_eq!(after.rows, vec![app_row("W", 1), app_row("Y", 2)]);
    assert_eq!(after.total, 29);
}

#[tokio::test]
async fn row_without_version_is_rolled_back_before_sending() {
    let Harness {
        executor,
        view,
        mut calls,
        ..
    } = harness();
    let mut row = app_row("X", 4);
    row.0.remove("aggregateVersion");

    let outcome = executor
        .mutate(
            &row,
            MutationKind::Delete,
            &RequestContext::new("h1"),
            &AlwaysConfirm,
            delete_command,
        )
        .await;

    match outcome {
        MutationOutcome::RolledBack { reason } => assert!(reason.contains("aggregateVersion")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(view.borrow().result, seeded_page());
    assert!(calls.try_recv().is_err());
}
