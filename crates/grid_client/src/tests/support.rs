//! Scripted transport and fixtures shared by the unit tests.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::domain::JsonRow;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    encoder::{GridResource, TransportRequest},
    error::GridError,
    state::GridView,
    transport::GridTransport,
};

const WAIT: Duration = Duration::from_secs(5);

pub(crate) struct PendingCall {
    pub request: TransportRequest,
    reply: oneshot::Sender<Result<Value, GridError>>,
}

impl PendingCall {
    pub fn envelope(&self) -> Value {
        serde_json::from_str(&self.request.payload).expect("envelope json")
    }

    /// Releases the reply. Ignored when the caller already gave up waiting.
    pub fn respond(self, outcome: Result<Value, GridError>) {
        let _ = self.reply.send(outcome);
    }
}

/// Every `send` parks until the test answers the matching [`PendingCall`],
/// which lets tests deliver replies in any order.
pub(crate) struct ScriptedTransport {
    calls: mpsc::UnboundedSender<PendingCall>,
}

pub(crate) fn scripted() -> (Arc<ScriptedTransport>, mpsc::UnboundedReceiver<PendingCall>) {
    let (calls, rx) = mpsc::unbounded_channel();
    (Arc::new(ScriptedTransport { calls }), rx)
}

#[async_trait]
impl GridTransport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<Value, GridError> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(PendingCall { request, reply })
            .map_err(|_| GridError::Decode("script closed".into()))?;
        rx.await
            .unwrap_or_else(|_| Err(GridError::Decode("no scripted reply".into())))
    }
}

pub(crate) async fn next_call(calls: &mut mpsc::UnboundedReceiver<PendingCall>) -> PendingCall {
    tokio::time::timeout(WAIT, calls.recv())
        .await
        .expect("call within timeout")
        .expect("transport alive")
}

pub(crate) async fn settled<R: Clone>(view: &mut watch::Receiver<GridView<R>>) -> GridView<R> {
    tokio::time::timeout(WAIT, view.wait_for(|view| !view.in_flight()))
        .await
        .expect("settled within timeout")
        .expect("view sender alive")
        .clone()
}

pub(crate) fn app_resource() -> GridResource {
    GridResource::new("app", "getApp", "apps").with_delete_action("deleteApp")
}

pub(crate) fn app_row(app_id: &str, version: i64) -> JsonRow {
    serde_json::from_value(json!({
        "hostId": "h1",
        "appId": app_id,
        "appName": format!("app {app_id}"),
        "aggregateVersion": version,
    }))
    .expect("row")
}

pub(crate) fn app_rows(ids: &[&str]) -> Vec<JsonRow> {
    ids.iter().map(|id| app_row(id, 1)).collect()
}

pub(crate) fn list_reply(ids: &[&str], total: u64) -> Value {
    json!({ "apps": app_rows(ids), "total": total })
}
