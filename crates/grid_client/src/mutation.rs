//! Optimistic writes with snapshot rollback.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{GridResult, GridRow, RowKey},
    protocol::RequestContext,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    encoder::{decode_command_reply, CommandEncoder, GridCommand, GridResource},
    error::GridError,
    fetch::SharedView,
    state::GridEvent,
    transport::GridTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Delete,
    Update,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => f.write_str("delete"),
            Self::Update => f.write_str("update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPrompt {
    pub key: RowKey,
    pub kind: MutationKind,
}

impl fmt::Display for MutationPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Are you sure you want to {} {}?", self.kind, self.key)
    }
}

/// Asked before any state change; a `false` answer cancels the mutation.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, prompt: &MutationPrompt) -> bool;
}

pub struct AlwaysConfirm;

#[async_trait]
impl Confirmation for AlwaysConfirm {
    async fn confirm(&self, _prompt: &MutationPrompt) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Cancelled,
    Committed,
    RolledBack { reason: String },
}

/// What one write changed locally, held for its round-trip.
struct MutationRecord<R> {
    key: RowKey,
    kind: MutationKind,
    /// Row taken off the page, if the change removed one.
    removed: Option<R>,
    snapshot: GridResult<R>,
    revision: u64,
}

pub struct MutationExecutor<R: GridRow> {
    resource: Arc<GridResource>,
    encoder: Arc<CommandEncoder>,
    transport: Arc<dyn GridTransport>,
    view: SharedView<R>,
    events: broadcast::Sender<GridEvent>,
}

impl<R: GridRow> MutationExecutor<R> {
    pub fn new(
        resource: Arc<GridResource>,
        encoder: Arc<CommandEncoder>,
        transport: Arc<dyn GridTransport>,
        view: SharedView<R>,
        events: broadcast::Sender<GridEvent>,
    ) -> Self {
        Self {
            resource,
            encoder,
            transport,
            view,
            events,
        }
    }

    /// Confirms, applies the local change, sends the command built by
    /// `command_factory` from the row as it was at mutation time, and rolls the
    /// visible result back if the write fails for any reason.
    pub async fn mutate<F>(
        &self,
        row: &R,
        kind: MutationKind,
        context: &RequestContext,
        confirmation: &dyn Confirmation,
        command_factory: F,
    ) -> MutationOutcome
    where
        F: FnOnce(&R) -> Result<GridCommand, GridError> + Send,
    {
        let key = row.key();
        let prompt = MutationPrompt {
            key: key.clone(),
            kind,
        };
        if !confirmation.confirm(&prompt).await {
            return MutationOutcome::Cancelled;
        }

        let record = self.apply_locally(key, kind);

        match self.send(row, context, command_factory).await {
            Ok(()) => {
                info!(key = %record.key, kind = %record.kind, "grid mutation committed");
                let _ = self
                    .events
                    .send(GridEvent::MutationCommitted { key: record.key });
                MutationOutcome::Committed
            }
            Err(err) => {
                warn!(
                    key = %record.key,
                    kind = %record.kind,
                    error = %err,
                    "grid mutation failed; rolling back"
                );
                let reason = err.to_string();
                self.roll_back(&record);
                let _ = self.events.send(GridEvent::MutationRolledBack {
                    key: record.key,
                    reason: reason.clone(),
                });
                MutationOutcome::RolledBack { reason }
            }
        }
    }

    fn apply_locally(&self, key: RowKey, kind: MutationKind) -> MutationRecord<R> {
        let mut captured = None;
        let mut removed = None;
        self.view.send_if_modified(|view| {
            captured = Some((view.result.clone(), view.revision));
            // Only a delete has a meaningful local effect; updates go through
            // the record form and come back via `refresh_one`.
            if kind != MutationKind::Delete {
                return false;
            }
            let Some(index) = view.result.position(&key) else {
                return false;
            };
            let Some(next) = view.result.without(&key) else {
                return false;
            };
            removed = Some(view.result.rows[index].clone());
            view.result = next;
            true
        });
        let (snapshot, revision) = captured.unwrap_or_default();
        MutationRecord {
            key,
            kind,
            removed,
            snapshot,
            revision,
        }
    }

    /// Undoes only this mutation's own change. Writes that overlapped it keep
    /// their effect, and a newer server response since the optimistic change
    /// stays as it is.
    fn roll_back(&self, record: &MutationRecord<R>) {
        let Some(removed) = &record.removed else {
            return;
        };
        self.view.send_if_modified(|view| {
            if view.revision != record.revision {
                return false;
            }
            match view.result.with_restored(removed.clone(), &record.snapshot) {
                Some(next) => {
                    view.result = next;
                    true
                }
                None => false,
            }
        });
    }

    async fn send<F>(
        &self,
        row: &R,
        context: &RequestContext,
        command_factory: F,
    ) -> Result<(), GridError>
    where
        F: FnOnce(&R) -> Result<GridCommand, GridError> + Send,
    {
        let command = command_factory(row)?;
        let request = self
            .encoder
            .encode_command(&self.resource, &command.action, command.payload, context)?;
        let body = self.transport.send(request).await?;
        decode_command_reply(body)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
