//! Composition root binding one page's view state to its remote collection.

use std::sync::Arc;

use shared::{
    domain::GridRow,
    protocol::RequestContext,
    query::{QueryChange, QueryState},
};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::debug;

use crate::{
    config::GridSettings,
    encoder::{CommandEncoder, GridCommand, GridResource},
    error::GridError,
    fetch::{FetchCoordinator, RequestTicket, SharedView},
    mutation::{Confirmation, MutationExecutor, MutationKind, MutationOutcome},
    state::{GridEvent, GridStatus, GridView},
    transport::{GridTransport, HttpTransport},
};

const EVENT_CAPACITY: usize = 64;

pub struct GridController<R: GridRow> {
    resource: Arc<GridResource>,
    query: Mutex<QueryState>,
    context: Mutex<RequestContext>,
    view: SharedView<R>,
    events: broadcast::Sender<GridEvent>,
    fetcher: Arc<FetchCoordinator<R>>,
    mutations: MutationExecutor<R>,
}

impl<R: GridRow> GridController<R> {
    pub fn new(
        resource: GridResource,
        encoder: CommandEncoder,
        transport: Arc<dyn GridTransport>,
        query: QueryState,
    ) -> Self {
        let resource = Arc::new(resource);
        let encoder = Arc::new(encoder);
        let view = Arc::new(watch::Sender::new(GridView::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let fetcher = FetchCoordinator::new(
            Arc::clone(&resource),
            Arc::clone(&encoder),
            Arc::clone(&transport),
            Arc::clone(&view),
            events.clone(),
        );
        let mutations = MutationExecutor::new(
            Arc::clone(&resource),
            encoder,
            transport,
            Arc::clone(&view),
            events.clone(),
        );

        Self {
            resource,
            query: Mutex::new(query),
            context: Mutex::new(RequestContext::default()),
            view,
            events,
            fetcher,
            mutations,
        }
    }

    /// HTTP-backed controller using the endpoints, API version and page size
    /// in `settings`. The request context still has to be supplied through
    /// `set_context`.
    pub fn from_settings(resource: GridResource, settings: &GridSettings) -> Self {
        Self::new(
            resource.with_version(&settings.api_version),
            settings.encoder(),
            Arc::new(HttpTransport::new(&settings.base_url)),
            QueryState::new(settings.page_size),
        )
    }

    pub fn resource(&self) -> &GridResource {
        &self.resource
    }

    /// Updates the per-request context. No query goes out while the host
    /// identity is missing; the first time it appears, and whenever it changes,
    /// exactly one query is issued.
    pub async fn set_context(&self, context: RequestContext) -> Option<RequestTicket> {
        let host_changed = {
            let mut current = self.context.lock().await;
            let changed = current.host_id() != context.host_id();
            *current = context;
            changed
        };
        if !host_changed {
            return None;
        }
        self.refetch().await
    }

    pub async fn query_state(&self) -> QueryState {
        self.query.lock().await.clone()
    }

    /// Single entry point for view-state changes. Identical states are ignored.
    pub async fn on_query_state_change(&self, next: QueryState) -> Option<RequestTicket> {
        let mut current = self.query.lock().await;
        if *current == next {
            return None;
        }
        *current = next;
        self.issue(&current).await
    }

    pub async fn apply_change(&self, change: QueryChange) -> Option<RequestTicket> {
        let mut current = self.query.lock().await;
        let next = current.with_change(change);
        if *current == next {
            return None;
        }
        *current = next;
        self.issue(&current).await
    }

    /// Re-issues the current query. Returns `None` while no host identity is
    /// available.
    pub async fn refetch(&self) -> Option<RequestTicket> {
        let current = self.query.lock().await;
        self.issue(&current).await
    }

    // Callers hold the query lock so tickets are minted in the same order the
    // states were written.
    async fn issue(&self, query: &QueryState) -> Option<RequestTicket> {
        let context = self.context.lock().await.clone();
        if context.host_id().is_none() {
            debug!(service = %self.resource.service, "grid idle until host identity is available");
            return None;
        }
        Some(self.fetcher.request(query, &context).await)
    }

    pub fn view(&self) -> GridView<R> {
        self.view.borrow().clone()
    }

    pub fn status(&self) -> GridStatus {
        self.view.borrow().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<GridView<R>> {
        self.view.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GridEvent> {
        self.events.subscribe()
    }

    /// Optimistically removes `row` and sends the configured delete command.
    pub async fn delete(
        &self,
        row: &R,
        confirmation: &dyn Confirmation,
    ) -> Result<MutationOutcome, GridError> {
        let action = self
            .resource
            .delete_action
            .clone()
            .ok_or(GridError::Unsupported("delete action"))?;
        let context = self.context.lock().await.clone();
        Ok(self
            .mutations
            .mutate(row, MutationKind::Delete, &context, confirmation, |row| {
                GridCommand::for_row(action, row)
            })
            .await)
    }

    /// Sends `command` as an update of `row`. The visible rows are left alone;
    /// the caller follows up with `refresh_one` or `refetch`.
    pub async fn update(
        &self,
        row: &R,
        command: GridCommand,
        confirmation: &dyn Confirmation,
    ) -> MutationOutcome {
        let context = self.context.lock().await.clone();
        self.mutations
            .mutate(row, MutationKind::Update, &context, confirmation, |_| Ok(command))
            .await
    }

    /// Swaps in a fresh copy of a row already on the page. Returns whether a
    /// row with the same key was found.
    pub fn refresh_one(&self, row: R) -> bool {
        self.view.send_if_modified(|view| match view.result.with_replaced(row) {
            Some(next) => {
                view.result = next;
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
