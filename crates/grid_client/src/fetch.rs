//! Query lifecycle: ticketing, loading flags, and last-request-wins commits.

use std::sync::Arc;

use shared::{
    domain::{GridResult, GridRow},
    protocol::RequestContext,
    query::QueryState,
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    encoder::{decode_list, CommandEncoder, GridResource},
    error::GridError,
    state::{GridEvent, GridView},
    transport::GridTransport,
};

pub type SharedView<R> = Arc<watch::Sender<GridView<R>>>;

/// Sequence number of one outbound query. Only the highest issued ticket may
/// commit its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(pub u64);

#[derive(Default)]
struct FetchLedger {
    latest: u64,
    in_flight: Option<JoinHandle<()>>,
}

pub struct FetchCoordinator<R: GridRow> {
    resource: Arc<GridResource>,
    encoder: Arc<CommandEncoder>,
    transport: Arc<dyn GridTransport>,
    view: SharedView<R>,
    events: broadcast::Sender<GridEvent>,
    ledger: Mutex<FetchLedger>,
}

impl<R: GridRow> FetchCoordinator<R> {
    pub fn new(
        resource: Arc<GridResource>,
        encoder: Arc<CommandEncoder>,
        transport: Arc<dyn GridTransport>,
        view: SharedView<R>,
        events: broadcast::Sender<GridEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            resource,
            encoder,
            transport,
            view,
            events,
            ledger: Mutex::new(FetchLedger::default()),
        })
    }

    /// Issues a query for `query` and returns once it is ticketed; the reply is
    /// committed to the shared view in the background. A still-running older
    /// fetch is aborted, though correctness only rests on the ticket check.
    /// Must be called from within a Tokio runtime.
    pub async fn request(
        self: &Arc<Self>,
        query: &QueryState,
        context: &RequestContext,
    ) -> RequestTicket {
        let encoded = self
            .encoder
            .encode_query(&self.resource, &self.resource.query_action, query, context);

        let mut ledger = self.ledger.lock().await;
        let ticket = self.mint(&mut ledger);
        if let Some(previous) = ledger.in_flight.take() {
            previous.abort();
        }

        let request = match encoded {
            Ok(request) => request,
            Err(err) => {
                drop(ledger);
                self.resolve(ticket, Err(err)).await;
                return ticket;
            }
        };

        let this = Arc::clone(self);
        let limit = query.pagination.limit;
        ledger.in_flight = Some(tokio::spawn(async move {
            let outcome = match this.transport.send(request).await {
                Ok(body) => decode_list(&this.resource, body, limit),
                Err(err) => Err(err),
            };
            this.resolve(ticket, outcome).await;
        }));
        ticket
    }

    /// Mints a ticket and raises the loading flag without performing any I/O.
    /// Pair with [`FetchCoordinator::resolve`] when driving fetches by hand.
    pub async fn begin(&self) -> RequestTicket {
        let mut ledger = self.ledger.lock().await;
        self.mint(&mut ledger)
    }

    pub async fn latest(&self) -> RequestTicket {
        RequestTicket(self.ledger.lock().await.latest)
    }

    fn mint(&self, ledger: &mut FetchLedger) -> RequestTicket {
        ledger.latest += 1;
        let ticket = RequestTicket(ledger.latest);
        self.view.send_modify(|view| {
            if view.has_loaded {
                view.is_refetching = true;
            } else {
                view.is_loading = true;
            }
        });
        debug!(ticket = ticket.0, service = %self.resource.service, "issued grid query");
        ticket
    }

    /// Commits `outcome` if `ticket` is still the latest one issued. Returns
    /// whether the outcome was applied; superseded outcomes leave the view
    /// and its flags untouched.
    pub async fn resolve(
        &self,
        ticket: RequestTicket,
        outcome: Result<GridResult<R>, GridError>,
    ) -> bool {
        let mut ledger = self.ledger.lock().await;
        if ticket.0 != ledger.latest {
            debug!(
                ticket = ticket.0,
                latest = ledger.latest,
                "discarding superseded grid response"
            );
            return false;
        }
        ledger.in_flight = None;

        match outcome {
            Ok(result) => {
                debug!(
                    ticket = ticket.0,
                    rows = result.rows.len(),
                    total = result.total,
                    "committed grid response"
                );
                self.view.send_modify(|view| {
                    view.result = result;
                    view.is_error = false;
                    view.last_error = None;
                    view.has_loaded = true;
                    view.revision += 1;
                    view.is_loading = false;
                    view.is_refetching = false;
                });
            }
            Err(err) => {
                warn!(ticket = ticket.0, error = %err, "grid query failed");
                let reason = err.to_string();
                self.view.send_modify(|view| {
                    view.is_error = true;
                    view.last_error = Some(reason.clone());
                    view.is_loading = false;
                    view.is_refetching = false;
                });
                let _ = self.events.send(GridEvent::FetchFailed {
                    category: err.category(),
                    reason,
                });
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "tests/fetch_tests.rs"]
mod tests;
