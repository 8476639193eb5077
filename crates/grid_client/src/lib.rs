//! Remote data grid controller: turns page/sort/filter view state into portal
//! queries, commits only the newest reply, and applies optimistic deletes
//! with rollback.

pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod fetch;
pub mod mutation;
pub mod state;
pub mod transport;

pub use controller::GridController;
pub use encoder::{CommandEncoder, GridCommand, GridResource, TransportMethod, TransportRequest};
pub use error::{ErrorCategory, GridError};
pub use fetch::{FetchCoordinator, RequestTicket};
pub use mutation::{
    AlwaysConfirm, Confirmation, MutationExecutor, MutationKind, MutationOutcome, MutationPrompt,
};
pub use state::{GridEvent, GridStatus, GridView};
pub use transport::{GridTransport, HttpTransport};

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;
