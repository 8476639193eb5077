//! Wire-level data model shared by grid clients: view state, rows, envelopes.

pub mod domain;
pub mod error;
pub mod protocol;
pub mod query;
