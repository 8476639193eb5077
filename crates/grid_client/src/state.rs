//! The visible grid tuple and the notices emitted alongside it.

use shared::domain::{GridResult, RowKey};

use crate::error::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStatus {
    Idle,
    Loading,
    Refetching,
    Error,
}

/// Rows plus fetch flags. Every writer replaces this as a whole through the
/// watch channel, so observers never see a half-applied update.
#[derive(Debug, Clone, PartialEq)]
pub struct GridView<R> {
    pub result: GridResult<R>,
    pub is_loading: bool,
    pub is_refetching: bool,
    pub is_error: bool,
    pub last_error: Option<String>,
    /// A successful response has been committed at least once.
    pub has_loaded: bool,
    /// Bumped on every committed fetch response.
    pub revision: u64,
}

impl<R> Default for GridView<R> {
    fn default() -> Self {
        Self {
            result: GridResult::default(),
            is_loading: false,
            is_refetching: false,
            is_error: false,
            last_error: None,
            has_loaded: false,
            revision: 0,
        }
    }
}

impl<R> GridView<R> {
    pub fn status(&self) -> GridStatus {
        if self.is_loading {
            GridStatus::Loading
        } else if self.is_refetching {
            GridStatus::Refetching
        } else if self.is_error {
            GridStatus::Error
        } else {
            GridStatus::Idle
        }
    }

    pub fn in_flight(&self) -> bool {
        self.is_loading || self.is_refetching
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    FetchFailed {
        category: ErrorCategory,
        reason: String,
    },
    MutationCommitted {
        key: RowKey,
    },
    MutationRolledBack {
        key: RowKey,
        reason: String,
    },
}
