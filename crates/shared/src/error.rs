use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the query and command endpoints under `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{description}")]
pub struct ErrorStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl ErrorStatus {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            status_code: None,
            code: None,
            message: None,
            description: description.into(),
            severity: None,
        }
    }
}
