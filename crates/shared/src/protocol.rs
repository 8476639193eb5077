use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorStatus;

pub const HOST_ID_FIELD: &str = "hostId";

/// Transport wrapper sent to both the query and the command endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub host: String,
    pub service: String,
    pub action: String,
    pub version: String,
    pub data: Value,
}

/// Cross-cutting values attached to every request. Supplied by the caller on
/// each call; never looked up from ambient state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub host_id: Option<String>,
    pub csrf_token: Option<String>,
}

impl RequestContext {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: Some(host_id.into()),
            csrf_token: None,
        }
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// The tenant identity, if present and non-blank.
    pub fn host_id(&self) -> Option<&str> {
        self.host_id
            .as_deref()
            .map(str::trim)
            .filter(|host_id| !host_id.is_empty())
    }
}

/// Reply of the command endpoint: `{ data }` on success, `{ error }` on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorStatus>,
}

impl CommandReply {
    pub fn into_result(self) -> Result<Value, ErrorStatus> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}
