//! Network seam between the grid and the portal endpoints.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::Value;
use shared::{error::ErrorStatus, protocol::CommandReply};
use tracing::debug;

use crate::{
    encoder::{TransportMethod, TransportRequest},
    error::GridError,
};

#[async_trait]
pub trait GridTransport: Send + Sync {
    /// Performs one request and returns the parsed JSON body of a 2xx reply.
    async fn send(&self, request: TransportRequest) -> Result<Value, GridError>;
}

pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Non-2xx replies from the portal usually carry a status object, either bare
/// or wrapped in `{ error }`.
fn rejected_status(body: &str) -> Option<ErrorStatus> {
    if let Ok(CommandReply {
        error: Some(error), ..
    }) = serde_json::from_str::<CommandReply>(body)
    {
        return Some(error);
    }
    serde_json::from_str::<ErrorStatus>(body)
        .ok()
        .filter(|status| !status.description.is_empty())
}

#[async_trait]
impl GridTransport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<Value, GridError> {
        let url = format!("{}{}", self.base_url, request.target());
        let mut builder = match request.method {
            TransportMethod::Get => self.http.get(url),
            TransportMethod::Post => self
                .http
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(request.payload.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let res = builder.send().await?;
        let status = res.status();
        let body = res.text().await?;
        debug!(status = status.as_u16(), path = %request.path, "portal reply");

        if !status.is_success() {
            return Err(match rejected_status(&body) {
                Some(error) => GridError::Application(error),
                None => GridError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|err| GridError::Decode(err.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
