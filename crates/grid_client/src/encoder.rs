//! Envelope construction for query reads and command writes, and decoding of
//! the replies.

use serde_json::{Map, Value};
use shared::{
    domain::{GridResult, GridRow, AGGREGATE_VERSION_FIELD},
    error::ErrorStatus,
    protocol::{CommandReply, Envelope, RequestContext, HOST_ID_FIELD},
    query::QueryState,
};
use tracing::warn;
use url::form_urlencoded;

use crate::error::GridError;

pub const DEFAULT_ENVELOPE_HOST: &str = "lightapi.net";
pub const DEFAULT_API_VERSION: &str = "0.1.0";
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF-TOKEN";
pub const QUERY_PARAM: &str = "cmd";

/// Static routing metadata for one admin page.
#[derive(Debug, Clone, PartialEq)]
pub struct GridResource {
    pub host: String,
    pub service: String,
    pub query_action: String,
    /// Field of the query reply holding the row array, e.g. `apps`.
    pub list_field: String,
    pub delete_action: Option<String>,
    pub version: String,
    /// Extra `data` fields merged into every query.
    pub domain_filters: Map<String, Value>,
}

impl GridResource {
    pub fn new(
        service: impl Into<String>,
        query_action: impl Into<String>,
        list_field: impl Into<String>,
    ) -> Self {
        Self {
            host: DEFAULT_ENVELOPE_HOST.to_string(),
            service: service.into(),
            query_action: query_action.into(),
            list_field: list_field.into(),
            delete_action: None,
            version: DEFAULT_API_VERSION.to_string(),
            domain_filters: Map::new(),
        }
    }

    pub fn with_delete_action(mut self, action: impl Into<String>) -> Self {
        self.delete_action = Some(action.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_domain_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.domain_filters.insert(field.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMethod {
    Get,
    Post,
}

/// Fully rendered request: for reads `payload` travels as the `cmd` query
/// parameter, for writes it is the JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: TransportMethod,
    pub path: String,
    pub payload: String,
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    /// Path plus query string, relative to the base url.
    pub fn target(&self) -> String {
        match self.method {
            TransportMethod::Get => {
                let encoded: String =
                    form_urlencoded::byte_serialize(self.payload.as_bytes()).collect();
                format!("{}?{QUERY_PARAM}={encoded}", self.path)
            }
            TransportMethod::Post => self.path.clone(),
        }
    }
}

/// A write to send for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCommand {
    pub action: String,
    pub payload: Value,
}

impl GridCommand {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }

    /// The full row as payload, carrying its concurrency token. A row the
    /// server issued without a token cannot be written.
    pub fn for_row<R: GridRow>(action: impl Into<String>, row: &R) -> Result<Self, GridError> {
        let version = row.aggregate_version().ok_or_else(|| {
            GridError::Encode(format!(
                "row {} has no `{AGGREGATE_VERSION_FIELD}`",
                row.key()
            ))
        })?;
        let mut payload =
            serde_json::to_value(row).map_err(|err| GridError::Encode(err.to_string()))?;
        let Value::Object(fields) = &mut payload else {
            return Err(GridError::Encode("row must serialize to a JSON object".into()));
        };
        fields
            .entry(AGGREGATE_VERSION_FIELD)
            .or_insert_with(|| Value::from(version));
        Ok(Self::new(action, payload))
    }
}

#[derive(Debug, Clone)]
pub struct CommandEncoder {
    query_path: String,
    command_path: String,
    csrf_header: String,
}

impl CommandEncoder {
    pub fn new(query_path: impl Into<String>, command_path: impl Into<String>) -> Self {
        Self {
            query_path: query_path.into(),
            command_path: command_path.into(),
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
        }
    }

    pub fn with_csrf_header(mut self, header: impl Into<String>) -> Self {
        self.csrf_header = header.into();
        self
    }

    pub fn encode_query(
        &self,
        resource: &GridResource,
        action: &str,
        query: &QueryState,
        context: &RequestContext,
    ) -> Result<TransportRequest, GridError> {
        let host_id = context.host_id().ok_or(GridError::MissingContext)?;

        let mut data = resource.domain_filters.clone();
        data.insert(HOST_ID_FIELD.into(), Value::from(host_id));
        data.insert("offset".into(), Value::from(query.pagination.offset));
        data.insert("limit".into(), Value::from(query.pagination.limit));
        // Empty collections still go out as "[]" so the server can tell them
        // apart from an omitted field.
        data.insert("sorting".into(), Value::from(to_json_string(&query.sorting)?));
        data.insert("filters".into(), Value::from(to_json_string(&query.column_filters)?));
        data.insert("globalFilter".into(), Value::from(query.global_filter.clone()));

        let envelope = envelope(resource, action, Value::Object(data));
        Ok(TransportRequest {
            method: TransportMethod::Get,
            path: self.query_path.clone(),
            payload: to_json_string(&envelope)?,
            headers: self.headers(context),
        })
    }

    pub fn encode_command(
        &self,
        resource: &GridResource,
        action: &str,
        payload: Value,
        context: &RequestContext,
    ) -> Result<TransportRequest, GridError> {
        let host_id = context.host_id().ok_or(GridError::MissingContext)?;
        let Value::Object(mut data) = payload else {
            return Err(GridError::Encode("command payload must be a JSON object".into()));
        };
        // A row carries its own tenant; only fill it in when missing.
        data.entry(HOST_ID_FIELD).or_insert_with(|| Value::from(host_id));

        let envelope = envelope(resource, action, Value::Object(data));
        Ok(TransportRequest {
            method: TransportMethod::Post,
            path: self.command_path.clone(),
            payload: to_json_string(&envelope)?,
            headers: self.headers(context),
        })
    }

    fn headers(&self, context: &RequestContext) -> Vec<(String, String)> {
        context
            .csrf_token
            .iter()
            .map(|token| (self.csrf_header.clone(), token.clone()))
            .collect()
    }
}

fn envelope(resource: &GridResource, action: &str, data: Value) -> Envelope {
    Envelope {
        host: resource.host.clone(),
        service: resource.service.clone(),
        action: action.to_string(),
        version: resource.version.clone(),
        data,
    }
}

fn to_json_string<T: serde::Serialize>(value: &T) -> Result<String, GridError> {
    serde_json::to_string(value).map_err(|err| GridError::Encode(err.to_string()))
}

fn application_error(body: &Map<String, Value>) -> Option<GridError> {
    let error = body.get("error")?.clone();
    serde_json::from_value::<ErrorStatus>(error)
        .ok()
        .map(GridError::Application)
}

/// Parses `{ <list_field>: [...], total }`. A missing or null list is an empty
/// page; a missing `total` is a shape error. Rows beyond `limit` are dropped.
pub fn decode_list<R: GridRow>(
    resource: &GridResource,
    body: Value,
    limit: u32,
) -> Result<GridResult<R>, GridError> {
    let Value::Object(mut body) = body else {
        return Err(GridError::Decode("query reply is not a JSON object".into()));
    };
    if let Some(err) = application_error(&body) {
        return Err(err);
    }

    let total = body
        .get("total")
        .and_then(Value::as_u64)
        .ok_or_else(|| GridError::Decode("query reply has no numeric `total`".into()))?;
    let mut rows: Vec<R> = match body.remove(&resource.list_field) {
        None | Some(Value::Null) => Vec::new(),
        Some(list) => serde_json::from_value(list).map_err(|err| {
            GridError::Decode(format!("invalid `{}` rows: {err}", resource.list_field))
        })?,
    };
    let limit = limit as usize;
    if rows.len() > limit {
        warn!(
            service = %resource.service,
            rows = rows.len(),
            limit,
            "query reply exceeds page size; truncating"
        );
        rows.truncate(limit);
    }

    Ok(GridResult { rows, total })
}

pub fn decode_command_reply(body: Value) -> Result<Value, GridError> {
    let reply: CommandReply =
        serde_json::from_value(body).map_err(|err| GridError::Decode(err.to_string()))?;
    Ok(reply.into_result()?)
}

#[cfg(test)]
#[path = "tests/encoder_tests.rs"]
mod tests;
