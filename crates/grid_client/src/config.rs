use std::{fs, path::Path};

use shared::{protocol::RequestContext, query::DEFAULT_PAGE_SIZE};
use toml::Value;
use tracing::warn;

use crate::encoder::{CommandEncoder, DEFAULT_API_VERSION, DEFAULT_CSRF_HEADER};

pub const SETTINGS_FILE: &str = "grid.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSettings {
    pub base_url: String,
    pub query_path: String,
    pub command_path: String,
    pub host_id: Option<String>,
    pub csrf_token: Option<String>,
    pub csrf_header: String,
    pub api_version: String,
    pub page_size: u32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            query_path: "/portal/query".into(),
            command_path: "/portal/command".into(),
            host_id: None,
            csrf_token: None,
            csrf_header: DEFAULT_CSRF_HEADER.into(),
            api_version: DEFAULT_API_VERSION.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl GridSettings {
    pub fn request_context(&self) -> RequestContext {
        RequestContext {
            host_id: self.host_id.clone(),
            csrf_token: self.csrf_token.clone(),
        }
    }

    pub fn encoder(&self) -> CommandEncoder {
        CommandEncoder::new(&self.query_path, &self.command_path)
            .with_csrf_header(&self.csrf_header)
    }
}

pub fn load_settings() -> GridSettings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

/// Defaults, then the TOML file at `path` when readable, then environment.
pub fn load_settings_from(path: &Path) -> GridSettings {
    let mut settings = GridSettings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Integer(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn apply_file(settings: &mut GridSettings, raw: &str) {
    let table = match toml::from_str::<toml::Table>(raw) {
        Ok(table) => table,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable grid settings file");
            return;
        }
    };
    for (key, value) in &table {
        if let Some(value) = text(value) {
            apply_value(settings, key, value);
        }
    }
}

pub(crate) fn apply_env(settings: &mut GridSettings, lookup: impl Fn(&str) -> Option<String>) {
    let overrides = [
        ("GRID_BASE_URL", "base_url"),
        ("APP__BASE_URL", "base_url"),
        ("APP__QUERY_PATH", "query_path"),
        ("APP__COMMAND_PATH", "command_path"),
        ("GRID_HOST_ID", "host_id"),
        ("APP__HOST_ID", "host_id"),
        ("GRID_CSRF_TOKEN", "csrf_token"),
        ("APP__CSRF_TOKEN", "csrf_token"),
        ("APP__CSRF_HEADER", "csrf_header"),
        ("APP__API_VERSION", "api_version"),
        ("APP__PAGE_SIZE", "page_size"),
    ];
    for (var, key) in overrides {
        if let Some(value) = lookup(var) {
            apply_value(settings, key, value);
        }
    }
}

fn apply_value(settings: &mut GridSettings, key: &str, value: String) {
    match key {
        "base_url" => settings.base_url = value,
        "query_path" => settings.query_path = value,
        "command_path" => settings.command_path = value,
        "host_id" => settings.host_id = Some(value),
        "csrf_token" => settings.csrf_token = Some(value),
        "csrf_header" => settings.csrf_header = value,
        "api_version" => settings.api_version = value,
        "page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                settings.page_size = parsed.max(1);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
