//! Typed application configuration.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::AppError;
use aleph_index_repository::config::DEFAULT_INDEX_PREFIX;
use aleph_store::DEFAULT_DATABASE_URL;

/// Default OpenSearch URL.
pub const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

const DEFAULT_UI_URL: &str = "http://localhost:8080/";
const DEFAULT_APP_NAME: &str = "aleph";

/// Keys read by [`AppConfig::from_env`] whose values are booleans.
const BOOL_KEYS: [&str; 5] = [
    "DEBUG",
    "TESTING",
    "CACHE",
    "PRESERVE_CONTEXT_ON_EXCEPTION",
    "RUN_JOBS_INLINE",
];

const STRING_KEYS: [&str; 9] = [
    "SECRET_KEY",
    "ARCHIVE_TYPE",
    "ARCHIVE_PATH",
    "APP_UI_URL",
    "APP_NAME",
    "DATABASE_URL",
    "OPENSEARCH_URL",
    "INDEX_PREFIX",
    "SEARCH_BACKEND",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    #[default]
    Opensearch,
    Memory,
}

/// Application configuration. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    pub debug: bool,
    pub testing: bool,
    pub cache: bool,
    pub secret_key: String,
    pub archive_type: ArchiveType,
    pub archive_path: Option<PathBuf>,
    pub app_ui_url: String,
    pub app_name: String,
    pub preserve_context_on_exception: bool,
    pub run_jobs_inline: bool,
    pub database_url: String,
    pub opensearch_url: String,
    pub index_prefix: String,
    pub search_backend: SearchBackend,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            testing: false,
            cache: false,
            secret_key: String::new(),
            archive_type: ArchiveType::File,
            archive_path: None,
            app_ui_url: DEFAULT_UI_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            preserve_context_on_exception: false,
            run_jobs_inline: true,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            opensearch_url: DEFAULT_OPENSEARCH_URL.to_string(),
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            search_backend: SearchBackend::Opensearch,
        }
    }
}

impl AppConfig {
    /// Build a config from a key/value map. Missing keys take their default.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(map)).map_err(|e| AppError::config(e.to_string()))
    }

    /// Build a config from environment variables, after loading `.env`.
    ///
    /// # Environment Variables
    ///
    /// - `DEBUG`, `TESTING`, `CACHE`, `PRESERVE_CONTEXT_ON_EXCEPTION`,
    ///   `RUN_JOBS_INLINE`: `true`/`false` or `1`/`0`
    /// - `SECRET_KEY`, `APP_UI_URL`, `APP_NAME`
    /// - `ARCHIVE_TYPE` (`file` | `memory`), `ARCHIVE_PATH`
    /// - `DATABASE_URL` (default: sqlite::memory:)
    /// - `OPENSEARCH_URL` (default: http://localhost:9200)
    /// - `INDEX_PREFIX` (default: aleph)
    /// - `SEARCH_BACKEND` (`opensearch` | `memory`)
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();

        let mut map = Map::new();
        for key in BOOL_KEYS {
            if let Ok(raw) = env::var(key) {
                map.insert(key.to_string(), Value::Bool(parse_bool(key, &raw)?));
            }
        }
        for key in STRING_KEYS {
            if let Ok(raw) = env::var(key) {
                map.insert(key.to_string(), Value::String(raw));
            }
        }
        Self::from_map(map)
    }

    /// Check the settings that have no usable default.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.secret_key.trim().is_empty() {
            return Err(AppError::config("SECRET_KEY must not be empty"));
        }
        if self.archive_type == ArchiveType::File && self.archive_path.is_none() {
            return Err(AppError::config("ARCHIVE_PATH is required for the file archive"));
        }
        Url::parse(&self.app_ui_url)
            .map_err(|e| AppError::config(format!("APP_UI_URL is invalid: {}", e)))?;
        Ok(())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::config(format!("{} is not a boolean: {}", key, other))),
    }
}
