use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

pub const MONGO_URI: &str = "MONGO_URI";
pub const LLM_API_KEY: &str = "LLM_API_KEY";
pub const LLM_API_URL: &str = "LLM_API_URL";
pub const LLM_MODEL: &str = "LLM_MODEL";
pub const MONGO_DB: &str = "MONGO_DB";

/// Environment variables injected into every run from the secret store.
pub const TRIGGER_ENV: [&str; 5] = [MONGO_URI, LLM_API_KEY, LLM_API_URL, LLM_MODEL, MONGO_DB];

pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4";
pub const DEFAULT_MONGO_DB: &str = "weather";
pub const DEFAULT_SCHEDULE: &str = "0 12,22 * * *";

/// Longest measurement or reuse window accepted, in hours (one year).
pub const MAX_WINDOW_HOURS: u32 = 24 * 365;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
    /// The setting has no value at all, as opposed to a bad one
    pub missing: bool,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
            missing: false,
        });
    }

    /// Record a required setting that was never provided.
    pub fn add_missing(&mut self, field: impl Into<String>, variable: &str) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: format!("{} is not set", variable),
            missing: true,
        });
    }

    pub fn has_missing(&self) -> bool {
        self.errors.iter().any(|e| e.missing)
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
            missing: false,
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mongo: MongoConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string; normally injected through `MONGO_URI`
    #[serde(default)]
    pub uri: String,

    #[serde(default = "default_mongo_db")]
    pub database: String,
}

fn default_mongo_db() -> String {
    DEFAULT_MONGO_DB.to_string()
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            database: default_mongo_db(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Bearer token; normally injected through `LLM_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Full chat-completions endpoint URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_api_url() -> String {
    DEFAULT_LLM_API_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    8000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_api_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Five-field cron expression, evaluated in UTC
    #[serde(default = "default_cron")]
    pub cron: String,

    /// Hours of measurements fed to each report (default: 12)
    #[serde(default = "default_hours_to_analyze")]
    pub hours_to_analyze: u32,

    /// A non-forced run reuses a prediction younger than this (default: 12)
    #[serde(default = "default_recent_window_hours")]
    pub recent_window_hours: u32,
}

fn default_cron() -> String {
    DEFAULT_SCHEDULE.to_string()
}

fn default_hours_to_analyze() -> u32 {
    12
}

fn default_recent_window_hours() -> u32 {
    12
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            hours_to_analyze: default_hours_to_analyze(),
            recent_window_hours: default_recent_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// SQLite file recording trigger runs
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,
}

fn default_journal_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skycast")
        .join("runs.db")
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
        }
    }
}

/// Presence of each trigger environment variable, in declaration order.
pub fn env_status<F>(lookup: F) -> Vec<(&'static str, bool)>
where
    F: Fn(&str) -> Option<String>,
{
    TRIGGER_ENV
        .iter()
        .map(|name| (*name, lookup(name).is_some_and(|v| !v.trim().is_empty())))
        .collect()
}

impl Config {
    /// Load configuration from an optional TOML file, then apply the
    /// process environment on top.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()).into());
                }
                Self::from_file(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Default config file location (`<config dir>/skycast/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("skycast").join("config.toml"))
    }

    /// Overlay the trigger environment variables. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(uri) = get(MONGO_URI) {
            self.mongo.uri = uri;
        }
        if let Some(db) = get(MONGO_DB) {
            self.mongo.database = db;
        }
        if let Some(key) = get(LLM_API_KEY) {
            self.llm.api_key = key;
        }
        if let Some(url) = get(LLM_API_URL) {
            self.llm.api_url = url;
        }
        if let Some(model) = get(LLM_MODEL) {
            self.llm.model = model;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.mongo.uri.trim().is_empty() {
            result.add_missing("mongo.uri", MONGO_URI);
        } else if !self.mongo.uri.starts_with("mongodb://")
            && !self.mongo.uri.starts_with("mongodb+srv://")
        {
            result.add_error(
                "mongo.uri",
                "Connection string must start with mongodb:// or mongodb+srv://",
            );
        }

        if self.mongo.database.trim().is_empty() {
            result.add_error("mongo.database", format!("{} is empty", MONGO_DB));
        }

        if self.llm.api_key.trim().is_empty() {
            result.add_missing("llm.api_key", LLM_API_KEY);
        }

        self.validate_url(&self.llm.api_url, "llm.api_url", &mut result);

        if self.llm.model.trim().is_empty() {
            result.add_error("llm.model", format!("{} is empty", LLM_MODEL));
        }

        if self.llm.timeout_secs == 0 {
            result.add_error("llm.timeout_secs", "Timeout must be greater than 0");
        }

        if self.llm.initial_retry_delay_ms > self.llm.max_retry_delay_ms {
            result.add_warning(
                "llm.initial_retry_delay_ms",
                "Initial retry delay exceeds the maximum; every retry waits the maximum",
            );
        }

        if self.schedule.cron.split_whitespace().count() != 5 {
            result.add_error(
                "schedule.cron",
                format!("Expected five cron fields, got: {}", self.schedule.cron),
            );
        }

        if self.schedule.hours_to_analyze == 0 {
            result.add_error("schedule.hours_to_analyze", "Must be at least 1 hour");
        } else if self.schedule.hours_to_analyze > MAX_WINDOW_HOURS {
            result.add_error(
                "schedule.hours_to_analyze",
                format!("Must be at most {} hours", MAX_WINDOW_HOURS),
            );
        } else if self.schedule.hours_to_analyze > 168 {
            result.add_warning(
                "schedule.hours_to_analyze",
                "More than a week of measurements per report",
            );
        }

        if self.schedule.recent_window_hours > MAX_WINDOW_HOURS {
            result.add_error(
                "schedule.recent_window_hours",
                format!("Must be at most {} hours", MAX_WINDOW_HOURS),
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                } else if url.scheme() == "http" {
                    result.add_warning(field_name, "API key will be sent over plain http");
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }
}
