//! Centralized error types for SkyCast.
//!
//! Library crates return these typed errors; the binary wraps them in
//! `anyhow` for context and turns any failure into a non-zero exit.

use thiserror::Error;

/// Top-level error for a prediction run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("No hourly measurements found for the last {hours} hours")]
    NoMeasurements { hours: u32 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AppError {
    /// Short operator-facing message for the final log line of a failed run.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Llm(e) => e.user_message(),
            AppError::NoMeasurements { .. } => {
                "No recent measurements. Check that the collector is running."
            }
            AppError::InvalidRequest(_) => "The prediction request was rejected.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "Unable to connect. Check network access.",
            NetworkError::Timeout => "The request timed out.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The remote service is experiencing issues."
            }
            NetworkError::ServerError { .. } => "The request was rejected.",
            NetworkError::InvalidResponse(_) => "Received an unexpected response.",
        }
    }
}

/// Storage errors (MongoDB weather store, SQLite run journal).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "Unable to reach the database. Check MONGO_URI.",
            DatabaseError::QueryFailed(_) => "A database operation failed.",
            DatabaseError::Malformed(_) => "A stored document has an unexpected shape.",
            DatabaseError::Corruption(_) => "Local run journal may be corrupted.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration file not found.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed.",
            ConfigError::MissingSetting(_) => {
                "A required environment variable is missing. Check the secret store."
            }
        }
    }
}

/// Errors talking to the chat-completions endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Network(#[from] NetworkError),

    #[error("API request failed with status code {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unauthorized - LLM_API_KEY may be invalid")]
    Unauthorized,

    #[error("Response contained no message content")]
    EmptyResponse,

    #[error("Could not parse report JSON: {0}")]
    InvalidReport(String),
}

impl LlmError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LlmError::Network(e) => e.user_message(),
            LlmError::Api { status, .. } if *status >= 500 => {
                "The LLM service is experiencing issues."
            }
            LlmError::Api { .. } => "The LLM service rejected the request.",
            LlmError::Unauthorized => "LLM API key is invalid. Check LLM_API_KEY.",
            LlmError::EmptyResponse | LlmError::InvalidReport(_) => {
                "The LLM returned an unusable report."
            }
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corruption(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}

/// Extension trait for converting MongoDB driver errors to our error types.
pub trait MongoErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl MongoErrorExt for mongodb::error::Error {
    fn into_database_error(self) -> DatabaseError {
        use mongodb::error::ErrorKind;

        match self.kind.as_ref() {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Io(_) => DatabaseError::ConnectionFailed(self.to_string()),
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                DatabaseError::Malformed(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let err: AppError = ConfigError::MissingSetting("MONGO_URI".into()).into();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::MissingSetting(ref name)) if name == "MONGO_URI"
        ));
    }

    #[test]
    fn test_user_message_propagation() {
        let err = AppError::Llm(LlmError::Unauthorized);
        assert_eq!(err.user_message(), "LLM API key is invalid. Check LLM_API_KEY.");

        let err = AppError::Llm(LlmError::Network(NetworkError::Timeout));
        assert_eq!(err.user_message(), "The request timed out.");

        let err = AppError::InvalidRequest("window too long".into());
        assert_eq!(err.to_string(), "Invalid request: window too long");
        assert_eq!(err.user_message(), "The prediction request was rejected.");
    }

    #[test]
    fn test_no_measurements_message_names_window() {
        let err = AppError::NoMeasurements { hours: 12 };
        assert_eq!(
            err.to_string(),
            "No hourly measurements found for the last 12 hours"
        );
    }

    #[test]
    fn test_api_error_status_split() {
        let server = LlmError::Api {
            status: 503,
            body: "down".into(),
        };
        let client = LlmError::Api {
            status: 400,
            body: "bad".into(),
        };
        assert_ne!(server.user_message(), client.user_message());
        assert!(server.to_string().contains("503"));
    }
}
