//! Crate-wide error type.
//!
//! Reasoning-engine timeouts and failed runs are not represented here: the
//! turn controller turns them into scripted replies instead of errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhatnextError {
    /// Malformed or missing request data.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A location query could not be executed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Session cache or profile store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport or protocol failure talking to the reasoning engine.
    #[error("Reasoning engine error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WhatnextError>;

impl From<std::io::Error> for WhatnextError {
    fn from(e: std::io::Error) -> Self {
        WhatnextError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for WhatnextError {
    fn from(e: serde_json::Error) -> Self {
        WhatnextError::Internal(format!("serialization: {}", e))
    }
}

impl From<reqwest::Error> for WhatnextError {
    fn from(e: reqwest::Error) -> Self {
        WhatnextError::Upstream(e.to_string())
    }
}

impl From<toml::de::Error> for WhatnextError {
    fn from(e: toml::de::Error) -> Self {
        WhatnextError::Config(e.to_string())
    }
}

impl WhatnextError {
    /// True for errors caused by the caller rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, WhatnextError::Validation(_) | WhatnextError::NotFound(_))
    }
}
