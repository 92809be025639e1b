//! # Crawler Core Error Types
//!
//! Structured error handling for the admission and governance subsystem using
//! thiserror for typed variants instead of `Box<dyn Error>` patterns.
//!
//! Only infrastructure failures live here. Negative admission decisions,
//! conflicts on terminal failure records, and unknown-id lookups are normal
//! outcomes and are modeled as data on the operations that produce them.

use thiserror::Error;

/// Infrastructure error types for the crawler core
#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("Database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Queue transport error on {queue_name}: {operation}: {message}")]
    Transport {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {field}: {message}")]
    Configuration { field: String, message: String },

    #[error("Unknown queue: {queue_name}")]
    UnknownQueue { queue_name: String },
}

impl CrawlerError {
    /// Database error with operation context
    pub fn database(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        CrawlerError::Database {
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    /// Transport error with queue and operation context
    pub fn transport(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        source: impl std::fmt::Display,
    ) -> Self {
        CrawlerError::Transport {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    /// Configuration error for a specific field
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        CrawlerError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for CrawlerError {
    fn from(err: sqlx::Error) -> Self {
        CrawlerError::Database {
            operation: "query".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CrawlerError {
    fn from(err: serde_json::Error) -> Self {
        CrawlerError::Serialization {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrawlerError>;
