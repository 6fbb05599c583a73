//! Error types for the vulnfeeds crate.
//!
//! This module provides the crate-wide error type [`FeedError`]. The failure
//! taxonomy follows the pipeline's policy: fetch and parse errors are logged
//! at the call site and the affected unit of work is skipped; only unusable
//! configuration aborts a run.

use std::io;

/// The main error type for all operations in this crate.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Failed to fetch data from a feed.
    #[error("Source '{source_name}' fetch failed: {message}")]
    Fetch {
        /// Name of the feed that failed (e.g., "NVD", "Microsoft").
        source_name: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Malformed record contents (unparseable date, missing expected field).
    #[error("Parse error: {0}")]
    Parse(String),

    /// A source returned a page or document with an unexpected shape.
    #[error("Source '{source_name}' schema mismatch: {message}")]
    SchemaMismatch {
        source_name: String,
        message: String,
    },

    /// Configuration error (missing or invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding or decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request via middleware failed.
    #[error("HTTP middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error (file operations, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

impl FeedError {
    /// Create a new fetch error.
    pub fn fetch(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source.into(),
            message: message.into(),
        }
    }

    /// Create a new parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new schema mismatch error.
    pub fn schema(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            source_name: source.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error aborts the run instead of skipping a unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
