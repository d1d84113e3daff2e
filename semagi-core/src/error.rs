//! Error types for the SEMagi client core.
//!
//! - [`ConfigError`]: local, pre-flight problems. Never retried; the user fixes
//!   the input and runs again.
//! - [`TransportError`]: failures at the network/server boundary. Only
//!   [`TransportError::Network`] and [`TransportError::Server`] are transient.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration and input errors raised before any network call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// No API key in the settings document, environment or command line.
    #[error("missing API key: set `api_key` in the settings file or SEMAGI_API_KEY")]
    MissingCredential,

    /// A required field has no value at any configuration layer.
    #[error("missing required setting `{0}`")]
    MissingField(&'static str),

    #[error("invalid function `{0}`: expected `group-only` or `scrap-and-group`")]
    InvalidFunction(String),

    #[error("invalid grouper `{0}`: expected `hierarchical_clustering` or `jaccard`")]
    InvalidGrouper(String),

    #[error("input file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The input file extension does not match the chosen function.
    #[error("{function} requires a {expected} file, got `{found}`")]
    FormatMismatch {
        function: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("`{field}` is out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    /// The input file exists but its content cannot be used.
    #[error("invalid input file {}: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("cannot read settings file {}: {reason}", .path.display())]
    SettingsUnreadable { path: PathBuf, reason: String },

    #[error("cannot parse settings file {}: {reason}", .path.display())]
    SettingsInvalid { path: PathBuf, reason: String },
}

/// Failures reported by a [`crate::contract::TaskApi`] implementation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Connection failure or request timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The API key was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Another task is already running for this account. The server's message
    /// is kept verbatim.
    #[error("{0}")]
    Conflict(String),

    /// The server answered with a 5xx status.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("task not found: {0}")]
    NotFound(String),

    /// Results were requested before the server finished preparing them.
    #[error("results not ready yet for task {0}")]
    NotReady(String),

    /// Any other 4xx answer.
    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response from server: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Transient failures worth repeating the same call for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Server { .. })
    }
}
