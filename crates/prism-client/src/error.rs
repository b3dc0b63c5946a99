//! Prism client errors

use thiserror::Error;

/// Errors that can occur when interacting with the Prism Central API
#[derive(Debug, Error)]
pub enum PrismError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Prism Central returned a non-success status
    #[error("{context} failed: {status} - {body}")]
    Api {
        /// Request line, e.g. `GET /api/prism/v4.0/config/tasks/{id}`
        context: String,
        /// HTTP status code
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (bad credentials, locked account, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// TLS configuration could not be applied (malformed trust bundle)
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl PrismError {
    /// Returns true if the error is a 404 from the API
    pub fn is_not_found(&self) -> bool {
        matches!(self, PrismError::NotFound(_))
    }
}
