//! Error types for neon-branch

use thiserror::Error;

/// Errors that can occur while talking to the branch provider
#[derive(Error, Debug)]
pub enum NeonError {
    /// Provider client could not be configured
    #[error("Neon client configuration invalid: {0}")]
    Config(String),

    /// Request never produced a response
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider answered with a non-success status
    #[error("Neon API returned {status} for {operation}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected Neon API response for {operation}: {reason}")]
    UnexpectedResponse {
        operation: &'static str,
        reason: String,
    },

    /// Branch does not exist
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// Endpoint host and credentials do not form a valid connection URL
    #[error("cannot build connection URL for host {host:?}: {reason}")]
    InvalidConnection { host: String, reason: String },
}

impl From<reqwest::Error> for NeonError {
    fn from(err: reqwest::Error) -> Self {
        NeonError::Http(err.to_string())
    }
}
