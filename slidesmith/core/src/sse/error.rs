//! Transport errors

use thiserror::Error;

/// Failure of a generation stream
///
/// Cancellation has its own variant so callers never have to guess from the
/// message whether a stop was requested.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection broke
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("{message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Message from the error body, or `HTTP error: <status>`
        message: String,
    },

    /// Reading the response body failed
    #[error("Stream read failed: {0}")]
    Read(String),

    /// The body ended without a `done` or `error` event
    #[error("Stream ended before generation completed")]
    UnexpectedEof,

    /// The request was rejected before anything was sent
    #[error("{0}")]
    Invalid(#[from] crate::prompt::RequestError),

    /// The model backend could not start a completion
    #[error("Backend error: {0}")]
    Backend(String),

    /// The local request limiter refused the call
    #[error("{0}")]
    RateLimited(#[from] crate::limit::RateLimited),

    /// The consumer cancelled the stream
    #[error("Stream cancelled")]
    Cancelled,
}

impl TransportError {
    /// Build an HTTP error from a status and an optional body message
    #[must_use]
    pub fn http(status: u16, message: Option<String>) -> Self {
        Self::Http {
            status,
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("HTTP error: {status}")),
        }
    }

    /// Whether this error stands for a requested stop
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
