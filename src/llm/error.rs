//! LLM error types

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// LLM error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Transport, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimited, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Map a failed `reqwest` send or body read
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::transport(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            LlmError::transport(format!("Connection failed: {e}"))
        } else {
            LlmError::transport(format!("Request failed: {e}"))
        }
    }

    /// Classify a non-success HTTP status.
    ///
    /// `detail` is the vendor's error message when one could be extracted,
    /// otherwise the raw body.
    pub fn from_status(status: u16, detail: &str) -> Self {
        match status {
            401 | 403 => LlmError::auth(format!("Authentication failed: {detail}")),
            429 => LlmError::rate_limit(format!("Rate limited: {detail}")),
            400 | 404 | 413 | 422 => LlmError::invalid_request(format!("Invalid request: {detail}")),
            500..=599 => LlmError::server_error(format!("Server error: {detail}")),
            _ => LlmError::unknown(format!("HTTP {status}: {detail}")),
        }
    }
}

/// Error classification, stable across vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmErrorKind {
    /// Network issues, timeouts, truncated streams
    Transport,
    /// Missing or rejected credential (401, 403)
    Auth,
    /// Vendor backpressure (429); the caller decides whether to retry
    RateLimited,
    /// Malformed parameters (400) or a model that cannot serve the request
    InvalidRequest,
    /// Vendor-side failure (5xx, overloaded)
    ServerError,
    /// Anything else
    Unknown,
}

impl LlmErrorKind {
    /// Stable tag shown to users and written to logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest => "invalid_request",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether trying again later may succeed. Informational only: nothing in
    /// this crate retries automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::RateLimited | Self::ServerError)
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
