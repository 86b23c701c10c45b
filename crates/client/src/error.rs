//! Error types for the client runtime
//!
//! - [`ClientError`]: everything a client operation can fail with
//! - [`ConfigError`]: invalid configuration values
//!
//! Enrichment failures never surface here; they degrade to
//! [`Address::Unavailable`](crate::Address::Unavailable).

use std::time::Duration;

use stratus_credential::CredentialError;
use stratus_resilience::PolicyError;
use thiserror::Error;

/// Result alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client operation error
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP request itself failed (connect, TLS, timeout, body read)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The login request was rejected
    #[error("authentication failed for '{principal}': {reason}")]
    Authentication {
        /// Principal that tried to log in
        principal: String,
        /// Server-provided or derived reason
        reason: String,
    },

    /// The server kept answering 401 after a fresh login
    #[error("unauthorized: session rejected after re-authentication")]
    Unauthorized,

    /// Non-success HTTP status other than 401
    #[error("API error {status} on {path}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Request path relative to the API root
        path: String,
        /// Excerpt of the response body
        message: String,
    },

    /// The body did not have the expected `{"data": ...}` shape
    #[error("unexpected response format from {path}: {reason}")]
    UnexpectedResponse {
        /// Request path relative to the API root
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// A task finished with a non-OK exit status
    #[error("task {upid} failed: {exit_status}")]
    TaskFailed {
        /// Task identifier
        upid: String,
        /// Exit string reported by the server
        exit_status: String,
    },

    /// The task did not finish within the configured deadline
    #[error("task {upid} did not finish within {after:?}")]
    TaskTimeout {
        /// Task identifier
        upid: String,
        /// Configured deadline
        after: Duration,
    },

    /// A request could not be built from the given arguments
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No guest with this id in the inventory
    #[error("guest {0} not found")]
    GuestNotFound(u32),

    /// The caller cancelled the wait
    #[error("operation cancelled")]
    Cancelled,

    /// Credential source failure
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error wrapped with a fixed description of the failing step
    #[error("{context}: {source}")]
    Context {
        /// What was being done
        context: &'static str,
        /// Underlying error
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Wrap with a static description of the failing step
    pub fn context(self, context: &'static str) -> Self {
        Self::Context {
            context,
            source: Box::new(self),
        }
    }

    /// Innermost error beneath any context layers
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether a caller may reasonably retry
    ///
    /// Connect failures, timeouts and gateway statuses qualify. The runtime
    /// itself never retries; this is classification for callers.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Self::Transport(err) => err.is_timeout() || err.is_connect(),
            Self::Api { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Whether this is a caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}

/// Invalid configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds an unusable value
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// An environment override could not be parsed
    #[error("invalid environment override {var}='{value}': {reason}")]
    Env {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// Parse failure
        reason: String,
    },

    /// TOML parse failure
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Backoff policy rejected
    #[error("invalid task backoff: {0}")]
    Backoff(#[from] PolicyError),
}
