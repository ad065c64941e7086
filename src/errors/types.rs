//! Error type definitions for the automation engine
//!
//! The taxonomy mirrors how failures propagate: upstream HTTP failures are
//! classified once at the client boundary, probe failures stay inside the
//! checker, persistence failures abort the mutation that caused them.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream service errors, classified by the client
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Persistence layer errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Media analyzer errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Request validation errors, rejected at the HTTP boundary
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Engine busy; the operation conflicts with a running action
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Resource not found
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error attributed to a specific field
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Upstream HTTP/JSON client errors
///
/// `Transient` failures are retried with backoff by the client; the other
/// variants surface immediately.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Network failures, 5xx responses and timeouts; retried with backoff
    #[error("Transient upstream failure: {message}")]
    Transient { message: String },

    /// Authentication rejected; triggers one token refresh before escalating
    #[error("Upstream authentication failed: {message}")]
    AuthFailed { message: String },

    /// Entity missing upstream
    #[error("Upstream entity not found: {url}")]
    NotFound { url: String },

    /// Upstream rejected the mutation as conflicting
    #[error("Upstream conflict: {message}")]
    Conflict { message: String },

    /// Non-retryable failure, including exhausted retries
    #[error("Permanent upstream failure: {message}")]
    Permanent { message: String },
}

impl UpstreamError {
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// True when a retry with backoff may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Media analyzer (ffprobe subprocess) errors
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Analyzer did not finish within the configured timeout
    #[error("Analyzer timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Analyzer exited non-zero or reported an unusable stream
    #[error("Analyzer failed: {message}")]
    Failed { message: String },

    /// Analyzer subprocess could not be spawned or crashed
    #[error("Analyzer crashed: {message}")]
    Crashed { message: String },

    /// Analyzer produced output the engine could not parse
    #[error("Unparseable analyzer output: {message}")]
    InvalidOutput { message: String },
}

/// Persistence layer errors
///
/// A failed write never mutates in-memory state; callers observe the error
/// and the previous state stays authoritative.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted JSON exists but cannot be interpreted
    #[error("Corrupt store file {path}: {message}")]
    Corrupt { path: String, message: String },
}
