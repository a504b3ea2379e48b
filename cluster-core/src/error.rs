//! # Error Taxonomy
//!
//! Grounded on the flat `thiserror`-derived enums in the teacher's
//! `error.rs` (`ClientError`/`ProviderError`: one variant per failure
//! kind, struct-style variants carrying context fields). Spec.md
//! section 6 requires discovery/health failures to be delivered via
//! callback rather than by throwing, so these types are plain data —
//! nothing here is ever `.unwrap()`'d out of a scheduled loop.

use thiserror::Error;

/// Failures that can occur while discovering or validating a worker.
/// Delivered to `onDiscoveryError`, never returned from a fallible
/// function that would abort a refresh loop.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("node {node_id:?} at {url:?} failed validation: {message}")]
    ValidationFailed {
        node_id: Option<String>,
        url: Option<String>,
        message: String,
    },

    #[error("node {node_id:?} at {url:?} timed out")]
    NodeTimeout {
        node_id: Option<String>,
        url: Option<String>,
    },

    #[error("invalid node url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("node {node_id:?} at {url:?} returned http error: {message}")]
    HttpError {
        node_id: Option<String>,
        url: Option<String>,
        message: String,
    },

    #[error("node {node_id:?} at {url:?} network error: {message}")]
    NetworkError {
        node_id: Option<String>,
        url: Option<String>,
        message: String,
    },

    #[error("discovery mode {mode:?} is not implemented")]
    UnsupportedMode { mode: String },
}

impl DiscoveryError {
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryError::ValidationFailed { .. } => "VALIDATION_FAILED",
            DiscoveryError::NodeTimeout { .. } => "NODE_TIMEOUT",
            DiscoveryError::InvalidUrl { .. } => "INVALID_URL",
            DiscoveryError::HttpError { .. } => "HTTP_ERROR",
            DiscoveryError::NetworkError { .. } => "NETWORK_ERROR",
            DiscoveryError::UnsupportedMode { .. } => "UNSUPPORTED_MODE",
        }
    }
}

/// Failures surfaced by a single health probe. Folded into the tracker
/// as an opaque `lastError` string (spec.md section 3); kept as a typed
/// enum here so callers that do care can match on it.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("http status {status}")]
    Status { status: u16 },
    #[error("timed out after {millis}ms")]
    Timeout { millis: u64 },
    #[error("network error: {0}")]
    Network(String),
    #[error("cancelled")]
    Cancelled,
}

/// Errors thrown synchronously from constructors. These are the only
/// errors the core is allowed to let escape instead of reporting through
/// a callback (spec.md section 7): configuration mistakes and
/// programmer errors like calling `start` twice.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cluster health already started; call stop() first")]
    AlreadyStarted,

    #[error("no healthy worker available")]
    NoRoutableNode,
}
