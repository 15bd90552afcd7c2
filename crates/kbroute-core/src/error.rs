//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Each error type maps to one recovery policy:
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`FetchError`] | page fetch, article fetch | log and skip the item |
//! | [`FetchError::NotFound`] | article fetch (HTTP 404) | expected, skip quietly |
//! | [`EmbeddingError`] | embedding providers | caller decides whether to retry |
//! | [`IndexLoadError`] | artifact load | treat as "no cache", rebuild |
//! | [`NoContentError`] | knowledge base full build | category becomes unavailable |
//! | [`GenerationError`] | generation providers | answer with a fallback message |
//!
//! Application plumbing (configuration, database, CLI) uses `anyhow`;
//! these types exist where a caller has to branch on the failure.

use thiserror::Error;

/// Failure while fetching a remote page or article.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote answered 404. Expected for stale identifiers.
    #[error("not found: {target}")]
    NotFound { target: String },

    /// The remote answered with a non-success status other than 404.
    #[error("HTTP {status} from {target}")]
    Status { target: String, status: u16 },

    /// Connection, timeout, or TLS failure.
    #[error("request to {target} failed: {message}")]
    Network { target: String, message: String },

    /// The body could not be decoded into the expected shape.
    #[error("invalid response from {target}: {message}")]
    Decode { target: String, message: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    /// Network failures, rate limiting, and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::NotFound { .. } | FetchError::Decode { .. } => false,
        }
    }
}

/// Failure inside an embedding provider.
#[derive(Debug, Error)]
#[error("embedding failed ({provider}): {message}")]
pub struct EmbeddingError {
    pub provider: String,
    pub message: String,
    /// Whether repeating the same request may succeed.
    pub retryable: bool,
}

impl EmbeddingError {
    pub fn retryable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

/// Failure while loading a persisted vector index.
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("index artifact not found: {path}")]
    Missing { path: String },

    #[error("index artifact is corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("unsupported index format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("index artifact has expired (age {age_secs}s)")]
    Expired { age_secs: u64 },

    #[error("failed to read index artifact: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexLoadError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        IndexLoadError::Corrupt {
            reason: reason.into(),
        }
    }
}

/// A full build found nothing to index for a category.
#[derive(Debug, Error)]
#[error("no content available for the {category} knowledge base")]
pub struct NoContentError {
    pub category: String,
}

/// Failure inside a generation provider.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider is disabled")]
    Disabled,

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation response was invalid: {0}")]
    InvalidResponse(String),
}

/// Failure while adding entries to a vector index.
#[derive(Debug, Error)]
#[error("vector has {found} dimensions, index expects {expected}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub found: usize,
}
