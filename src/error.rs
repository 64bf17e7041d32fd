//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Request-scoped operations surface [`Error::Validation`],
//! [`Error::NotFound`], and [`Error::StateConflict`] synchronously to the
//! caller. Background pipeline failures are recorded on the document as
//! `failed` and logged, never returned to the triggering caller.

use thiserror::Error;

/// All failure conditions the core pipeline can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input (empty query, empty text, length mismatch).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown document or chunk id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation invalid for the document's current status.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Extracted text too short to chunk or index.
    #[error("insufficient content: {0}")]
    InsufficientContent(String),

    /// External provider unreachable or not configured.
    #[error("{service} unavailable: {reason}")]
    ServiceUnavailable {
        service: &'static str,
        reason: String,
    },

    /// External provider rejected our credentials.
    #[error("{service} rejected credentials: {reason}")]
    Unauthorized {
        service: &'static str,
        reason: String,
    },

    /// External provider rate-limited the request.
    #[error("{service} rate limit exceeded: {reason}")]
    RateLimited {
        service: &'static str,
        reason: String,
    },

    /// External provider returned an error response.
    #[error("{service} error: {reason}")]
    Service {
        service: &'static str,
        reason: String,
    },

    /// Store-layer failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
