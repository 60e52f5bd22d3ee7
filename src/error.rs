//! Error taxonomy for the memory pipeline.
//!
//! Every core operation returns [`MemoryError`] so callers can decide how to
//! degrade: retrieval errors become an empty context, profile errors become a
//! placeholder string, inference errors end the turn. Nothing here retries.

use std::path::PathBuf;

/// Errors produced by ingestion, indexing, retrieval, profile synthesis,
/// and calls to the inference service.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The corpus directory is missing, unreadable, or holds no journal text.
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// The embedding model could not be loaded or the embedding call failed.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// The index is absent, malformed, or incompatible with the query embedder.
    #[error("index query error: {0}")]
    IndexQuery(String),

    /// The language model returned something that is not a valid profile.
    #[error("profile parse error: {reason}")]
    ProfileParse {
        reason: String,
        /// Full model response, kept for diagnostics.
        raw: String,
    },

    /// The profile cache file exists but does not hold a valid profile.
    #[error("profile cache {} is malformed: {reason}", path.display())]
    MalformedProfileCache { path: PathBuf, reason: String },

    /// Network failure or non-success status from the inference service.
    #[error("inference service error: {0}")]
    InferenceService(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Raw model output attached to a [`MemoryError::ProfileParse`], if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            MemoryError::ProfileParse { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for MemoryError {
    fn from(e: sqlx::Error) -> Self {
        MemoryError::IndexQuery(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
