//! Core data models used throughout the memory pipeline.
//!
//! These types represent the journal documents, chunks, and retrieval hits
//! that flow from ingestion to prompt assembly.

use chrono::{DateTime, Utc};

/// One journal file, loaded as-is from the corpus directory.
#[derive(Debug, Clone)]
pub struct JournalDocument {
    /// File name within the corpus directory; also the ordering key.
    pub source: String,
    pub modified_at: DateTime<Utc>,
    pub body: String,
}

/// A bounded span of a document's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    /// Source document file name.
    pub source: String,
    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by a nearest-neighbor query, with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}
