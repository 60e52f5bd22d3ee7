//! Nearest-neighbor chunk indexes.
//!
//! The [`ChunkIndex`] trait is what the retriever queries. Two backends:
//!
//! - [`InMemoryIndex`]: a `Vec` of `(chunk, vector)` pairs; used by tests
//!   and anywhere an ephemeral index is enough.
//! - [`SqliteIndex`]: the persistent index written by `jmem ingest` into
//!   `<index.dir>/index.sqlite`.
//!
//! Both score by brute-force cosine similarity over every stored vector and
//! break ties by insertion order. An index remembers the embedding model and
//! dimensionality it was built with; a query vector of a different length is
//! rejected with [`MemoryError::IndexQuery`].

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::{IndexMeta, SqliteIndex};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::models::{Chunk, ScoredChunk};

/// A read-only chunk index supporting cosine nearest-neighbor queries.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Embedding model the stored vectors were produced with.
    fn model_name(&self) -> &str;

    /// Dimensionality of the stored vectors.
    fn dims(&self) -> usize;

    /// Number of indexed chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` chunks most similar to `query`, most similar first.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Reject a query vector whose length doesn't match the index.
pub(crate) fn check_query_dims(index: &dyn ChunkIndex, query: &[f32]) -> Result<()> {
    if query.len() != index.dims() {
        return Err(MemoryError::IndexQuery(format!(
            "query vector has {} dimensions but the index was built with {} ({})",
            query.len(),
            index.dims(),
            index.model_name()
        )));
    }
    Ok(())
}

/// Score every entry and keep the top `k`.
///
/// `entries` must be in insertion order; the sort is stable so equal scores
/// keep that order.
pub(crate) fn rank<I>(query: &[f32], entries: I, k: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (Chunk, Vec<f32>)>,
{
    let mut scored: Vec<ScoredChunk> = entries
        .into_iter()
        .map(|(chunk, vector)| ScoredChunk {
            score: cosine_similarity(query, &vector),
            chunk,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
