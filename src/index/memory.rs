//! In-memory [`ChunkIndex`] implementation for tests and ephemeral use.
//!
//! Stores `(chunk, vector)` pairs in a `Vec` in insertion order. Nothing is
//! persisted.

use async_trait::async_trait;

use crate::embedding::{embed_batched, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::models::{Chunk, ScoredChunk};

use super::{check_query_dims, rank, ChunkIndex};

pub struct InMemoryIndex {
    model: String,
    dims: usize,
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl InMemoryIndex {
    /// An empty index for vectors from `model` with `dims` dimensions.
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
            entries: Vec::new(),
        }
    }

    /// Embed every chunk with `provider` and index the results in chunk order.
    pub async fn build(
        provider: &dyn EmbeddingProvider,
        chunks: Vec<Chunk>,
        batch_size: usize,
    ) -> Result<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(provider, &texts, batch_size).await?;

        let mut index = Self::new(provider.model_name(), provider.dims());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            index.insert(chunk, vector)?;
        }
        Ok(index)
    }

    pub fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dims {
            return Err(MemoryError::IndexQuery(format!(
                "vector for chunk {} has {} dimensions, index expects {}",
                chunk.id,
                vector.len(),
                self.dims
            )));
        }
        self.entries.push((chunk, vector));
        Ok(())
    }
}

#[async_trait]
impl ChunkIndex for InMemoryIndex {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_query_dims(self, query)?;
        Ok(rank(query, self.entries.iter().cloned(), k))
    }
}
