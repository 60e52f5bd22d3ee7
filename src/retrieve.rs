//! Query-time retrieval of journal excerpts.
//!
//! A [`Retriever`] pairs an embedding provider with an optional index. The
//! provider must be the one the index was built with: the model name and
//! dimensionality are checked on every call.
//!
//! An absent index (nothing ingested yet) and an empty index both retrieve
//! nothing; neither is an error. Results are not cached between calls.

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::index::ChunkIndex;
use crate::models::ScoredChunk;

/// Default number of excerpts retrieved per query.
pub const DEFAULT_TOP_K: usize = 5;

pub struct Retriever<'a> {
    provider: &'a dyn EmbeddingProvider,
    index: Option<&'a dyn ChunkIndex>,
    default_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, index: Option<&'a dyn ChunkIndex>) -> Self {
        Self {
            provider,
            index,
            default_k: DEFAULT_TOP_K,
        }
    }

    /// Override the `k` used by [`Retriever::retrieve_default`] and
    /// [`Retriever::retrieve_or_empty`].
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// The `k` chunks most similar to `query`, most similar first.
    ///
    /// # Errors
    ///
    /// [`MemoryError::EmbeddingService`] if the query can't be embedded;
    /// [`MemoryError::IndexQuery`] if the index was built with another model.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let Some(index) = self.index else {
            return Ok(Vec::new());
        };
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if index.model_name() != self.provider.model_name() {
            return Err(MemoryError::IndexQuery(format!(
                "index was built with embedding model '{}' but queries use '{}'; run `jmem ingest` again",
                index.model_name(),
                self.provider.model_name()
            )));
        }

        let vector = embed_query(self.provider, query).await?;
        index.nearest(&vector, k).await
    }

    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        self.retrieve(query, self.default_k).await
    }

    /// Chunk texts only, in rank order.
    pub async fn retrieve_texts(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk.text)
            .collect())
    }

    /// Retrieve with the default `k`, reporting any failure on stderr and
    /// answering with no excerpts instead.
    pub async fn retrieve_or_empty(&self, query: &str) -> Vec<String> {
        match self.retrieve_texts(query, self.default_k).await {
            Ok(texts) => texts,
            Err(e) => {
                eprintln!("Warning: retrieval failed, continuing without excerpts: {}", e);
                Vec::new()
            }
        }
    }
}
