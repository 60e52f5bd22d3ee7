//! Ingestion pipeline orchestration.
//!
//! Coordinates the offline rebuild: corpus scan → chunking → embedding →
//! index write. Every run is a full rebuild; there are no checkpoints and no
//! incremental path.

use anyhow::{bail, Context};

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::corpus::scan_corpus;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::index::{ChunkIndex, SqliteIndex};
use crate::models::{Chunk, JournalDocument};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};

/// What a rebuild produced.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    pub model: String,
    pub dims: usize,
}

/// Scan the corpus and chunk every document, in file-name order.
///
/// # Errors
///
/// [`MemoryError::Ingestion`] if the corpus is missing, has no journal
/// files, or every file is blank.
pub fn load_and_chunk(
    config: &Config,
    reporter: &dyn IngestProgressReporter,
) -> Result<(Vec<JournalDocument>, Vec<Chunk>)> {
    reporter.report(IngestProgressEvent::Scanning {
        dir: config.corpus.dir.display().to_string(),
    });
    let documents = scan_corpus(&config.corpus)?;

    reporter.report(IngestProgressEvent::Chunking {
        documents: documents.len() as u64,
    });
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|doc| chunk_document(doc, &config.chunking))
        .collect();

    if chunks.is_empty() {
        return Err(MemoryError::Ingestion(format!(
            "no journal text found in {}",
            config.corpus.dir.display()
        )));
    }

    Ok((documents, chunks))
}

/// Rebuild the index under `config.index.dir` from scratch.
///
/// The corpus is checked before any index I/O, so an empty corpus leaves
/// any existing index untouched.
pub async fn rebuild_index(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    reporter: &dyn IngestProgressReporter,
) -> Result<IngestSummary> {
    let (documents, chunks) = load_and_chunk(config, reporter)?;

    let index = SqliteIndex::rebuild_with_progress(
        &config.index.dir,
        provider,
        &chunks,
        config.embedding.batch_size,
        reporter,
    )
    .await?;

    let summary = IngestSummary {
        documents: documents.len(),
        chunks: index.len(),
        model: index.model_name().to_string(),
        dims: index.dims(),
    };
    index.close().await;

    Ok(summary)
}

/// `jmem ingest`.
pub async fn run_ingest(config: &Config, dry_run: bool, progress: ProgressMode) -> anyhow::Result<()> {
    let reporter = progress.reporter();

    if dry_run {
        let (documents, chunks) = load_and_chunk(config, reporter.as_ref())?;
        println!("ingest (dry-run)");
        println!("  corpus: {}", config.corpus.dir.display());
        println!("  documents found: {}", documents.len());
        println!("  estimated chunks: {}", chunks.len());
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let provider = create_provider(&config.embedding)?;

    let summary = rebuild_index(config, provider.as_ref(), reporter.as_ref())
        .await
        .with_context(|| format!("Failed to rebuild index in {}", config.index.dir.display()))?;

    println!("ingest");
    println!("  documents: {}", summary.documents);
    println!("  chunks indexed: {}", summary.chunks);
    println!("  model: {} ({} dims)", summary.model, summary.dims);
    println!("  index: {}", config.index.dir.display());
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChunkingConfig, CorpusConfig, EmbeddingConfig, IndexConfig, LlmConfig, ProfileConfig,
        RetrievalConfig,
    };
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct UnitProvider;

    #[async_trait]
    impl EmbeddingProvider for UnitProvider {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<IngestProgressEvent>>);

    impl IngestProgressReporter for Recorder {
        fn report(&self, event: IngestProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn config(root: &std::path::Path) -> Config {
        Config {
            corpus: CorpusConfig {
                dir: root.join("journals"),
                exclude_globs: vec!["*.json".to_string()],
            },
            chunking: ChunkingConfig::default(),
            index: IndexConfig {
                dir: root.join("index_db"),
            },
            embedding: EmbeddingConfig {
                batch_size: 2,
                ..EmbeddingConfig::default()
            },
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            profile: ProfileConfig {
                cache_path: root.join("user_profile.json"),
            },
        }
    }

    #[tokio::test]
    async fn three_documents_give_five_chunks() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path());
        std::fs::create_dir_all(&config.corpus.dir).unwrap();
        let doc1 = format!("{}\n\n{}", "a".repeat(999), "b".repeat(999));
        let doc3 = format!("{}\n\n{}", "c".repeat(1498), "d".repeat(1500));
        std::fs::write(config.corpus.dir.join("1.txt"), &doc1).unwrap();
        std::fs::write(config.corpus.dir.join("2.txt"), "e".repeat(800)).unwrap();
        std::fs::write(config.corpus.dir.join("3.txt"), &doc3).unwrap();

        let recorder = Recorder::default();
        let summary = rebuild_index(&config, &UnitProvider, &recorder).await.unwrap();
        assert_eq!(summary.documents, 3);
        assert_eq!(summary.chunks, 5);
        assert_eq!(summary.model, "unit");

        let events = recorder.0.lock().unwrap();
        assert!(matches!(events[0], IngestProgressEvent::Scanning { .. }));
        assert_eq!(events[1], IngestProgressEvent::Chunking { documents: 3 });
        assert!(events.contains(&IngestProgressEvent::Embedding { n: 5, total: 5 }));
        assert_eq!(events.last(), Some(&IngestProgressEvent::Writing { chunks: 5 }));

        let index = SqliteIndex::open(&config.index.dir).await.unwrap().unwrap();
        assert_eq!(index.meta().chunk_count, 5);
    }

    #[tokio::test]
    async fn blank_corpus_fails_without_touching_index() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path());
        std::fs::create_dir_all(&config.corpus.dir).unwrap();
        std::fs::write(config.corpus.dir.join("empty.txt"), "").unwrap();

        let err = rebuild_index(&config, &UnitProvider, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Ingestion(_)));
        assert!(!config.index.dir.exists());
    }
}
