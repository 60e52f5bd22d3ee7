//! Persistent SQLite-backed [`ChunkIndex`].
//!
//! # Layout
//!
//! One file, `<index.dir>/index.sqlite`, in WAL mode:
//!
//! ```sql
//! index_meta (id = 1, model, dims, built_at, chunk_count)
//! chunks     (seq, id, source, chunk_index, text, hash, embedding BLOB)
//! ```
//!
//! `seq` is the insertion order and the tie-break for equal scores.
//! Embeddings are little-endian `f32` blobs (see [`vec_to_blob`]).
//!
//! # Rebuild semantics
//!
//! [`SqliteIndex::rebuild`] embeds every chunk first. Only when all
//! embeddings succeed is the previous index file (and its `-wal`/`-shm`
//! companions) deleted and a fresh one written. There is no incremental
//! update path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, embed_batched, vec_to_blob, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::models::{Chunk, ScoredChunk};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};

use super::{check_query_dims, rank, ChunkIndex};

const INDEX_FILE: &str = "index.sqlite";

/// What an index was built with, read from the `index_meta` row.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
    pub built_at: DateTime<Utc>,
    pub chunk_count: usize,
}

pub struct SqliteIndex {
    pool: SqlitePool,
    meta: IndexMeta,
}

/// Path of the index file inside `dir`.
pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn remove_index_files(path: &Path) -> Result<()> {
    let mut paths = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut companion = path.as_os_str().to_owned();
        companion.push(suffix);
        paths.push(PathBuf::from(companion));
    }
    for p in paths {
        match std::fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            built_at INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunks (
            seq INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

impl SqliteIndex {
    /// Full rebuild without progress output. See [`SqliteIndex::rebuild_with_progress`].
    pub async fn rebuild(
        dir: &Path,
        provider: &dyn EmbeddingProvider,
        chunks: &[Chunk],
        batch_size: usize,
    ) -> Result<Self> {
        Self::rebuild_with_progress(dir, provider, chunks, batch_size, &NoProgress).await
    }

    /// Embed `chunks` and replace whatever index exists in `dir`.
    ///
    /// An empty `chunks` slice yields a valid, empty index.
    ///
    /// # Errors
    ///
    /// [`MemoryError::EmbeddingService`] if any batch fails to embed; the
    /// previous index (if any) is left untouched in that case.
    /// [`MemoryError::IndexQuery`] / [`MemoryError::Io`] if the file can't be written.
    pub async fn rebuild_with_progress(
        dir: &Path,
        provider: &dyn EmbeddingProvider,
        chunks: &[Chunk],
        batch_size: usize,
        reporter: &dyn IngestProgressReporter,
    ) -> Result<Self> {
        let total = chunks.len() as u64;
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            vectors.extend(embed_batched(provider, &texts, batch_size).await?);
            reporter.report(IngestProgressEvent::Embedding {
                n: vectors.len() as u64,
                total,
            });
        }

        reporter.report(IngestProgressEvent::Writing { chunks: total });

        std::fs::create_dir_all(dir)?;
        let path = index_path(dir);
        remove_index_files(&path)?;

        let pool = connect(&path, true).await?;
        create_schema(&pool).await?;

        let built_at = Utc::now();
        let mut tx = pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, source, chunk_index, text, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "INSERT INTO index_meta (id, model, dims, built_at, chunk_count) VALUES (1, ?, ?, ?, ?)",
        )
        .bind(provider.model_name())
        .bind(provider.dims() as i64)
        .bind(built_at.timestamp())
        .bind(chunks.len() as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let meta = IndexMeta {
            model: provider.model_name().to_string(),
            dims: provider.dims(),
            built_at: DateTime::from_timestamp(built_at.timestamp(), 0).unwrap_or(built_at),
            chunk_count: chunks.len(),
        };

        Ok(Self { pool, meta })
    }

    /// Open the index in `dir`, or `Ok(None)` if none has been built.
    ///
    /// # Errors
    ///
    /// [`MemoryError::IndexQuery`] if the file exists but isn't a readable index.
    pub async fn open(dir: &Path) -> Result<Option<Self>> {
        let path = index_path(dir);
        if !path.is_file() {
            return Ok(None);
        }

        let pool = connect(&path, false).await?;
        let row = sqlx::query(
            "SELECT model, dims, built_at, chunk_count FROM index_meta WHERE id = 1",
        )
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            MemoryError::IndexQuery(format!("{} is not a valid index: {}", path.display(), e))
        })?
        .ok_or_else(|| {
            MemoryError::IndexQuery(format!("{} has no index metadata", path.display()))
        })?;

        let built_at_ts: i64 = row.get("built_at");
        let dims: i64 = row.get("dims");
        let chunk_count: i64 = row.get("chunk_count");
        let meta = IndexMeta {
            model: row.get("model"),
            dims: dims as usize,
            built_at: DateTime::from_timestamp(built_at_ts, 0).unwrap_or_default(),
            chunk_count: chunk_count as usize,
        };

        Ok(Some(Self { pool, meta }))
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Number of distinct journal files with at least one indexed chunk.
    pub async fn document_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// `(source, chunk count)` per journal file, in file-name order.
    pub async fn chunks_per_source(&self) -> Result<Vec<(String, usize)>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM chunks GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let n: i64 = row.get("n");
                (row.get("source"), n as usize)
            })
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ChunkIndex for SqliteIndex {
    fn model_name(&self) -> &str {
        &self.meta.model
    }

    fn dims(&self) -> usize {
        self.meta.dims
    }

    fn len(&self) -> usize {
        self.meta.chunk_count
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_query_dims(self, query)?;

        let rows = sqlx::query(
            "SELECT id, source, chunk_index, text, hash, embedding FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows.iter().map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let chunk = Chunk {
                id: row.get("id"),
                source: row.get("source"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                hash: row.get("hash"),
            };
            (chunk, blob_to_vec(&blob))
        });

        Ok(rank(query, entries, k))
    }
}
