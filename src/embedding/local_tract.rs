//! Tract-based local embedding pipeline (fallback for musl and Intel Mac).
//!
//! Pure-Rust path: loads the ONNX model with tract-onnx and tokenizes with the
//! tokenizers crate. The model and tokenizer are loaded once by
//! [`TractEmbedder::load`]; [`TractEmbedder::embed`] is blocking and is run
//! from `spawn_blocking` by the provider.
#![cfg_attr(
    all(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"),
    allow(dead_code)
)]

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

const ALL_MINILM_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";
const ALL_MINILM_DIMS: usize = 384;
const DEFAULT_MAX_LEN: usize = 256;

type RunFn = dyn Fn(TVec<TValue>) -> TractResult<TVec<TValue>> + Send + Sync;

/// A sentence-embedding model held in memory for the life of the provider.
pub struct TractEmbedder {
    tokenizer: tokenizers::Tokenizer,
    run: Box<RunFn>,
    dims: usize,
}

/// Model manifest: name -> (onnx path in repo, tokenizer path in repo, dims).
fn model_manifest(model_name: &str) -> Result<(&'static str, &'static str, usize)> {
    match model_name {
        "all-minilm-l6-v2" => Ok(("onnx/model.onnx", "tokenizer.json", ALL_MINILM_DIMS)),
        _ => bail!(
            "Tract backend supports only all-minilm-l6-v2 for now. Requested: '{}'",
            model_name
        ),
    }
}

fn cache_dir() -> Result<PathBuf> {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(base)
        .join(".cache")
        .join("journal-memory")
        .join("models");
    std::fs::create_dir_all(&dir).map_err(|e| anyhow::anyhow!("Create cache dir: {}", e))?;
    Ok(dir)
}

fn fetch_once(repo: &str, rel: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Ok(());
    }
    let url = format!("https://huggingface.co/{}/resolve/main/{}", repo, rel);
    let bytes = reqwest::blocking::get(&url)
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| anyhow::anyhow!("Download {}: {}", url, e))?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, &bytes).map_err(|e| anyhow::anyhow!("Write cache: {}", e))?;
    Ok(())
}

impl TractEmbedder {
    /// Download (first use only) and load the named model.
    pub fn load(model_name: &str) -> Result<Self> {
        let (onnx_rel, tokenizer_rel, dims) = model_manifest(model_name)?;
        let model_dir = cache_dir()?.join(model_name);
        let onnx_path = model_dir.join(onnx_rel);
        let tokenizer_path = model_dir.join(tokenizer_rel);
        fetch_once(ALL_MINILM_REPO, onnx_rel, &onnx_path)?;
        fetch_once(ALL_MINILM_REPO, tokenizer_rel, &tokenizer_path)?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Load tokenizer: {}", e))?;

        let plan = tract_onnx::onnx()
            .model_for_path(&onnx_path)
            .map_err(|e| anyhow::anyhow!("Load ONNX: {}", e))?
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("Optimize: {}", e))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("Build tract runnable: {}", e))?;

        Ok(Self {
            tokenizer,
            run: Box::new(move |inputs| plan.run(inputs)),
            dims,
        })
    }

    /// Embed `texts` in batches, returning L2-normalized vectors.
    pub fn embed(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            all_embeddings.extend(self.embed_batch(batch)?);
        }
        Ok(all_embeddings)
    }

    fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = batch
            .iter()
            .map(|s| {
                self.tokenizer
                    .encode(s.as_str(), true)
                    .map_err(|e| anyhow::anyhow!("Tokenize: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(1)
            .min(DEFAULT_MAX_LEN);
        let rows = encodings.len();

        let mut input_ids = ndarray::Array2::<i64>::zeros((rows, seq_len));
        let mut attention_mask = ndarray::Array2::<i64>::zeros((rows, seq_len));
        for (i, enc) in encodings.iter().enumerate() {
            for (j, &id) in enc.get_ids().iter().take(seq_len).enumerate() {
                input_ids[[i, j]] = id as i64;
                attention_mask[[i, j]] = 1;
            }
        }

        let input_ids: Tensor = input_ids.into();
        let attention_mask: Tensor = attention_mask.into();
        let outputs = (self.run)(tvec!(input_ids.into(), attention_mask.into()))?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No output tensor"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| anyhow::anyhow!("Output to array: {}", e))?;

        let shape = view.shape().to_vec();
        match shape.len() {
            // Already pooled: [batch, dims].
            2 => Ok((0..shape[0])
                .map(|i| normalize_l2(view.slice(ndarray::s![i, ..]).iter().copied().collect()))
                .collect()),
            // last_hidden_state: [batch, seq, dims]; mean-pool over real tokens.
            3 => Ok(encodings
                .iter()
                .enumerate()
                .map(|(i, enc)| {
                    let valid = enc.get_ids().len().min(shape[1]);
                    let mut pooled = vec![0f32; self.dims];
                    for j in 0..valid {
                        let token = view.slice(ndarray::s![i, j, ..]);
                        for (acc, &v) in pooled.iter_mut().zip(token.iter()) {
                            *acc += v;
                        }
                    }
                    if valid > 0 {
                        pooled.iter_mut().for_each(|x| *x /= valid as f32);
                    }
                    normalize_l2(pooled)
                })
                .collect()),
            _ => bail!("Unexpected output shape: {:?}", shape),
        }
    }
}

fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
