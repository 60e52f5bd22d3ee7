//! One conversational turn: retrieve, load the profile, assemble, answer.
//!
//! This is the outermost caller of the memory pipeline, so it is where
//! failures are softened. A retrieval failure becomes "no excerpts", and a
//! profile failure becomes placeholder text. Both are reported on stderr.
//! An inference failure while answering is returned as-is.
//!
//! Everything runs sequentially: one retrieval, at most one profile
//! synthesis, at most one answer call.

use anyhow::Result;

use crate::assemble::assemble;
use crate::config::{Config, CorpusConfig};
use crate::corpus::scan_corpus;
use crate::embedding::{create_provider, DisabledProvider, EmbeddingProvider};
use crate::error::MemoryError;
use crate::index::{ChunkIndex, SqliteIndex};
use crate::llm::{CompletionClient, OllamaClient};
use crate::profile::{load_or_synthesize, ProfileCache, ProfileSection, ProfileSynthesizer};
use crate::retrieve::Retriever;

/// Assemble the augmented prompt for `query`.
///
/// Never fails: retrieval and profile errors degrade as described in the
/// module docs.
pub async fn build_prompt(
    query: &str,
    retriever: &Retriever<'_>,
    cache: &ProfileCache,
    synthesizer: &ProfileSynthesizer<'_>,
    corpus: &CorpusConfig,
) -> String {
    let excerpts = retriever.retrieve_or_empty(query).await;

    let profile = load_or_synthesize(cache, || scan_corpus(corpus), synthesizer).await;
    if let Err(e) = &profile {
        eprintln!("Warning: user profile unavailable: {}", e);
    }
    let section = ProfileSection::from_result(profile);

    assemble(&section, &excerpts, query)
}

/// Build the prompt for `query` and send it to `client`.
pub async fn answer(
    query: &str,
    retriever: &Retriever<'_>,
    cache: &ProfileCache,
    synthesizer: &ProfileSynthesizer<'_>,
    corpus: &CorpusConfig,
    client: &dyn CompletionClient,
) -> std::result::Result<String, MemoryError> {
    let prompt = build_prompt(query, retriever, cache, synthesizer, corpus).await;
    client.complete(&prompt).await
}

/// Components for query-time commands, built from config.
///
/// An embedding provider that can't be created or an index that can't be
/// opened is reported and replaced by "no index", so the turn still
/// proceeds with an empty excerpt section.
pub struct Session {
    provider: Box<dyn EmbeddingProvider>,
    index: Option<SqliteIndex>,
    client: OllamaClient,
    cache: ProfileCache,
    top_k: usize,
}

impl Session {
    pub async fn open(config: &Config) -> Self {
        let (provider, index): (Box<dyn EmbeddingProvider>, Option<SqliteIndex>) =
            match SqliteIndex::open(&config.index.dir).await {
                Ok(Some(index)) => match create_provider(&config.embedding) {
                    Ok(provider) => (provider, Some(index)),
                    Err(e) => {
                        eprintln!("Warning: embedding provider unavailable: {}", e);
                        (Box::new(DisabledProvider), None)
                    }
                },
                Ok(None) => {
                    eprintln!(
                        "Warning: no index in {} (run `jmem ingest`)",
                        config.index.dir.display()
                    );
                    (Box::new(DisabledProvider), None)
                }
                Err(e) => {
                    eprintln!("Warning: could not open index: {}", e);
                    (Box::new(DisabledProvider), None)
                }
            };

        Self {
            provider,
            index,
            client: OllamaClient::new(&config.llm),
            cache: ProfileCache::new(&config.profile.cache_path),
            top_k: config.retrieval.top_k,
        }
    }

    pub fn retriever(&self) -> Retriever<'_> {
        Retriever::new(
            self.provider.as_ref(),
            self.index.as_ref().map(|i| i as &dyn ChunkIndex),
        )
        .with_default_k(self.top_k)
    }

    pub async fn prompt(&self, config: &Config, query: &str) -> String {
        let synthesizer = ProfileSynthesizer::new(&self.client);
        build_prompt(query, &self.retriever(), &self.cache, &synthesizer, &config.corpus).await
    }

    pub async fn answer(&self, config: &Config, query: &str) -> std::result::Result<String, MemoryError> {
        let synthesizer = ProfileSynthesizer::new(&self.client);
        answer(
            query,
            &self.retriever(),
            &self.cache,
            &synthesizer,
            &config.corpus,
            &self.client,
        )
        .await
    }
}

/// `jmem retrieve`: ranked excerpts with scores. Errors are not softened here.
pub async fn run_retrieve(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k);
    let Some(index) = SqliteIndex::open(&config.index.dir).await? else {
        println!("No index found in {}. Run `jmem ingest` first.", config.index.dir.display());
        return Ok(());
    };
    let provider = create_provider(&config.embedding)?;
    let retriever = Retriever::new(provider.as_ref(), Some(&index));

    let hits = retriever.retrieve(query, k).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} #{}",
            i + 1,
            hit.score,
            hit.chunk.source,
            hit.chunk.chunk_index
        );
        for line in hit.chunk.text.lines() {
            println!("    {}", line);
        }
        println!();
    }

    index.close().await;
    Ok(())
}

/// `jmem prompt`: print the assembled prompt without calling the model for an answer.
pub async fn run_prompt(config: &Config, query: &str) -> Result<()> {
    let session = Session::open(config).await;
    println!("{}", session.prompt(config, query).await);
    Ok(())
}

/// `jmem ask`: assemble, send, and print the answer.
pub async fn run_ask(config: &Config, query: &str) -> Result<()> {
    let session = Session::open(config).await;
    let reply = session.answer(config, query).await?;
    println!("{}", reply.trim_end());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const PROFILE: &str = r#"{"basic_info":{"name":"Sam","age":null,"primary_location_context":null},"key_goals_and_aspirations":[],"current_challenges_and_struggles":[],"core_values_and_beliefs":[],"recurring_patterns_and_behaviors":[],"significant_relationships_mentioned":[],"key_interests":["sailing"],"self_reflections_on_emotions":[]}"#;

    /// Answers profile prompts with `PROFILE`, everything else with "ok".
    struct ScriptedClient {
        prompts: Mutex<Vec<String>>,
        fail_answers: bool,
    }

    impl ScriptedClient {
        fn new(fail_answers: bool) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail_answers,
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, prompt: &str) -> crate::error::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("Return only the JSON object.") {
                Ok(PROFILE.to_string())
            } else if self.fail_answers {
                Err(MemoryError::InferenceService("503 Service Unavailable".to_string()))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    struct FlatProvider;

    #[async_trait]
    impl EmbeddingProvider for FlatProvider {
        fn model_name(&self) -> &str {
            "flat"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("sail") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    fn corpus(tmp: &TempDir) -> CorpusConfig {
        let dir = tmp.path().join("journals");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("2024-05-01.md"), "Went sailing with Ana.").unwrap();
        CorpusConfig {
            dir,
            exclude_globs: vec!["*.json".to_string()],
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: text.to_string(),
            source: "2024-05-01.md".to_string(),
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[tokio::test]
    async fn prompt_includes_profile_and_excerpts() {
        let tmp = TempDir::new().unwrap();
        let corpus = corpus(&tmp);
        let cache = ProfileCache::new(tmp.path().join("user_profile.json"));
        let client = ScriptedClient::new(false);
        let synthesizer = ProfileSynthesizer::new(&client);

        let mut index = InMemoryIndex::new("flat", 2);
        index.insert(chunk("Went sailing with Ana."), vec![1.0, 0.0]).unwrap();
        index.insert(chunk("Tax paperwork."), vec![0.0, 1.0]).unwrap();
        let retriever = Retriever::new(&FlatProvider, Some(&index)).with_default_k(1);

        let prompt = build_prompt("Why do I love sailing?", &retriever, &cache, &synthesizer, &corpus).await;
        assert!(prompt.contains("\"key_interests\": [\n    \"sailing\"\n  ]"));
        assert!(prompt.contains("Went sailing with Ana."));
        assert!(!prompt.contains("Tax paperwork."));
        assert!(cache.path().exists());
    }

    #[tokio::test]
    async fn failures_degrade_to_placeholder_and_no_excerpts() {
        let tmp = TempDir::new().unwrap();
        let corpus = CorpusConfig {
            dir: tmp.path().join("missing"),
            exclude_globs: Vec::new(),
        };
        let cache = ProfileCache::new(tmp.path().join("user_profile.json"));
        let client = ScriptedClient::new(false);
        let synthesizer = ProfileSynthesizer::new(&client);

        // Index built with another model: retrieval errors, turn continues.
        let mut index = InMemoryIndex::new("other-model", 2);
        index.insert(chunk("unreachable"), vec![1.0, 0.0]).unwrap();
        let retriever = Retriever::new(&FlatProvider, Some(&index));

        let prompt = build_prompt("hello", &retriever, &cache, &synthesizer, &corpus).await;
        assert!(prompt.contains("No journal entries found to generate profile."));
        assert!(!prompt.contains("unreachable"));
        assert!(client.prompts.lock().unwrap().is_empty());
        assert!(!cache.path().exists());
    }

    #[tokio::test]
    async fn inference_failure_surfaces_from_answer() {
        let tmp = TempDir::new().unwrap();
        let corpus = corpus(&tmp);
        let cache = ProfileCache::new(tmp.path().join("user_profile.json"));
        let client = ScriptedClient::new(true);
        let synthesizer = ProfileSynthesizer::new(&client);
        let retriever = Retriever::new(&FlatProvider, None);

        let err = answer("hi", &retriever, &cache, &synthesizer, &corpus, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InferenceService(_)));
        // Profile call + answer call.
        assert_eq!(client.prompts.lock().unwrap().len(), 2);
    }
}
