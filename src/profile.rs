//! User profile synthesis and caching.
//!
//! A [`UserProfile`] is distilled once per corpus by asking the language
//! model to read every journal entry and answer with a JSON object of a fixed
//! shape. The answer is validated strictly: it must be valid JSON, match the
//! schema exactly (no missing or unknown fields, no wrong types), and pass
//! the semantic checks in [`UserProfile::validate`]. Anything else is a
//! [`MemoryError::ProfileParse`] carrying the raw response. No default or
//! partial profile is ever substituted.
//!
//! The profile is cached as pretty JSON by [`ProfileCache`]. When the cache
//! file exists it is authoritative: [`load_or_synthesize`] returns it without
//! calling the model. Deleting the file (or `jmem profile --force`) is the
//! only way to regenerate. Reading the cache back is lenient: any JSON object
//! is accepted, and one that no longer matches the schema (hand-edited, or
//! written by an older tool) is passed through as a [`CachedProfile::Freeform`]
//! value. Only a file that isn't a JSON object is malformed.
//!
//! Errors stay typed all the way up. [`ProfileSection::from_result`] is the
//! single place a failure turns into placeholder text for the prompt.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::corpus::scan_corpus;
use crate::error::{MemoryError, Result};
use crate::llm::{CompletionClient, OllamaClient};
use crate::models::JournalDocument;

/// Structured summary of the journal author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserProfile {
    pub basic_info: BasicInfo,
    /// Ordered as the model ranked them.
    pub key_goals_and_aspirations: Vec<String>,
    pub current_challenges_and_struggles: Vec<String>,
    pub core_values_and_beliefs: Vec<String>,
    pub recurring_patterns_and_behaviors: Vec<String>,
    pub significant_relationships_mentioned: Vec<Relationship>,
    pub key_interests: Vec<String>,
    pub self_reflections_on_emotions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicInfo {
    pub name: String,
    #[serde(deserialize_with = "present_or_null")]
    pub age: Option<u32>,
    #[serde(deserialize_with = "present_or_null")]
    pub primary_location_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relationship {
    pub name: String,
    pub context: String,
}

/// Nullable but required: `null` is accepted, a missing key is not.
fn present_or_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

impl UserProfile {
    /// Checks serde can't express. Returns the first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.basic_info.name.trim().is_empty() {
            return Err("basic_info.name is empty".to_string());
        }
        if let Some(i) = self
            .significant_relationships_mentioned
            .iter()
            .position(|r| r.name.trim().is_empty())
        {
            return Err(format!("significant_relationships_mentioned[{}].name is empty", i));
        }
        Ok(())
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

const PROFILE_SCHEMA: &str = r#"{
  "basic_info": {
    "name": "string: the author's name if the entries state it, otherwise \"User (Journal Author)\"",
    "age": "integer or null: only if it can be inferred",
    "primary_location_context": "string or null: where they live and spend time"
  },
  "key_goals_and_aspirations": ["string", "most important first"],
  "current_challenges_and_struggles": ["string"],
  "core_values_and_beliefs": ["string"],
  "recurring_patterns_and_behaviors": ["string"],
  "significant_relationships_mentioned": [
    { "name": "string", "context": "string: who they are to the author" }
  ],
  "key_interests": ["string"],
  "self_reflections_on_emotions": ["string"]
}"#;

/// Concatenate documents in file-name order, each under a source marker.
pub fn load_corpus_text(documents: &[JournalDocument]) -> String {
    let mut sorted: Vec<&JournalDocument> = documents.iter().collect();
    sorted.sort_by(|a, b| a.source.cmp(&b.source));

    sorted
        .iter()
        .map(|doc| format!("--- source: {} ---\n{}", doc.source, doc.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
///
/// The language tag is optional and the body may start on the fence line.
pub fn strip_code_fences(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim_start();
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse and validate a model response as a [`UserProfile`].
pub fn parse_profile(raw: &str) -> Result<UserProfile> {
    let parse_error = |reason: String| MemoryError::ProfileParse {
        reason,
        raw: raw.to_string(),
    };

    let value: serde_json::Value = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| parse_error(format!("response is not valid JSON: {}", e)))?;
    let profile: UserProfile = serde_json::from_value(value)
        .map_err(|e| parse_error(format!("response does not match the profile schema: {}", e)))?;
    profile.validate().map_err(parse_error)?;

    Ok(profile)
}

/// Builds a profile from corpus text with one language-model call.
pub struct ProfileSynthesizer<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> ProfileSynthesizer<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    pub fn extraction_prompt(corpus_text: &str) -> String {
        format!(
            "Read the journal entries below and extract what they reveal about their author.\n\
             Answer with a single JSON object and nothing else: no prose, no Markdown.\n\
             Use exactly these keys, with the value types described:\n\n\
             {schema}\n\n\
             Journal entries:\n\
             ---\n\
             {corpus}\n\
             ---\n\n\
             Return only the JSON object.\n",
            schema = PROFILE_SCHEMA,
            corpus = corpus_text,
        )
    }

    /// # Errors
    ///
    /// [`MemoryError::Ingestion`] for blank corpus text (the model is not
    /// called), [`MemoryError::InferenceService`] if the call fails, and
    /// [`MemoryError::ProfileParse`] if the answer isn't a valid profile.
    pub async fn synthesize(&self, corpus_text: &str) -> Result<UserProfile> {
        if corpus_text.trim().is_empty() {
            return Err(MemoryError::Ingestion(
                "no journal text to build a profile from".to_string(),
            ));
        }
        let response = self
            .client
            .complete(&Self::extraction_prompt(corpus_text))
            .await?;
        parse_profile(&response)
    }
}

/// A profile as read back from the cache file.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedProfile {
    /// Matches the current schema.
    Structured(UserProfile),
    /// A JSON object that doesn't, kept verbatim.
    Freeform(serde_json::Value),
}

impl CachedProfile {
    fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value::<UserProfile>(value.clone()) {
            Ok(profile) if profile.validate().is_ok() => CachedProfile::Structured(profile),
            _ => CachedProfile::Freeform(value),
        }
    }

    pub fn structured(&self) -> Option<&UserProfile> {
        match self {
            CachedProfile::Structured(profile) => Some(profile),
            CachedProfile::Freeform(_) => None,
        }
    }

    /// `basic_info.name`, if present as a string.
    pub fn name(&self) -> Option<&str> {
        match self {
            CachedProfile::Structured(profile) => Some(profile.basic_info.name.as_str()),
            CachedProfile::Freeform(value) => value.pointer("/basic_info/name")?.as_str(),
        }
    }

    pub fn to_pretty_json(&self) -> String {
        match self {
            CachedProfile::Structured(profile) => profile.to_pretty_json(),
            CachedProfile::Freeform(value) => {
                serde_json::to_string_pretty(value).unwrap_or_default()
            }
        }
    }
}

impl From<UserProfile> for CachedProfile {
    fn from(profile: UserProfile) -> Self {
        CachedProfile::Structured(profile)
    }
}

/// The profile JSON file.
#[derive(Debug, Clone)]
pub struct ProfileCache {
    pub path: PathBuf,
}

impl ProfileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `Ok(None)` if there is no cache file.
    ///
    /// # Errors
    ///
    /// [`MemoryError::MalformedProfileCache`] if the file exists but isn't a
    /// JSON object; [`MemoryError::Io`] if it can't be read.
    pub fn load(&self) -> Result<Option<CachedProfile>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let malformed = |reason: String| MemoryError::MalformedProfileCache {
            path: self.path.clone(),
            reason,
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(malformed("expected a JSON object".to_string()));
        }
        Ok(Some(CachedProfile::from_value(value)))
    }

    pub fn store(&self, profile: &UserProfile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut json = profile.to_pretty_json();
        json.push('\n');
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Delete the cache file. Returns whether one existed.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Return the cached profile, or build, cache, and return a new one.
///
/// `corpus_loader` is only invoked on a cache miss. A corpus with no text
/// is an [`MemoryError::Ingestion`] error and leaves no cache file behind.
pub async fn load_or_synthesize<F>(
    cache: &ProfileCache,
    corpus_loader: F,
    synthesizer: &ProfileSynthesizer<'_>,
) -> Result<CachedProfile>
where
    F: FnOnce() -> Result<Vec<JournalDocument>>,
{
    if let Some(profile) = cache.load()? {
        return Ok(profile);
    }

    let documents = corpus_loader()?;
    if documents.iter().all(|d| d.body.trim().is_empty()) {
        return Err(MemoryError::Ingestion(
            "journal corpus is empty; nothing to build a profile from".to_string(),
        ));
    }

    let profile = synthesizer.synthesize(&load_corpus_text(&documents)).await?;
    cache.store(&profile)?;
    Ok(profile.into())
}

/// What goes into the profile section of the assembled prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileSection {
    Profile(CachedProfile),
    /// Human-readable stand-in when no profile is available.
    Placeholder(String),
}

impl ProfileSection {
    pub fn from_result(result: Result<CachedProfile>) -> Self {
        match result {
            Ok(profile) => ProfileSection::Profile(profile),
            Err(MemoryError::MalformedProfileCache { path, .. }) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                ProfileSection::Placeholder(format!(
                    "Error parsing {}. Ensure it's a valid JSON.",
                    name
                ))
            }
            Err(MemoryError::Ingestion(_)) => ProfileSection::Placeholder(
                "No journal entries found to generate profile.".to_string(),
            ),
            Err(_) => ProfileSection::Placeholder(
                "User profile generation failed. Please check your journal entries and try again."
                    .to_string(),
            ),
        }
    }

    pub fn render(&self) -> String {
        match self {
            ProfileSection::Profile(profile) => profile.to_pretty_json(),
            ProfileSection::Placeholder(text) => text.clone(),
        }
    }
}

/// `jmem profile`: standalone synthesis into the cache file.
pub async fn run_profile(config: &Config, force: bool) -> anyhow::Result<()> {
    let cache = ProfileCache::new(&config.profile.cache_path);

    if force && cache.remove()? {
        println!("removed cached profile {}", cache.path().display());
    } else if !force && cache.path().exists() {
        // Fails on a malformed cache.
        cache.load()?;
        println!("profile already cached at {}", cache.path().display());
        println!("  use --force to regenerate");
        return Ok(());
    }

    let client = OllamaClient::new(&config.llm);
    let synthesizer = ProfileSynthesizer::new(&client);

    let profile = match load_or_synthesize(&cache, || scan_corpus(&config.corpus), &synthesizer).await {
        Ok(profile) => profile,
        Err(e) => {
            if let Some(raw) = e.raw_response() {
                eprintln!("Model response was:\n{}", raw);
            }
            return Err(anyhow::Error::new(e).context("Profile generation failed"));
        }
    };

    println!("profile");
    println!("  name: {}", profile.name().unwrap_or("(unknown)"));
    if let Some(profile) = profile.structured() {
        println!("  goals: {}", profile.key_goals_and_aspirations.len());
        println!(
            "  relationships: {}",
            profile.significant_relationships_mentioned.len()
        );
    }
    println!("  written to: {}", cache.path().display());
    println!("ok");

    Ok(())
}
