//! Shared fixtures: a journal corpus on disk and a mock Ollama server.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const EMBED_MODEL: &str = "mock-embed";

pub const PROFILE_JSON: &str = r#"{
  "basic_info": { "name": "Robin", "age": 31, "primary_location_context": "Porto" },
  "key_goals_and_aspirations": ["sail solo to the Azores"],
  "current_challenges_and_struggles": ["poor sleep"],
  "core_values_and_beliefs": ["independence"],
  "recurring_patterns_and_behaviors": ["overworking before trips"],
  "significant_relationships_mentioned": [{ "name": "Ines", "context": "sailing partner" }],
  "key_interests": ["sailing"],
  "self_reflections_on_emotions": ["calm on the water"]
}"#;

/// Call counters and failure switches for the mock server.
#[derive(Default)]
pub struct MockOllama {
    pub embed_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub fail_embed: AtomicBool,
    pub fail_generate: AtomicBool,
    pub last_prompt: std::sync::Mutex<String>,
}

impl MockOllama {
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

/// Three-dimensional keyword embedding: sailing, work, sleep.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    vec![
        lower.matches("sail").count() as f32 + 0.1,
        lower.matches("work").count() as f32 + 0.1,
        lower.matches("sleep").count() as f32 + 0.1,
    ]
}

async fn embed(
    State(state): State<Arc<MockOllama>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.embed_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_embed.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    let embeddings: Vec<Vec<f32>> = inputs
        .iter()
        .map(|v| keyword_vector(v.as_str().unwrap_or_default()))
        .collect();
    Ok(Json(json!({ "model": body["model"], "embeddings": embeddings })))
}

async fn generate(
    State(state): State<Arc<MockOllama>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.generate_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_generate.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    assert_eq!(body["stream"], json!(false));

    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    *state.last_prompt.lock().unwrap() = prompt.clone();

    let response = if prompt.contains("Return only the JSON object.") {
        format!("```json\n{}\n```", PROFILE_JSON)
    } else {
        "Fair winds, Robin. What would make the next crossing feel safe?".to_string()
    };
    Ok(Json(json!({ "model": body["model"], "response": response, "done": true })))
}

/// Start the mock on an ephemeral port. Returns its base URL.
pub async fn spawn_mock_ollama(state: Arc<MockOllama>) -> String {
    let app = Router::new()
        .route("/api/embed", post(embed))
        .route("/api/generate", post(generate))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Write a small journal corpus plus files that must be ignored.
pub fn write_journals(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("2024-03-01.md"),
        "Took the boat out at dawn. Sailing alone felt like freedom.\n\nInes says I should sail more.",
    )
    .unwrap();
    fs::write(
        dir.join("2024-03-02.md"),
        "Another late night at work. The deadline is eating my weekends.",
    )
    .unwrap();
    fs::write(
        dir.join("2024-03-03.txt"),
        "Could not sleep again. Counting waves instead of sheep.",
    )
    .unwrap();
    fs::write(dir.join("user_profile.json"), "{}").unwrap();
    fs::write(dir.join("helper.py"), "print('not a journal')").unwrap();
}

/// Write `config/jmem.toml` under `root` pointing at `ollama_url`.
pub fn write_config(root: &Path, ollama_url: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let content = format!(
        r#"[corpus]
dir = "{root}/journals"

[chunking]
max_chars = 200
overlap_chars = 20

[index]
dir = "{root}/index_db"

[embedding]
provider = "ollama"
model = "{model}"
dims = 3
url = "{url}"
batch_size = 2

[retrieval]
top_k = 2

[llm]
url = "{url}"
model = "mock-llm"

[profile]
cache_path = "{root}/user_profile.json"
"#,
        root = root.display(),
        model = EMBED_MODEL,
        url = ollama_url,
    );

    let path = config_dir.join("jmem.toml");
    fs::write(&path, content).unwrap();
    path
}
