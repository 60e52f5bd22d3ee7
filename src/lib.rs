//! # Journal Memory
//!
//! A local-first memory pipeline for a journal-aware coaching assistant.
//!
//! The pipeline turns a directory of private journal entries into two kinds
//! of standing context for a language model: semantically retrievable
//! excerpts, and a structured profile of the author. For each question it
//! assembles both into one prompt.
//!
//! ## Architecture
//!
//! ```text
//!  ingestion (jmem ingest)                 query time (jmem ask)
//! ┌──────────┐  ┌─────────┐  ┌─────────┐   ┌───────────┐
//! │ journals │─▶│ Chunker │─▶│  Index  │──▶│ Retriever │──┐
//! └────┬─────┘  └─────────┘  └─────────┘   └───────────┘  │  ┌───────────┐   ┌─────┐
//!      │                                                  ├─▶│ Assembler │──▶│ LLM │
//!      │        ┌──────────────────────┐   ┌───────────┐  │  └───────────┘   └─────┘
//!      └───────▶│ Profile Synthesizer  │──▶│  profile  │──┘
//!               │ (one LLM call)       │   │   cache   │
//!               └──────────────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! jmem ingest                       # chunk + embed the journal corpus
//! jmem profile                      # synthesize user_profile.json
//! jmem retrieve "sleep"             # inspect what retrieval finds
//! jmem ask "Why do I keep avoiding the job search?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`corpus`] | Journal directory scanner |
//! | [`chunk`] | Recursive-separator chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory and SQLite nearest-neighbor indexes |
//! | [`ingest`] | Full index rebuild |
//! | [`retrieve`] | Query-time retrieval |
//! | [`llm`] | Inference service client |
//! | [`profile`] | Profile synthesis, validation, and caching |
//! | [`assemble`] | Augmented prompt assembly |
//! | [`turn`] | One question, end to end |
//! | [`progress`] | Ingestion progress reporting |
//! | [`stats`] | Index statistics |

pub mod assemble;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod profile;
pub mod progress;
pub mod retrieve;
pub mod stats;
pub mod turn;
