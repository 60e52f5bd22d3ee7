//! # Journal Memory CLI (`jmem`)
//!
//! ## Usage
//!
//! ```bash
//! jmem --config ./config/jmem.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jmem ingest` | Scan the journal corpus, chunk, embed, and rebuild the index |
//! | `jmem profile` | Synthesize the user profile and write the cache file |
//! | `jmem retrieve "<query>"` | Show the excerpts retrieval would use |
//! | `jmem prompt "<query>"` | Print the fully assembled prompt |
//! | `jmem ask "<query>"` | Ask the coaching model a question |
//! | `jmem stats` | Show index metadata |

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use journal_memory::config::load_config;
use journal_memory::progress::ProgressMode;
use journal_memory::{ingest, profile, stats, turn};

/// Journal Memory: retrieval and user-profile memory for a journaling coach.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/jmem.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "jmem",
    about = "Journal Memory: retrieval and user-profile memory for a journaling coach",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/jmem.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the retrieval index from the journal corpus.
    ///
    /// Always a full rebuild: the previous index is replaced only after
    /// every chunk has been embedded.
    Ingest {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr: human, json, or off.
        /// Default: human when stderr is a TTY, off otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Synthesize the user profile and write it to the cache file.
    ///
    /// Does nothing if the cache already exists, unless `--force` is given.
    Profile {
        /// Delete the cached profile first and regenerate it.
        #[arg(long)]
        force: bool,
    },

    /// Show the journal excerpts most similar to a query.
    Retrieve {
        query: String,

        /// Number of excerpts (default: retrieval.top_k).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Print the assembled prompt for a query.
    Prompt { query: String },

    /// Ask the coaching model a question, with profile and excerpts.
    Ask { query: String },

    /// Show index and profile status.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run, progress } => {
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(value) => match ProgressMode::parse(value) {
                    Some(mode) => mode,
                    None => bail!("Invalid --progress value '{}': use human, json, or off", value),
                },
            };
            ingest::run_ingest(&config, dry_run, mode).await?;
        }
        Commands::Profile { force } => {
            profile::run_profile(&config, force).await?;
        }
        Commands::Retrieve { query, k } => {
            turn::run_retrieve(&config, &query, k).await?;
        }
        Commands::Prompt { query } => {
            turn::run_prompt(&config, &query).await?;
        }
        Commands::Ask { query } => {
            turn::run_ask(&config, &query).await?;
        }
        Commands::Stats => {
            stats::run_stats(&config).await?;
        }
    }

    Ok(())
}
