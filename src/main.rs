//! # Tutor Harness CLI (`tutor`)
//!
//! The `tutor` binary drives the retrieval and path-resolution core from the
//! command line: building the vector index, probing retrieval, inspecting
//! resolved step configurations, and serving the JSON API.
//!
//! ## Usage
//!
//! ```bash
//! tutor --config ./config/tutor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor index` | Build the vector index if absent, else load it |
//! | `tutor reindex` | Delete index artifacts and rebuild from the corpus |
//! | `tutor search "<query>"` | Retrieve passages for a query |
//! | `tutor step <n>` | Print the resolved configuration for a step |
//! | `tutor guidance <n>` | Print the resolved LLM guidance for a step |
//! | `tutor serve` | Start the JSON HTTP server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tutor_harness::config::{self, Config};
use tutor_harness::embedding::create_embedder;
use tutor_harness::index::IndexStore;
use tutor_harness::paths::load_paths_config;
use tutor_harness::resolve::{resolve_step_config, resolve_step_guidance};
use tutor_harness::retriever::Retriever;
use tutor_harness::server::{self, AppState};

/// Tutor Harness CLI — retrieval and path-resolution core for a
/// research-design tutoring service.
#[derive(Parser)]
#[command(
    name = "tutor",
    about = "Tutor Harness — retrieval and path-resolution core for a research-design tutoring service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tutor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index if absent, otherwise load and report it.
    ///
    /// Build-if-absent never re-scans an already-indexed corpus; use
    /// `reindex` to pick up corpus changes.
    Index,

    /// Delete both index artifacts and rebuild unconditionally.
    Reindex,

    /// Retrieve passages for a query.
    Search {
        /// The query string.
        query: String,

        /// Maximum number of passages to return.
        #[arg(long)]
        k: Option<usize>,

        /// Optional context boost appended to the query before embedding.
        #[arg(long)]
        boost: Option<String>,
    },

    /// Print the resolved configuration for a step as JSON.
    Step {
        /// Step number (1-9).
        step: u8,

        /// Resolved research path (quantitative, qualitative, mixed).
        #[arg(long)]
        path: Option<String>,

        /// Chosen methodology override.
        #[arg(long)]
        methodology: Option<String>,
    },

    /// Print the resolved LLM guidance for a step.
    Guidance {
        /// Step number (1-9).
        step: u8,

        #[arg(long)]
        path: Option<String>,

        #[arg(long)]
        methodology: Option<String>,
    },

    /// Start the JSON HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index => {
            let store = build_store(&cfg)?;
            store.open().await?;
            let status = store.status().await;
            println!(
                "Index ready: {} chunks (embedding {})",
                status.chunk_count,
                if status.embedding_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }
        Commands::Reindex => {
            let store = build_store(&cfg)?;
            let count = store.reindex().await?;
            println!("Reindexed: {} chunks", count);
        }
        Commands::Search { query, k, boost } => {
            let state = open_state(&cfg).await?;
            let k = k.unwrap_or(cfg.retrieval.k);
            let passages = state.retriever.retrieve(&query, k, boost.as_deref()).await;
            if passages.is_empty() {
                println!("No results.");
            }
            for (i, p) in passages.iter().enumerate() {
                let snippet: String = p.text.chars().take(240).collect();
                println!("{}. [{:.3}] {}", i + 1, p.score, p.source);
                println!("    excerpt: \"{}\"", snippet.replace('\n', " "));
                println!();
            }
        }
        Commands::Step {
            step,
            path,
            methodology,
        } => {
            let paths = load_paths_config(&cfg.paths.file);
            let config =
                resolve_step_config(&paths, path.as_deref(), methodology.as_deref(), step)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Guidance {
            step,
            path,
            methodology,
        } => {
            let paths = load_paths_config(&cfg.paths.file);
            let guidance =
                resolve_step_guidance(&paths, path.as_deref(), methodology.as_deref(), step)?;
            match guidance {
                Some(g) => println!("{}", g),
                None => println!("(no guidance)"),
            }
        }
        Commands::Serve => {
            let state = open_state(&cfg).await?;
            server::run_server(&cfg, state).await?;
        }
    }

    Ok(())
}

fn build_store(cfg: &Config) -> Result<Arc<IndexStore>> {
    let embedder = create_embedder(&cfg.embedding)?;
    Ok(Arc::new(IndexStore::new(
        cfg.corpus.root.clone(),
        cfg.index.dir.clone(),
        cfg.chunking.clone(),
        embedder,
    )))
}

/// Initialize the shared process state: paths tree, index store, retriever.
///
/// An index build failure at startup degrades to keyword-only retrieval
/// rather than failing the service.
async fn open_state(cfg: &Config) -> Result<AppState> {
    let embedder = create_embedder(&cfg.embedding)?;
    let store = Arc::new(IndexStore::new(
        cfg.corpus.root.clone(),
        cfg.index.dir.clone(),
        cfg.chunking.clone(),
        embedder.clone(),
    ));
    if let Err(e) = store.open().await {
        warn!(error = %e, "vector index unavailable; retrieval degrades to keyword scoring");
    }

    let retriever = Arc::new(Retriever::new(
        Arc::clone(&store),
        embedder,
        cfg.corpus.root.clone(),
    ));
    let paths = Arc::new(load_paths_config(&cfg.paths.file));

    Ok(AppState {
        paths,
        store,
        retriever,
        default_k: cfg.retrieval.k,
    })
}
