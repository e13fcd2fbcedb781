//! Command-line interface for the memory engine.
//!
//! A harness around the [`Coordinator`]: feed observations, ask
//! retrieval questions, inspect store statistics, and run maintenance.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use crate::blob::MemoryBlobStore;
use crate::config::{AgentFileConfig, EngineConfig};
use crate::coordinator::{Coordinator, EngineDeps};
use crate::embedding::HashEmbedder;
use crate::llm::providers::{OpenAiProvider, ScriptedProvider};
use crate::llm::provider::LlmProvider;
use crate::store::Store;
use crate::transcribe::FixedTranscriber;
use crate::upload::UploadOptions;

/// Mirix: long-term multi-modal memory for conversational agents.
#[derive(Parser, Debug)]
#[command(name = "mirix")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the SQLite database file.
    #[arg(short, long, env = "MIRIX_DB_PATH", default_value = "mirix.db")]
    pub db_path: PathBuf,

    /// Path to the YAML agent configuration.
    #[arg(short, long, env = "MIRIX_CONFIG")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed a text observation into memory.
    ///
    /// The observation is buffered and absorbed once the flush
    /// threshold is reached; use --flush to absorb immediately.
    Ingest {
        /// Observation text.
        text: String,

        /// Absorb buffered observations immediately.
        #[arg(long)]
        flush: bool,
    },

    /// Ask a retrieval question through the chat agent.
    Ask {
        /// The question.
        query: String,
    },

    /// Show row counts across all memory stores.
    Stats,

    /// Run the three-phase reflexion sweep.
    Reflexion,

    /// Snapshot the store and agent state into a directory.
    Save {
        /// Target directory.
        dir: PathBuf,
    },

    /// Restore the store and agent state from a snapshot directory.
    Load {
        /// Source directory.
        dir: PathBuf,
    },
}

/// Builds a coordinator for the CLI session.
///
/// Uses the OpenAI provider when `OPENAI_API_KEY` is set, otherwise a
/// scripted stand-in so offline commands (`ingest`, `stats`, snapshot
/// management) still work.
async fn build_coordinator(cli: &Cli) -> anyhow::Result<Coordinator> {
    let config = match &cli.config {
        Some(path) => {
            let file = AgentFileConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            EngineConfig::from_file_config(&file)
        }
        None => EngineConfig::builder().build(),
    };

    let store = Store::open(&cli.db_path)
        .with_context(|| format!("opening store {}", cli.db_path.display()))?;

    let provider: Arc<dyn LlmProvider> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => Arc::new(OpenAiProvider::new(&key, config.model_endpoint.as_deref())),
        Err(_) => Arc::new(ScriptedProvider::new()),
    };

    let deps = EngineDeps {
        store,
        blob: Arc::new(MemoryBlobStore::new()),
        provider,
        embedder: Arc::new(HashEmbedder::default()),
        transcriber: Arc::new(FixedTranscriber::default()),
        upload_options: UploadOptions::default(),
    };

    Coordinator::new(config, deps)
        .await
        .context("initializing coordinator")
}

/// Executes the parsed command.
#[allow(clippy::print_stdout)]
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let coordinator = build_coordinator(&cli).await?;

    match cli.command {
        Commands::Ingest { text, flush } => {
            let input = crate::accumulator::ObservationInput {
                text: Some(text),
                ..Default::default()
            };
            coordinator.send_message(input, true).await;
            if flush {
                coordinator.force_flush().await;
            }
            println!("buffered {} observation(s)", coordinator.accumulator().buffered());
        }
        Commands::Ask { query } => {
            let reply = coordinator.ask(&query).await;
            println!("{reply}");
        }
        Commands::Stats => {
            let stats = coordinator.store().stats().context("reading stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Reflexion => {
            let report = coordinator.reflexion_on_memory().await;
            println!(
                "reflexion complete (clean: {}): {} redundancy dispatches, {} pattern dispatches",
                report.is_clean(),
                report.redundancy.len(),
                report.pattern.len()
            );
        }
        Commands::Save { dir } => {
            coordinator.save_agent(&dir).context("saving snapshot")?;
            println!("saved snapshot to {}", dir.display());
        }
        Commands::Load { dir } => {
            coordinator.load_agent(&dir).context("loading snapshot")?;
            println!("restored snapshot from {}", dir.display());
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from(["mirix", "ingest", "user opened terminal", "--flush"]);
        let cli = cli.unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(matches!(
            cli.command,
            Commands::Ingest { flush: true, .. }
        ));
    }
}
