//! Rulebook CLI entry point.
//!
//! Commands:
//! - `validate`: Load a pack and report its summary or the load error
//! - `ask`: Build the context bundle and prompt for one question
//! - `config`: Print the default, loaded, or path of the engine config

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "rulebook",
    about = "Rulebook: offline rules retrieval and prompt assembly",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a pack
    Validate {
        /// Pack root directory
        #[arg(short, long)]
        pack: PathBuf,

        /// Embedding model the host was built with
        #[arg(long)]
        embedding_id: Option<String>,

        /// Also compare declared counts with the database
        #[arg(long)]
        verify_counts: bool,
    },

    /// Assemble the prompt for a question
    Ask {
        /// Pack root directory
        #[arg(short, long)]
        pack: PathBuf,

        /// Engine config file (defaults to ~/.rulebook/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the full result as JSON instead of the prompt
        #[arg(long)]
        json: bool,

        /// Embedding model the query vector was built with (vector mode)
        #[arg(long)]
        embedding_model: Option<String>,

        /// Comma-separated query embedding (vector mode)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        query_vector: Option<Vec<f32>>,

        /// The question
        question: String,
    },

    /// Engine configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default config as TOML
    Default,
    /// Print the effective config as TOML
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Validate {
            pack,
            embedding_id,
            verify_counts,
        } => commands::validate::run(pack, embedding_id, verify_counts).await,
        Commands::Ask {
            pack,
            config,
            json,
            embedding_model,
            query_vector,
            question,
        } => {
            let vector = commands::ask::VectorArgs {
                embedding_model,
                query_vector,
            };
            commands::ask::run(pack, config, json, question, vector).await
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::default(),
            ConfigAction::Show => commands::config_cmd::show(),
            ConfigAction::Path => commands::config_cmd::path(),
        },
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}
