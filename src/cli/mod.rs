//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "shopassist",
    version,
    about = "Phone-shop assistant with hybrid product search and conversation memory",
    long_about = "shopassist answers customer questions about a phone shop's catalog. Product questions \
                  are answered from a hybrid keyword + semantic search with cross-encoder re-ranking; \
                  conversations are remembered per thread and summarized as they grow."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/shopassist/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file (e.g., "local", "fast")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Talk to the assistant (one message, or an interactive session without MESSAGE)
    Chat {
        /// Continue an existing conversation thread
        #[arg(short, long)]
        thread: Option<String>,

        /// Message to send
        message: Option<String>,

        /// Print the full turn as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search the product catalog without generating a reply
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Skip cross-encoder re-ranking
        #[arg(long)]
        no_rerank: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a stored conversation thread
    History {
        /// Thread ID (lists recent threads when omitted)
        thread_id: Option<String>,

        /// Show the thread in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Catalog maintenance
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// Clean scraped product records into a catalog file
    Normalize {
        /// Raw records (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the normalized catalog
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show catalog size and field coverage
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
