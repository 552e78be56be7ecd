use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser)]
#[command(
    name = "loco",
    about = "Local LM ensemble-consensus repository analyzer",
    version,
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output (info level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output (debug level) and the debug artifact bundle
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank the most important files of a repository
    Analyze {
        /// Project root (defaults to the current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Worker invocation count override
        #[arg(long)]
        workers: Option<usize>,

        /// Produce the templated markdown summary instead of a ranking
        #[arg(long)]
        nl: bool,

        /// Ignore a fresh cache and re-run the pipeline
        #[arg(long)]
        refresh: bool,

        /// OpenAI-compatible endpoint base URL
        #[arg(long, env = "LOCO_BASE_URL")]
        base_url: Option<String>,

        /// Model name forwarded to the provider
        #[arg(long, env = "LOCO_MODEL")]
        model: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Suppress the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List models served by the provider (endpoint health check)
    Models {
        /// OpenAI-compatible endpoint base URL
        #[arg(long, env = "LOCO_BASE_URL")]
        base_url: Option<String>,
    },

    /// Show what is cached per tier and whether it is fresh
    Status {
        /// Project root (defaults to the current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Json,
}
