use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Local hybrid keyword + semantic search over markdown and text documents.
#[derive(Parser, Debug)]
#[command(name = "docsift", version, about, long_about = None)]
pub struct Args {
    /// Path to the index database (overrides config and DOCSIFT_DB_PATH)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Configuration file (default: ./docsift.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index documents under a directory
    Index {
        /// Directory to index
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Skip embeddings and build a keyword-only index
        #[arg(long)]
        no_embed: bool,

        /// Also remove sources whose files no longer exist
        #[arg(long)]
        prune: bool,
    },

    /// Search the index and print summarized results
    Search {
        /// Search query
        query: String,

        /// Number of results to return (default from config, 3)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a chunk with its neighbouring context
    Fetch {
        /// Chunk id as printed by `search`
        id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics and embedding provider health
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove indexed sources whose files no longer exist
    Prune,

    /// Run as an MCP server on stdio
    Serve,
}
