//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trawl_core::SearchMethod;

/// Hybrid lexical and semantic search over private document collections.
#[derive(Parser, Debug)]
#[command(name = "trawl", version, about)]
pub struct Cli {
    /// Directory holding trawl.toml and its per-environment overlays
    #[arg(long, env = "TRAWL_CONFIG_DIR", default_value = ".")]
    pub config_dir: PathBuf,

    /// Configuration environment (dev, prod, test)
    #[arg(long = "env", env = "RUST_ENV", default_value = "dev")]
    pub environment: String,

    /// Identity the request is made as
    #[arg(short, long, env = "TRAWL_USER", default_value = "local", global = true)]
    pub user: String,

    /// Act with administrator rights
    #[arg(long, global = true)]
    pub admin: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage collections
    #[command(subcommand)]
    Collections(CollectionsCommand),

    /// Inspect or remove documents
    #[command(subcommand)]
    Documents(DocumentsCommand),

    /// List the chunks of one document
    Chunks {
        collection: String,
        document: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Index JSONL chunk records (one `{content, metadata}` object per line)
    Ingest {
        collection: String,
        /// Files or directories; directories are walked for `*.jsonl`
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Search collections
    Search(SearchArgs),

    /// Answer a question from retrieved chunks
    Ask {
        /// Language model id or alias
        #[arg(short, long)]
        model: String,
        #[command(flatten)]
        search: SearchArgs,
    },

    /// Order passages by relevance to a prompt
    Rerank {
        prompt: String,
        /// Rerank or language model id or alias
        #[arg(short, long)]
        model: String,
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// List the reachable models
    Models,
}

#[derive(Subcommand, Debug)]
pub enum CollectionsCommand {
    /// List visible collections, or the given ones
    List { ids: Vec<String> },
    Create {
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Embedding model id or alias
        #[arg(short, long)]
        model: String,
        /// Make the collection readable by everyone (admin only)
        #[arg(long)]
        public: bool,
        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum DocumentsCommand {
    List {
        collection: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    Delete { collection: String, document: String },
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    pub prompt: String,

    /// Collection to search; repeatable, all visible collections when omitted
    #[arg(short, long = "collection")]
    pub collections: Vec<String>,

    /// lexical, semantic or hybrid
    #[arg(long, default_value = "hybrid")]
    pub method: SearchMethod,

    /// Number of results; 0 returns everything (defaults to search.k)
    #[arg(short)]
    pub k: Option<usize>,

    /// Reciprocal rank fusion constant (defaults to search.rff_k)
    #[arg(long)]
    pub rff_k: Option<usize>,
}
