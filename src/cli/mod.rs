// src/cli/mod.rs
// Command-line interface for operating on a tag store file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

pub use commands::run;

#[derive(Parser)]
#[command(name = "tagstore")]
#[command(about = "Per-guild tags, aliases and tag search")]
#[command(version)]
pub struct Cli {
    /// Database file (overrides config and TAGSTORE_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Guild to operate on
    #[arg(short, long, global = true, env = "TAGSTORE_GUILD", default_value_t = 0)]
    pub guild: u64,

    /// Acting user id
    #[arg(short, long, global = true, env = "TAGSTORE_USER", default_value_t = 0)]
    pub user: u64,

    /// Act with guild administrator rights
    #[arg(long, global = true)]
    pub admin: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a tag
    Create {
        name: String,
        /// Tag content
        content: String,
    },

    /// Create an alias for an existing tag
    Alias {
        name: String,
        /// Tag the alias points at
        target: String,
    },

    /// Print a tag's content (counts as a use)
    Resolve { name: String },

    /// Show a tag's details and aliases
    Info { name: String },

    /// Search tags and aliases
    Search {
        query: String,

        /// Results per page
        #[arg(short, long)]
        limit: Option<usize>,

        /// Match any query word instead of all of them
        #[arg(long)]
        any: bool,

        /// Resume from a cursor printed by a previous search
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Replace a tag's content
    Edit { name: String, content: String },

    /// Rename a tag (its aliases follow)
    Rename { old: String, new: String },

    /// Delete a tag or an alias
    Delete { name: String },

    /// Take ownership of an unowned tag or alias
    Claim { name: String },

    /// List what a user owns
    List {
        /// Owner to list (default: --user)
        #[arg(long)]
        owner: Option<u64>,
    },

    /// Most used tags
    Leaderboard {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        cursor: Option<String>,
    },

    /// Delete every tag and alias in the guild
    Wipe {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Verify the search index against tags and aliases
    Check,

    /// Rebuild the search index
    Reindex,
}
