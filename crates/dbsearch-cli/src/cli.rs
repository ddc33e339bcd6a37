//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dbsearch - relational database search administration
#[derive(Parser, Debug)]
#[command(name = "dbsearch")]
#[command(author, version, about = "dbsearch search backend administration tool", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DBSEARCH_CONFIG", default_value = "dbsearch.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or reconcile storage for configured indexes
    Add {
        /// Index to add; all configured indexes when omitted
        #[arg(short, long)]
        index: Option<String>,
    },

    /// Apply changed field configuration
    Update {
        /// Index to update; all configured indexes when omitted
        #[arg(short, long)]
        index: Option<String>,
    },

    /// Remove an index and its storage
    Remove {
        /// Index to remove
        #[arg(short, long)]
        index: String,
    },

    /// Remove the storage of every index on a server
    DropServer {
        /// Server ID
        #[arg(value_name = "SERVER_ID")]
        server_id: String,
    },

    /// Index items from a JSON file holding an array of items
    Index {
        /// Target index
        #[arg(short, long)]
        index: String,

        /// JSON file with the items
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Delete items by ID
    Delete {
        /// Target index
        #[arg(short, long)]
        index: String,

        /// Item IDs
        #[arg(value_name = "ITEM_ID", required = true)]
        ids: Vec<String>,
    },

    /// Delete every item of an index
    Clear {
        /// Target index
        #[arg(short, long)]
        index: String,

        /// Only delete items of this datasource
        #[arg(short, long)]
        datasource: Option<String>,
    },

    /// Search an index
    Search {
        /// Target index
        #[arg(short, long)]
        index: String,

        /// Keywords: terms are ANDed, `-term` excludes, `OR` separates alternatives
        #[arg(value_name = "KEYS")]
        keys: Option<String>,

        /// JSON file with a full query; keywords given on the command line replace its keys
        #[arg(short, long)]
        query: Option<PathBuf>,

        /// Results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Results to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Print the full result set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Suggest completions for partial input
    Autocomplete {
        /// Target index
        #[arg(short, long)]
        index: String,

        /// What the user typed so far
        #[arg(value_name = "INPUT")]
        input: String,

        /// Suggestions to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Configuration file operations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration
    Show,

    /// Get a configuration value by dotted key
    Get {
        /// Dotted key, e.g. `autocomplete.suggest_words`
        key: String,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
