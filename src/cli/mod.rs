use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

use crate::search::SearchMode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve searches over http and keep the note cache warm.
    Daemon {
        /// Address to listen on
        #[clap(long, default_value = "127.0.0.1:8787")]
        addr: String,
    },
    /// Find notes related to a query or to another note
    Search {
        /// Free-text query
        #[clap(short, long)]
        query: Option<String>,

        /// Vault-relative path of the reference note
        #[clap(short, long = "from")]
        from: Option<String>,

        /// Maximum number of results
        #[clap(short, long)]
        limit: Option<usize>,

        /// Override the configured search mode
        #[clap(short, long, value_enum)]
        mode: Option<SearchMode>,
    },
}
