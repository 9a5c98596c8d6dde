use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Self-learning classifier that matches error messages to Markdown documentation", long_about = None)]
pub struct Args {
    /// Path to a config file (defaults to ./triage.json when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk the documentation corpus and build or refresh the indices
    Index,

    /// Classify an error message against the indexed documentation
    Classify {
        /// The error message to classify
        #[arg(value_name = "QUERY")]
        query: String,

        /// Classification method to use
        #[arg(short, long)]
        method: Option<String>,

        /// Show the top N candidate documents instead of just the best
        #[arg(long, value_name = "N")]
        top: Option<usize>,

        /// Show the score breakdown for the winning document
        #[arg(long)]
        explain: bool,
    },

    /// Teach the engine the correct document for a query
    Teach {
        /// The error message that was (mis)classified
        #[arg(value_name = "QUERY")]
        query: String,

        /// Corpus-relative path of the correct document
        #[arg(value_name = "DOC_PATH")]
        doc_path: String,
    },

    /// Show engine health, learning statistics and cache counters
    Status,
}
