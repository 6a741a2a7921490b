use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dropshelf")]
#[command(about = "Watches a drop folder and imports ebooks into the library", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the configured directory and import files as they settle (Ctrl-C to stop)
    Watch,
    /// Import a single file right away
    Import {
        /// Book file to import
        path: PathBuf,
    },
    /// Import every supported file currently in the watched directory
    ScanOnce,
    /// Show recent import history
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a conversion flag (auto_convert_txt, auto_convert_mobi)
    SetFlag {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Print configuration values
    PrintConfig,
}
