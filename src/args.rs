use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "watch-page")]
#[command(about = "Watches rendered pages and reports what changed between checks")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Monitor a page until interrupted
    Watch {
        /// Page to watch
        url: String,

        /// Minutes between checks
        #[arg(short, long)]
        interval: Option<u64>,

        /// JSON configuration file; the URL argument overrides its `url`
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for per-job results files
        #[arg(long, default_value = "results")]
        results_dir: PathBuf,
    },

    /// Print the snapshot of a saved HTML file as JSON
    Extract {
        file: PathBuf,

        /// JSON configuration file for navigation and extraction rules
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the changes between two saved HTML files as JSON
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Annotate the changes when an analysis key is configured
        #[arg(short, long)]
        annotate: bool,

        /// JSON configuration file for rule tables and analysis settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
