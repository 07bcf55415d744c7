use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "shoebox")]
#[command(about = "Sorts a photo and video folder into a deduplicated year/month library", long_about = None)]
pub struct Cli {
    /// More log output (-v debug, -vv trace); `TRACING_LEVEL` overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Copy new files from the source folder into the destination library
    Scan {
        /// Source folder (overrides `source_root`)
        #[arg(long)]
        src: Option<PathBuf>,
        /// Destination library (overrides `dest_root`)
        #[arg(long)]
        dest: Option<PathBuf>,
        /// Print the final status as JSON
        #[arg(long)]
        json: bool,
    },
    /// List files still waiting in the incoming ledger
    Incoming(PageArgs),
    /// List files already copied into the library
    Outcoming(PageArgs),
    /// Show one library record
    Show { id: i64 },
    /// Replace the tags of a library record
    Tag {
        id: i64,
        /// New tag list; pass none to clear all tags
        tags: Vec<String>,
    },
    /// Delete all incoming and outcoming records
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct PageArgs {
    #[arg(long, default_value_t = 0)]
    pub offset: i64,
    #[arg(long, default_value_t = 50)]
    pub limit: i64,
    /// Print the page as JSON
    #[arg(long)]
    pub json: bool,
}
