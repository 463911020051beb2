use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "segcast")]
#[command(author, version, about = "Live media segment broadcaster")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Segment a media file (or watch a segment directory) and broadcast to clients
    Host {
        /// Media file to segment, or a directory of segment files
        #[arg(required = true)]
        source: PathBuf,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Connect to a host and save the segments it broadcasts
    Join {
        /// Host name or IP address of the broadcaster
        #[arg(required = true)]
        address: String,

        /// Port the broadcaster listens on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory to save received segments in (emptied first)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools,
}
