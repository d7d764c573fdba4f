use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tiny_fs::DEFAULT_BLOCK_SIZE;

#[derive(Parser)]
pub struct Cli {
    /// Image file on the host
    #[arg(long, short)]
    pub image: PathBuf,

    /// Bytes per block
    #[arg(long, short, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image
    Mkfs {
        /// Image size in bytes, a multiple of the block size
        #[arg(long, short)]
        size: usize,
    },

    /// Copy every regular file of a host directory into the image
    Pack {
        /// Source directory
        #[arg(long, short)]
        source: PathBuf,
    },

    /// List files with their sizes
    Ls,

    /// Print a file to stdout
    Cat { name: String },
}
