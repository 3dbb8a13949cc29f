use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "relgate", version, about = "Authorization decision service")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the gRPC decision service and the REST surface.
    Serve,
    /// Load and validate the configuration, then print a summary.
    CheckConfig,
    /// Generate an admin key and the hash to put in `[admin].key_hash`.
    CreateAdminKey,
}
