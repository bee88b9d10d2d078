//! Command-line entrypoint arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "registry-node", version)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "registry.toml")]
    pub config: PathBuf,

    /// This node's identity, as it appears in slot table assignments.
    #[arg(short, long, default_value = "node-1")]
    pub node_id: String,

    /// Emit logs as newline-delimited JSON instead of the default
    /// human-readable format.
    #[arg(long)]
    pub json_logs: bool,
}
