use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// setupforge - Unattended software deployment engine
#[derive(Parser)]
#[command(name = "setupforge")]
#[command(about = "Installs an ordered set of modules described by a declarative manifest")]
#[command(version)]
pub struct Cli {
    /// Directory holding the module bundle (order.json, module folders,
    /// embedded setup configuration).
    #[arg(long, global = true, default_value = "bundle")]
    pub bundle: PathBuf,

    /// Development mode: verbose logging, Working Root location printed
    /// at startup.
    #[arg(long, global = true)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the setup configuration and run the full install sequence
    Run {
        /// Skip the remote configuration fetch and use the embedded copy
        #[arg(long)]
        offline: bool,
    },
    /// Resolve and validate the configuration without installing anything
    Validate,
    /// Print the bundled license text
    Eula,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
