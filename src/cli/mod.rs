// CLI - Command Line Interface for the Arbor node
// Principle: Simple, clear, composable commands

pub mod config;
pub mod runner;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Name of the built-in development chain
pub const DEV_CHAIN: &str = "dev";

/// Arbor Node - deterministic object-store blockchain node
#[derive(Parser, Debug)]
#[command(name = "arbor-node")]
#[command(author = "Arbor Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Arbor node - transaction execution over a persistent object store")]
#[command(long_about = r#"
Arbor executes transactions against a persistent, versioned object store:
jar installations, constructor calls and method calls, under gas metering.

Start a development node and feed it requests, one JSON object per line:
  arbor-node run < requests.jsonl

Inspect an object:
  arbor-node state <transaction-hex>#<progressive-hex>
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "ARBOR_LOG")]
    pub log_level: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the node, reading requests from stdin
    Run(RunCmd),

    /// Print the persisted state of an object
    State(StateCmd),

    /// Purge chain data
    Purge(PurgeCmd),
}

/// Run the node
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Base path for chain data
    #[arg(short = 'd', long, env = "ARBOR_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Chain specification (dev or path to a JSON spec file)
    #[arg(long, default_value = DEV_CHAIN)]
    pub chain: String,
}

/// Print an object
#[derive(Parser, Debug)]
pub struct StateCmd {
    /// Base path for chain data
    #[arg(short = 'd', long, env = "ARBOR_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Chain whose store is read
    #[arg(long, default_value = DEV_CHAIN)]
    pub chain: String,

    /// Storage reference, as <transaction-hex>#<progressive-hex>
    pub reference: String,
}

/// Purge chain data
#[derive(Parser, Debug)]
pub struct PurgeCmd {
    /// Base path for chain data
    #[arg(short = 'd', long, env = "ARBOR_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Chain to purge
    #[arg(long, default_value = DEV_CHAIN)]
    pub chain: String,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Base path of a chain, defaulting to the platform data directory.
/// A chain given as a spec file is stored under the file name.
pub fn chain_base_path(base_path: Option<&PathBuf>, chain: &str) -> PathBuf {
    if let Some(path) = base_path {
        return path.clone();
    }

    let name = Path::new(chain)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| chain.to_string());
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("arbor")
        .join("chains")
        .join(name)
}

impl RunCmd {
    pub fn get_base_path(&self) -> PathBuf {
        chain_base_path(self.base_path.as_ref(), &self.chain)
    }
}

impl StateCmd {
    pub fn get_base_path(&self) -> PathBuf {
        chain_base_path(self.base_path.as_ref(), &self.chain)
    }
}

impl PurgeCmd {
    pub fn get_base_path(&self) -> PathBuf {
        chain_base_path(self.base_path.as_ref(), &self.chain)
    }
}
