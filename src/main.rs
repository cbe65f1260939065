// Arbor Node - Entry point
// Principle: Deterministic execution over a persistent object store

mod cli;
mod execution;
mod genesis;
mod node;
mod storage;
mod transactions;
mod types;

#[cfg(test)]
mod tests;

use clap::Parser;
use cli::config::NodeConfig;
use cli::runner::{run_node, show_state};
use cli::{Cli, Commands};
use storage::Database;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_filter = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    // Logs go to stderr: stdout carries the responses
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(cmd) => {
            let config = NodeConfig::new(&cmd.chain, cmd.get_base_path()).map_err(|e| {
                error!("Configuration error: {}", e);
                anyhow::anyhow!("Configuration error: {}", e)
            })?;

            if let Err(e) = run_node(config).await {
                error!("Node error: {}", e);
                return Err(anyhow::anyhow!("Node error: {}", e));
            }
        }

        Commands::State(cmd) => {
            let config = NodeConfig::new(&cmd.chain, cmd.get_base_path())?;
            show_state(&config, &cmd.reference)?;
        }

        Commands::Purge(cmd) => {
            let path = cmd.get_base_path();

            if !cmd.yes {
                eprintln!("This will delete all chain data at: {}", path.display());
                eprintln!("Are you sure? [y/N]");

                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;

                if !input.trim().eq_ignore_ascii_case("y") {
                    eprintln!("Aborted.");
                    return Ok(());
                }
            }

            if path.exists() {
                let db_path = path.join(cli::config::DB_DIR);
                if db_path.exists() {
                    Database::destroy(&db_path)?;
                }
                std::fs::remove_dir_all(&path)?;
                info!("Purged chain data at: {}", path.display());
            } else {
                info!("No data to purge at: {}", path.display());
            }
        }
    }

    Ok(())
}
