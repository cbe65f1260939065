// CLI Configuration - Convert CLI args to node config
// Principle: Clear mapping between user input and internal configuration

use crate::cli::DEV_CHAIN;
use crate::genesis::ChainConfig;
use std::path::{Path, PathBuf};
use tracing::info;

/// Sous-répertoire de la base RocksDB
pub const DB_DIR: &str = "db";

/// Complete node configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Chain configuration (consensus rules and genesis)
    pub chain: ChainConfig,
    /// Base data path
    pub base_path: PathBuf,
}

impl NodeConfig {
    /// `chain` is either the built-in development chain or a JSON spec file
    pub fn new(chain: &str, base_path: PathBuf) -> Result<Self, ConfigError> {
        let chain = match chain {
            DEV_CHAIN => ChainConfig::development(),
            path => Self::load_chain_spec(path)?,
        };
        Ok(Self { chain, base_path })
    }

    /// Directory of the RocksDB store
    pub fn db_path(&self) -> PathBuf {
        self.base_path.join(DB_DIR)
    }

    /// Load chain spec from file
    fn load_chain_spec(path: &str) -> Result<ChainConfig, ConfigError> {
        let spec_path = Path::new(path);
        if !spec_path.exists() {
            return Err(ConfigError::ChainSpecNotFound(path.to_string()));
        }

        let content = std::fs::read_to_string(spec_path)
            .map_err(|e| ConfigError::ChainSpecReadError(e.to_string()))?;
        let chain: ChainConfig = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ChainSpecParseError(e.to_string()))?;

        if chain.consensus.chain_id.is_empty() {
            return Err(ConfigError::ChainSpecParseError("empty chain id".to_string()));
        }
        info!("Loaded chain spec {} ({})", chain.chain_name, chain.consensus.chain_id);
        Ok(chain)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Chain spec not found: {0}")]
    ChainSpecNotFound(String),

    #[error("Failed to read chain spec: {0}")]
    ChainSpecReadError(String),

    #[error("Failed to parse chain spec: {0}")]
    ChainSpecParseError(String),
}
