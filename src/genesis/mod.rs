// Genesis - Configuration de la chaîne et initialisation du nœud
pub mod config;
pub mod spec;

pub use config::{ChainConfig, ConsensusParams};
pub use spec::{GenesisBuilder, GenesisPlan, GenesisSpec};
