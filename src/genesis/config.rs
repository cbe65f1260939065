// Configuration de la chaîne - Paramètres de consensus et genesis
use super::spec::GenesisSpec;
use crate::execution::SUPPORTED_VERIFICATION_VERSION;
use crate::types::{Balance, ChainId, Gas};
use serde::{Deserialize, Serialize};

/// Règles communes à tous les nœuds d'une chaîne.
/// Two nodes with different parameters do not compute the same responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Identifiant attendu dans chaque requête
    pub chain_id: ChainId,

    /// Prix minimal du gas
    pub min_gas_price: Balance,

    /// Si vrai, `min_gas_price` n'est pas imposé
    #[serde(default)]
    pub ignores_gas_price: bool,

    /// Version de vérification appliquée aux jars
    pub verification_version: u32,

    /// Autorise les méthodes où le receveur paie le gas
    #[serde(default)]
    pub allows_self_charged: bool,

    /// Gas maximal d'une view
    pub max_gas_per_view: Gas,

    /// Nombre maximal de dépendances d'un jar
    pub max_dependencies: usize,

    /// Taille cumulée maximale (bytes) des dépendances d'un jar
    pub max_cumulative_size_of_dependencies: usize,
}

impl ConsensusParams {
    pub fn development(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            min_gas_price: 1,
            ignores_gas_price: false,
            verification_version: SUPPORTED_VERIFICATION_VERSION,
            allows_self_charged: false,
            max_gas_per_view: 1_000_000,
            max_dependencies: 20,
            max_cumulative_size_of_dependencies: 10_000_000,
        }
    }
}

/// Configuration de la chaîne
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Nom de la chaîne
    pub chain_name: String,

    /// Configuration du consensus
    pub consensus: ConsensusParams,

    /// Comptes créés à l'initialisation
    pub genesis: GenesisSpec,
}

impl ChainConfig {
    /// Built-in development chain
    pub fn development() -> Self {
        Self {
            chain_name: "Arbor Development".to_string(),
            consensus: ConsensusParams::development("arbor-dev"),
            genesis: GenesisSpec::development(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config() {
        let config = ChainConfig::development();
        assert_eq!(config.consensus.chain_id, "arbor-dev");
        assert!(!config.consensus.ignores_gas_price);
        assert_eq!(config.consensus.verification_version, SUPPORTED_VERIFICATION_VERSION);
    }

    #[test]
    fn test_optional_flags_default_to_false() {
        let json = r#"{
            "chain_id": "x",
            "min_gas_price": 5,
            "verification_version": 1,
            "max_gas_per_view": 100,
            "max_dependencies": 2,
            "max_cumulative_size_of_dependencies": 1000
        }"#;
        let params: ConsensusParams = serde_json::from_str(json).unwrap();
        assert!(!params.ignores_gas_price);
        assert!(!params.allows_self_charged);
        assert_eq!(params.min_gas_price, 5);
    }
}
