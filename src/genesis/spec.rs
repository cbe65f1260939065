// Spécification du genesis - Requêtes d'initialisation du nœud
use crate::execution::base_code;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Spécification du genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisSpec {
    /// Clé publique du gamete (hex)
    pub gamete_public_key: String,

    /// Coins créés pour le gamete
    pub initial_amount: Balance,
}

impl GenesisSpec {
    pub fn development() -> Self {
        Self {
            gamete_public_key: hex::encode(Hash::hash(b"arbor development gamete").as_bytes()),
            initial_amount: 1_000_000_000_000,
        }
    }
}

impl Default for GenesisSpec {
    fn default() -> Self {
        Self::development()
    }
}

/// The initial transactions of a node, in the order they must run
#[derive(Debug, Clone)]
pub struct GenesisPlan {
    pub base_jar: JarStoreInitialRequest,
    pub gamete: GameteCreationRequest,
    pub initialization: InitializationRequest,
}

impl GenesisPlan {
    /// Base library jar.
    pub fn base_jar_reference(&self) -> TransactionReference {
        TransactionRequest::JarStoreInitial(self.base_jar.clone()).reference()
    }

    /// The gamete is the first object allocated by its creation transaction
    pub fn gamete_reference(&self) -> StorageReference {
        StorageReference::new(TransactionRequest::GameteCreation(self.gamete.clone()).reference(), 0)
    }

    pub fn requests(&self) -> Vec<TransactionRequest> {
        vec![
            TransactionRequest::JarStoreInitial(self.base_jar.clone()),
            TransactionRequest::GameteCreation(self.gamete.clone()),
            TransactionRequest::Initialization(self.initialization.clone()),
        ]
    }
}

/// Builder pour les requêtes genesis
pub struct GenesisBuilder {
    spec: GenesisSpec,
}

impl GenesisBuilder {
    pub fn new(spec: GenesisSpec) -> Self {
        Self { spec }
    }

    /// The gamete doubles as the manifest of the node
    pub fn build(self) -> Result<GenesisPlan, bincode::Error> {
        let base_jar = JarStoreInitialRequest {
            jar: base_code().encode()?,
            dependencies: vec![],
        };
        let classpath = TransactionRequest::JarStoreInitial(base_jar.clone()).reference();

        let gamete = GameteCreationRequest {
            classpath,
            initial_amount: self.spec.initial_amount,
            public_key: self.spec.gamete_public_key,
        };
        let manifest = StorageReference::new(TransactionRequest::GameteCreation(gamete.clone()).reference(), 0);

        Ok(GenesisPlan {
            base_jar,
            gamete,
            initialization: InitializationRequest { classpath, manifest },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_plan_is_deterministic() {
        let a = GenesisBuilder::new(GenesisSpec::development()).build().unwrap();
        let b = GenesisBuilder::new(GenesisSpec::development()).build().unwrap();
        assert_eq!(a.requests(), b.requests());
        assert_eq!(a.gamete_reference(), b.gamete_reference());
    }

    #[test]
    fn test_plan_links_its_requests() {
        let plan = GenesisBuilder::new(GenesisSpec::development()).build().unwrap();
        assert_eq!(plan.gamete.classpath, plan.base_jar_reference());
        assert_eq!(plan.initialization.classpath, plan.base_jar_reference());
        assert_eq!(plan.initialization.manifest, plan.gamete_reference());
        assert!(plan.requests().iter().all(TransactionRequest::is_initial));
    }

    #[test]
    fn test_spec_changes_gamete() {
        let mut spec = GenesisSpec::development();
        spec.initial_amount += 1;
        let other = GenesisBuilder::new(spec).build().unwrap();
        let dev = GenesisBuilder::new(GenesisSpec::development()).build().unwrap();
        assert_ne!(other.gamete_reference(), dev.gamete_reference());
    }
}
