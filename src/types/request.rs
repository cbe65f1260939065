// Requests - Types de requêtes de transaction
use super::primitives::{Balance, ChainId, Gas, Hash, Nonce};
use super::reference::{StorageReference, TransactionReference};
use super::signatures::{ConstructorSignature, MethodSignature};
use super::values::StorageValue;
use serde::{Deserialize, Serialize};

/// Fields shared by every request that runs on behalf of a caller account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Account paying for and signing the request
    pub caller: StorageReference,
    /// Nonce (anti-replay)
    pub nonce: Nonce,
    pub chain_id: ChainId,
    pub gas_limit: Gas,
    /// Coins paid per unit of gas
    pub gas_price: Balance,
    /// Jar whose classes (and dependencies) the request runs against
    pub classpath: TransactionReference,
}

/// Installs the first jar of an uninitialized node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreInitialRequest {
    pub jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
}

/// Creates the gamete of an uninitialized node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameteCreationRequest {
    pub classpath: TransactionReference,
    pub initial_amount: Balance,
    pub public_key: String,
}

/// Ends the initialization of the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationRequest {
    pub classpath: TransactionReference,
    pub manifest: StorageReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreRequest {
    pub header: RequestHeader,
    pub jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorCallRequest {
    pub header: RequestHeader,
    pub constructor: ConstructorSignature,
    pub actuals: Vec<StorageValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMethodCallRequest {
    pub header: RequestHeader,
    pub method: MethodSignature,
    pub receiver: StorageReference,
    pub actuals: Vec<StorageValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMethodCallRequest {
    pub header: RequestHeader,
    pub method: MethodSignature,
    pub actuals: Vec<StorageValue>,
}

/// Closed set of transaction requests.
/// The `*View` variants run like their committing counterparts but never
/// advance the nonce nor publish updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRequest {
    JarStoreInitial(JarStoreInitialRequest),
    GameteCreation(GameteCreationRequest),
    Initialization(InitializationRequest),
    JarStore(JarStoreRequest),
    ConstructorCall(ConstructorCallRequest),
    InstanceMethodCall(InstanceMethodCallRequest),
    StaticMethodCall(StaticMethodCallRequest),
    ConstructorView(ConstructorCallRequest),
    InstanceView(InstanceMethodCallRequest),
    StaticView(StaticMethodCallRequest),
}

impl TransactionRequest {
    /// Reference of the transaction: hash of the canonical encoding of the request
    pub fn reference(&self) -> TransactionReference {
        match bincode::serialize(self) {
            Ok(bytes) => TransactionReference::new(Hash::hash(&bytes)),
            Err(_) => {
                // Never happens for these types, but the reference must stay total
                TransactionReference::new(Hash::hash(format!("{:?}", self).as_bytes()))
            }
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionRequest::JarStoreInitial(_)
                | TransactionRequest::GameteCreation(_)
                | TransactionRequest::Initialization(_)
        )
    }

    pub fn is_view(&self) -> bool {
        matches!(
            self,
            TransactionRequest::ConstructorView(_)
                | TransactionRequest::InstanceView(_)
                | TransactionRequest::StaticView(_)
        )
    }

    pub fn header(&self) -> Option<&RequestHeader> {
        match self {
            TransactionRequest::JarStoreInitial(_)
            | TransactionRequest::GameteCreation(_)
            | TransactionRequest::Initialization(_) => None,
            TransactionRequest::JarStore(r) => Some(&r.header),
            TransactionRequest::ConstructorCall(r) | TransactionRequest::ConstructorView(r) => {
                Some(&r.header)
            }
            TransactionRequest::InstanceMethodCall(r) | TransactionRequest::InstanceView(r) => {
                Some(&r.header)
            }
            TransactionRequest::StaticMethodCall(r) | TransactionRequest::StaticView(r) => {
                Some(&r.header)
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TransactionRequest::JarStoreInitial(_) => "jar-store-initial",
            TransactionRequest::GameteCreation(_) => "gamete-creation",
            TransactionRequest::Initialization(_) => "initialization",
            TransactionRequest::JarStore(_) => "jar-store",
            TransactionRequest::ConstructorCall(_) => "constructor-call",
            TransactionRequest::InstanceMethodCall(_) => "instance-method-call",
            TransactionRequest::StaticMethodCall(_) => "static-method-call",
            TransactionRequest::ConstructorView(_) => "constructor-view",
            TransactionRequest::InstanceView(_) => "instance-view",
            TransactionRequest::StaticView(_) => "static-view",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MethodSignature, StorageValue};

    fn header(nonce: Nonce) -> RequestHeader {
        RequestHeader {
            caller: StorageReference::new(TransactionReference::new(Hash::hash(b"gamete")), 0),
            nonce,
            chain_id: "test".to_string(),
            gas_limit: 100_000,
            gas_price: 1,
            classpath: TransactionReference::new(Hash::hash(b"jar")),
        }
    }

    fn call(nonce: Nonce) -> StaticMethodCallRequest {
        StaticMethodCallRequest {
            header: header(nonce),
            method: MethodSignature::new("test.C", "m", vec![], None),
            actuals: vec![StorageValue::Int(1)],
        }
    }

    #[test]
    fn test_reference_deterministic_and_distinct() {
        let a = TransactionRequest::StaticMethodCall(call(0));
        let b = TransactionRequest::StaticMethodCall(call(1));
        assert_eq!(a.reference(), a.clone().reference());
        assert_ne!(a.reference(), b.reference());
    }

    #[test]
    fn test_view_has_its_own_reference() {
        let call = TransactionRequest::StaticMethodCall(call(0));
        let view = TransactionRequest::StaticView(match &call {
            TransactionRequest::StaticMethodCall(r) => r.clone(),
            _ => unreachable!(),
        });
        assert!(view.is_view());
        assert!(!call.is_view());
        assert_ne!(call.reference(), view.reference());
    }
}
