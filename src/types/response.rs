// Responses - Résultats persistés des transactions
use super::primitives::Gas;
use super::reference::{StorageReference, TransactionReference};
use super::update::UpdateSet;
use super::values::StorageValue;
use serde::{Deserialize, Serialize};

/// Gas consumed along the three metered dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConsumed {
    pub cpu: Gas,
    pub ram: Gas,
    pub storage: Gas,
}

impl GasConsumed {
    pub fn total(&self) -> Gas {
        self.cpu.saturating_add(self.ram).saturating_add(self.storage)
    }
}

/// An instrumented jar, as kept in the response that installed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledJar {
    pub instrumented_jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
    pub verification_version: u32,
}

/// Exception thrown by the executed code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrownException {
    pub class_name: String,
    pub message: Option<String>,
}

impl ThrownException {
    pub fn new(class_name: &str, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.to_string(),
            message: Some(message.into()),
        }
    }
}

/// Why a transaction failed after validation. Persisted in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FailureCause {
    #[error("out of gas")]
    OutOfGas,

    #[error("jar verification failed: {0}")]
    VerificationFailed(String),

    #[error("uncaught exception {class_name}: {}", .message.as_deref().unwrap_or(""))]
    UncaughtException {
        class_name: String,
        message: Option<String>,
    },

    #[error("cannot deserialize: {0}")]
    Deserialization(String),

    #[error("no such code: {0}")]
    NoSuchCode(String),

    #[error("illegal call: {0}")]
    IllegalCall(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal value: {0}")]
    IllegalValue(String),
}

/// Responses of the initial (trusted setup) transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialResponse {
    JarInstalled(InstalledJar),
    GameteCreated {
        gamete: StorageReference,
        updates: UpdateSet,
    },
    Initialized {
        manifest: StorageReference,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuccessOutcome {
    JarInstalled(InstalledJar),
    ObjectCreated(StorageReference),
    /// Value returned by a method; `None` for void methods
    Returned(Option<StorageValue>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulResponse {
    pub outcome: SuccessOutcome,
    pub updates: UpdateSet,
    pub events: Vec<StorageReference>,
    pub gas: GasConsumed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionResponse {
    pub exception: ThrownException,
    pub updates: UpdateSet,
    pub events: Vec<StorageReference>,
    pub gas: GasConsumed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedResponse {
    pub cause: FailureCause,
    /// Only the caller's nonce and the payer's balance
    pub updates: UpdateSet,
    pub gas: GasConsumed,
    pub penalty: Gas,
}

/// Outcome of an executed transaction, paired 1:1 with its request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionResponse {
    Initial(InitialResponse),
    Successful(SuccessfulResponse),
    DeclaredException(ExceptionResponse),
    Failed(FailedResponse),
}

impl TransactionResponse {
    /// Updates published by the transaction (none for jar and init responses)
    pub fn updates(&self) -> Option<&UpdateSet> {
        match self {
            TransactionResponse::Initial(InitialResponse::GameteCreated { updates, .. }) => Some(updates),
            TransactionResponse::Initial(_) => None,
            TransactionResponse::Successful(r) => Some(&r.updates),
            TransactionResponse::DeclaredException(r) => Some(&r.updates),
            TransactionResponse::Failed(r) => Some(&r.updates),
        }
    }

    /// Jar installed by the transaction, if it is a successful jar store
    pub fn installed_jar(&self) -> Option<&InstalledJar> {
        match self {
            TransactionResponse::Initial(InitialResponse::JarInstalled(jar)) => Some(jar),
            TransactionResponse::Successful(SuccessfulResponse {
                outcome: SuccessOutcome::JarInstalled(jar),
                ..
            }) => Some(jar),
            _ => None,
        }
    }

    /// Total gas charged to the payer, penalty included
    pub fn gas_charged(&self) -> Gas {
        match self {
            TransactionResponse::Initial(_) => 0,
            TransactionResponse::Successful(r) => r.gas.total(),
            TransactionResponse::DeclaredException(r) => r.gas.total(),
            TransactionResponse::Failed(r) => r.gas.total().saturating_add(r.penalty),
        }
    }

    pub fn events(&self) -> &[StorageReference] {
        match self {
            TransactionResponse::Successful(r) => &r.events,
            TransactionResponse::DeclaredException(r) => &r.events,
            _ => &[],
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TransactionResponse::Initial(_) => "initial",
            TransactionResponse::Successful(_) => "successful",
            TransactionResponse::DeclaredException(_) => "declared-exception",
            TransactionResponse::Failed(_) => "failed",
        }
    }
}
