// Erreurs - Rejets et fautes du moteur
use crate::types::{Balance, Gas, Nonce, StorageReference, TransactionReference};

/// Why a request was refused before execution. Nothing is persisted and no
/// gas is charged: the request can be corrected and submitted again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    #[error("the node is not initialized yet")]
    NotInitialized,

    #[error("the node is already initialized")]
    AlreadyInitialized,

    #[error("the signature of the request has not been verified")]
    SignatureNotVerified,

    #[error("the caller {0} is not an account")]
    CallerNotAccount(StorageReference),

    #[error("transaction {0} already committed")]
    AlreadyCommitted(TransactionReference),

    #[error("incorrect chain id: expected {expected}, found {found}")]
    ChainIdMismatch { expected: String, found: String },

    #[error("incorrect nonce: expected {expected}, found {found}")]
    NonceMismatch { expected: Nonce, found: Nonce },

    #[error("gas limit {found} is below the minimum {minimum}")]
    GasLimitTooLow { minimum: Gas, found: Gas },

    #[error("gas limit {found} of a view exceeds the maximum {maximum}")]
    GasLimitTooHighForView { maximum: Gas, found: Gas },

    #[error("payer {payer} has {available} coins but {required} are needed")]
    InsufficientBalance {
        payer: StorageReference,
        required: Balance,
        available: Balance,
    },

    #[error("gas price {found} is below the minimum {minimum}")]
    GasPriceTooLow { minimum: Balance, found: Balance },

    #[error("cannot resolve the classpath: {0}")]
    UnresolvedClasspath(String),

    #[error("too many dependencies: {found} (maximum {maximum})")]
    TooManyDependencies { maximum: usize, found: usize },

    #[error("cumulative size of dependencies {found} exceeds {maximum}")]
    DependenciesTooLarge { maximum: usize, found: usize },
}

/// A defect of the node itself. The node must stop: continuing could make
/// it diverge from the other nodes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineFault {
    #[error("store failure: {0}")]
    Store(String),

    #[error("malformed initial transaction: {0}")]
    MalformedInitial(String),

    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

impl From<crate::storage::StoreError> for EngineFault {
    fn from(error: crate::storage::StoreError) -> Self {
        EngineFault::Store(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("rejected: {0}")]
    Rejected(#[from] RejectionReason),

    #[error("engine fault: {0}")]
    Fatal(#[from] EngineFault),
}

impl From<crate::storage::StoreError> for TransactionError {
    fn from(error: crate::storage::StoreError) -> Self {
        TransactionError::Fatal(error.into())
    }
}
