// References - Identifiants de transactions et d'objets en storage
use super::primitives::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a committed transaction: the Blake3 hash of its request.
///
/// `Ord` is byte order. It only serves canonical sorting of updates; the
/// commit order of transactions is their position in the store's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionReference(Hash);

impl TransactionReference {
    pub fn new(hash: Hash) -> Self {
        TransactionReference(hash)
    }

    pub fn hash(&self) -> &Hash {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl FromStr for TransactionReference {
    type Err = ReferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
            .map(TransactionReference)
            .map_err(|_| ReferenceParseError::InvalidHash(s.to_string()))
    }
}

/// Reference to an object in storage: the transaction that created it and
/// the progressive number of the object inside that transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageReference {
    pub transaction: TransactionReference,
    pub progressive: u64,
}

impl StorageReference {
    pub fn new(transaction: TransactionReference, progressive: u64) -> Self {
        Self {
            transaction,
            progressive,
        }
    }

    /// Key bytes: transaction hash followed by big-endian progressive
    pub fn to_key_bytes(&self) -> [u8; 40] {
        let mut key = [0u8; 40];
        key[..32].copy_from_slice(self.transaction.as_bytes());
        key[32..].copy_from_slice(&self.progressive.to_be_bytes());
        key
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{:x}", self.transaction, self.progressive)
    }
}

impl FromStr for StorageReference {
    type Err = ReferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx, progressive) = s
            .split_once('#')
            .ok_or_else(|| ReferenceParseError::MissingProgressive(s.to_string()))?;
        let transaction = tx.parse()?;
        let progressive = u64::from_str_radix(progressive, 16)
            .map_err(|_| ReferenceParseError::InvalidProgressive(progressive.to_string()))?;
        Ok(StorageReference::new(transaction, progressive))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReferenceParseError {
    #[error("invalid transaction hash: {0}")]
    InvalidHash(String),

    #[error("missing '#<progressive>' in storage reference: {0}")]
    MissingProgressive(String),

    #[error("invalid progressive: {0}")]
    InvalidProgressive(String),
}
