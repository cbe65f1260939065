// State - Magasin append-only des transactions et index d'historique
use super::db::{Database, DatabaseError, WriteOp};
use crate::types::{
    InitialResponse, StorageReference, TransactionReference, TransactionRequest,
    TransactionResponse, UpdateSlot,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;

/// Storage key prefixes
const PREFIX_REQUEST: &[u8] = b"request:";
const PREFIX_RESPONSE: &[u8] = b"response:";
const PREFIX_HISTORY: &[u8] = b"history:";
const PREFIX_LOG: &[u8] = b"log:";
const KEY_LOG_LENGTH: &[u8] = b"log_length";
const KEY_MANIFEST: &[u8] = b"manifest";

/// Read access to committed state. Everything the engine needs to validate
/// and execute a transaction goes through this trait.
pub trait StoreView: Send + Sync {
    fn request(&self, reference: &TransactionReference) -> Result<Option<TransactionRequest>, StoreError>;

    fn response(&self, reference: &TransactionReference) -> Result<Option<TransactionResponse>, StoreError>;

    /// Transactions that updated `object`, most recent first
    fn history(&self, object: &StorageReference) -> Result<Vec<TransactionReference>, StoreError>;

    /// Manifest recorded by the initialization transaction
    fn manifest(&self) -> Result<Option<StorageReference>, StoreError>;

    fn is_initialized(&self) -> Result<bool, StoreError> {
        Ok(self.manifest()?.is_some())
    }

    fn contains(&self, reference: &TransactionReference) -> Result<bool, StoreError> {
        Ok(self.response(reference)?.is_some())
    }
}

/// A store that accepts new transactions. `commit` is atomic: after an
/// error nothing of the transaction is visible.
pub trait Store: StoreView {
    fn commit(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<(), StoreError>;

    /// All committed transactions, in commit order
    fn transactions(&self) -> Result<Vec<TransactionReference>, StoreError>;
}

/// Objects whose history a response extends
pub fn touched_objects(response: &TransactionResponse) -> Vec<StorageReference> {
    response.updates().map(|u| u.objects()).unwrap_or_default()
}

/// Slots of `object` written by a response
fn slots_of(response: &TransactionResponse, object: &StorageReference) -> BTreeSet<UpdateSlot> {
    response
        .updates()
        .map(|u| u.for_object(object).map(|update| update.key().slot).collect())
        .unwrap_or_default()
}

/// History of `object` once `reference` is committed, most recent first.
/// An older transaction stays only if it wrote a slot that no newer one
/// overwrites; the creating transaction, carrying the class tag, always stays.
pub fn compacted_history(
    store: &dyn StoreView,
    object: &StorageReference,
    reference: TransactionReference,
    response: &TransactionResponse,
) -> Result<Vec<TransactionReference>, StoreError> {
    let mut covered = slots_of(response, object);
    let mut history = vec![reference];
    if covered.contains(&UpdateSlot::ClassTag) {
        return Ok(history);
    }

    for older in store.history(object)? {
        let older_response = store.response(&older)?.ok_or(StoreError::MissingResponse(older))?;
        let slots = slots_of(&older_response, object);
        let creates = slots.contains(&UpdateSlot::ClassTag);
        if creates || !slots.is_subset(&covered) {
            history.push(older);
            covered.extend(slots);
        }
        if creates {
            break;
        }
    }
    Ok(history)
}

/// Manifest installed by a response, if it is an initialization
pub fn installed_manifest(response: &TransactionResponse) -> Option<StorageReference> {
    match response {
        TransactionResponse::Initial(InitialResponse::Initialized { manifest }) => Some(*manifest),
        _ => None,
    }
}

/// Store backed by RocksDB
pub struct StateBackend {
    db: Database,
}

impl StateBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn request_key(reference: &TransactionReference) -> Vec<u8> {
        [PREFIX_REQUEST, reference.as_bytes()].concat()
    }

    fn response_key(reference: &TransactionReference) -> Vec<u8> {
        [PREFIX_RESPONSE, reference.as_bytes()].concat()
    }

    fn history_key(object: &StorageReference) -> Vec<u8> {
        [PREFIX_HISTORY, &object.to_key_bytes()[..]].concat()
    }

    fn log_key(position: u64) -> Vec<u8> {
        [PREFIX_LOG, &position.to_be_bytes()[..]].concat()
    }

    fn read<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.db.get(key)? {
            Some(data) => bincode::deserialize(&data)
                .map(Some)
                .map_err(|e| StoreError::DeserializationFailed(e.to_string())),
            None => Ok(None),
        }
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(value).map_err(|e| StoreError::SerializationFailed(e.to_string()))
    }

    fn log_length(&self) -> Result<u64, StoreError> {
        Ok(self.read(KEY_LOG_LENGTH)?.unwrap_or(0))
    }
}

impl StoreView for StateBackend {
    fn request(&self, reference: &TransactionReference) -> Result<Option<TransactionRequest>, StoreError> {
        self.read(&Self::request_key(reference))
    }

    fn response(&self, reference: &TransactionReference) -> Result<Option<TransactionResponse>, StoreError> {
        self.read(&Self::response_key(reference))
    }

    fn history(&self, object: &StorageReference) -> Result<Vec<TransactionReference>, StoreError> {
        Ok(self.read(&Self::history_key(object))?.unwrap_or_default())
    }

    fn manifest(&self) -> Result<Option<StorageReference>, StoreError> {
        self.read(KEY_MANIFEST)
    }

    fn contains(&self, reference: &TransactionReference) -> Result<bool, StoreError> {
        Ok(self.db.exists(&Self::response_key(reference))?)
    }
}

impl Store for StateBackend {
    fn commit(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<(), StoreError> {
        if self.contains(&reference)? {
            return Err(StoreError::AlreadyCommitted(reference));
        }

        let position = self.log_length()?;
        let mut ops = vec![
            WriteOp::Put { key: Self::request_key(&reference), value: Self::encode(request)? },
            WriteOp::Put { key: Self::response_key(&reference), value: Self::encode(response)? },
            WriteOp::Put { key: Self::log_key(position), value: Self::encode(&reference)? },
            WriteOp::Put { key: KEY_LOG_LENGTH.to_vec(), value: Self::encode(&(position + 1))? },
        ];

        for object in touched_objects(response) {
            let history = compacted_history(&*self, &object, reference, response)?;
            ops.push(WriteOp::Put { key: Self::history_key(&object), value: Self::encode(&history)? });
        }

        if let Some(manifest) = installed_manifest(response) {
            ops.push(WriteOp::Put { key: KEY_MANIFEST.to_vec(), value: Self::encode(&manifest)? });
        }

        self.db.batch_write(ops)?;
        tracing::trace!("📦 Transaction {} commise en position {}", reference, position);
        Ok(())
    }

    fn transactions(&self) -> Result<Vec<TransactionReference>, StoreError> {
        let length = self.log_length()?;
        let mut references = Vec::with_capacity(length as usize);
        for position in 0..length {
            let reference = self
                .read(&Self::log_key(position))?
                .ok_or_else(|| StoreError::DeserializationFailed(format!("log entry {} missing", position)))?;
            references.push(reference);
        }
        Ok(references)
    }
}

/// Erreurs du store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Erreur de base de données: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Échec de sérialisation: {0}")]
    SerializationFailed(String),

    #[error("Échec de désérialisation: {0}")]
    DeserializationFailed(String),

    #[error("transaction {0} already committed")]
    AlreadyCommitted(TransactionReference),

    /// An index points to a transaction whose response is not stored
    #[error("response of transaction {0} missing from the store")]
    MissingResponse(TransactionReference),
}
