// Deserializer - Reconstruction d'un objet depuis son historique d'updates
use super::classpath::Classpath;
use super::codec::{to_runtime, CodecError};
use super::heap::{Origin, RuntimeObject, Snapshot};
use crate::storage::{StoreError, StoreView};
use crate::types::{
    AccountState, Balance, FieldSignature, StorageReference, StorageValue, TransactionReference,
    Update,
};
use std::collections::BTreeMap;

/// Last persisted state of an object, before any typing against a classpath
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedObject {
    pub class_name: String,
    pub jar: TransactionReference,
    /// Most recent value of every field that was ever updated
    pub fields: BTreeMap<FieldSignature, StorageValue>,
    pub balance: Option<Balance>,
}

impl PersistedObject {
    /// Nonce and balance, if the object carries the fields of an account
    pub fn account_state(&self, reference: StorageReference) -> Option<AccountState> {
        match self.fields.get(&FieldSignature::account_nonce()) {
            Some(StorageValue::Long(nonce)) if *nonce >= 0 => Some(AccountState {
                reference,
                nonce: *nonce as u64,
                balance: self.balance.unwrap_or(0),
            }),
            _ => None,
        }
    }
}

/// Replays the history of an object, most recent transaction first.
/// The first update met for a slot wins; the class tag ends the scan.
pub fn persisted_state(
    store: &dyn StoreView,
    object: &StorageReference,
) -> Result<PersistedObject, DeserializationError> {
    let mut fields = BTreeMap::new();
    let mut balance = None;

    for transaction in store.history(object)? {
        let response = store
            .response(&transaction)?
            .ok_or(StoreError::MissingResponse(transaction))?;
        let Some(updates) = response.updates() else {
            continue;
        };

        let mut tag = None;
        for update in updates.for_object(object) {
            match update {
                Update::ClassTag { class_name, jar, .. } => tag = Some((class_name.clone(), *jar)),
                Update::Field { field, value, .. } => {
                    fields.entry(field.clone()).or_insert_with(|| value.clone());
                }
                Update::Balance { balance: b, .. } => {
                    balance.get_or_insert(*b);
                }
            }
        }

        if let Some((class_name, jar)) = tag {
            return Ok(PersistedObject { class_name, jar, fields, balance });
        }
    }

    Err(DeserializationError::Dangling(*object))
}

/// Builds heap objects from storage, typed against a classpath
pub struct ObjectDeserializer<'a> {
    store: &'a dyn StoreView,
    classpath: &'a Classpath,
}

impl<'a> ObjectDeserializer<'a> {
    pub fn new(store: &'a dyn StoreView, classpath: &'a Classpath) -> Self {
        Self { store, classpath }
    }

    /// Fields never updated since creation take the default of their type
    pub fn deserialize(&self, reference: &StorageReference) -> Result<RuntimeObject, DeserializationError> {
        let persisted = persisted_state(self.store, reference)?;

        if !self.classpath.contains(&persisted.class_name) {
            return Err(DeserializationError::UnknownClass(persisted.class_name));
        }
        let layout = self
            .classpath
            .fields_of(&persisted.class_name)
            .map_err(|_| DeserializationError::UnknownClass(persisted.class_name.clone()))?;

        let mut snapshot = BTreeMap::new();
        let mut fields = BTreeMap::new();
        for field in layout {
            let value = persisted
                .fields
                .get(&field)
                .cloned()
                .unwrap_or_else(|| StorageValue::default_for(&field.field_type));
            let runtime = to_runtime(&value, &field.field_type, self.classpath).map_err(|e| {
                DeserializationError::TypeMismatch { object: *reference, field: field.to_string(), error: e }
            })?;
            fields.insert(field.clone(), runtime);
            snapshot.insert(field, value);
        }

        let balance = if self.classpath.is_contract(&persisted.class_name) {
            Some(persisted.balance.unwrap_or(0))
        } else {
            None
        };

        Ok(RuntimeObject {
            class_name: persisted.class_name,
            jar: persisted.jar,
            fields,
            balance,
            origin: Origin::Loaded(Snapshot { fields: snapshot, balance }),
        })
    }
}

/// Erreurs de désérialisation
#[derive(Debug, thiserror::Error)]
pub enum DeserializationError {
    #[error("dangling reference {0}")]
    Dangling(StorageReference),

    #[error("class {0} is not in the classpath")]
    UnknownClass(String),

    #[error("field {field} of {object}: {error}")]
    TypeMismatch {
        object: StorageReference,
        field: String,
        error: CodecError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, Store};
    use crate::types::{
        ClassInfo, CodeUnit, GasConsumed, Hash, StorageType, SuccessOutcome, SuccessfulResponse,
        TransactionRequest, TransactionResponse, UpdateSet, JarStoreInitialRequest, STORAGE_CLASS,
        CONTRACT_CLASS,
    };

    fn reference(tag: &[u8]) -> TransactionReference {
        TransactionReference::new(Hash::hash(tag))
    }

    fn commit(store: &mut MemoryStore, tag: &[u8], updates: Vec<Update>) -> TransactionReference {
        let tx = reference(tag);
        let request = TransactionRequest::JarStoreInitial(JarStoreInitialRequest { jar: tag.to_vec(), dependencies: vec![] });
        let response = TransactionResponse::Successful(SuccessfulResponse {
            outcome: SuccessOutcome::Returned(None),
            updates: UpdateSet::try_from(updates).unwrap(),
            events: vec![],
            gas: GasConsumed::default(),
        });
        store.commit(tx, &request, &response).unwrap();
        tx
    }

    fn classpath(jar: TransactionReference) -> Classpath {
        let mut classpath = Classpath::empty();
        classpath
            .add(
                jar,
                CodeUnit::new(vec![
                    ClassInfo::new(STORAGE_CLASS, None),
                    ClassInfo::new(CONTRACT_CLASS, Some(STORAGE_CLASS)),
                    ClassInfo::new("app.Box", Some(CONTRACT_CLASS))
                        .with_field("count", StorageType::Int)
                        .with_field("label", StorageType::string()),
                ]),
            )
            .unwrap();
        classpath
    }

    #[test]
    fn test_most_recent_update_wins() {
        let mut store = MemoryStore::new();
        let jar = reference(b"jar");
        let object = StorageReference::new(reference(b"create"), 0);
        let count = FieldSignature::new("app.Box", "count", StorageType::Int);

        commit(&mut store, b"create", vec![
            Update::ClassTag { object, class_name: "app.Box".into(), jar },
            Update::Field { object, field: count.clone(), value: StorageValue::Int(1) },
            Update::Balance { object, balance: 10 },
        ]);
        commit(&mut store, b"second", vec![Update::Field { object, field: count.clone(), value: StorageValue::Int(2) }]);
        commit(&mut store, b"third", vec![Update::Balance { object, balance: 7 }]);

        let classpath = classpath(jar);
        let loaded = ObjectDeserializer::new(&store, &classpath).deserialize(&object).unwrap();
        assert_eq!(loaded.fields[&count], super::super::codec::RuntimeValue::Int(2));
        assert_eq!(loaded.balance, Some(7));

        // never assigned: default value
        let label = FieldSignature::new("app.Box", "label", StorageType::string());
        assert_eq!(loaded.fields[&label], super::super::codec::RuntimeValue::Null);
        assert!(!loaded.is_created());
    }

    #[test]
    fn test_dangling_reference() {
        let store = MemoryStore::new();
        let classpath = classpath(reference(b"jar"));
        let missing = StorageReference::new(reference(b"nowhere"), 0);
        assert!(matches!(
            ObjectDeserializer::new(&store, &classpath).deserialize(&missing),
            Err(DeserializationError::Dangling(_))
        ));
    }

    /// Index listing a transaction whose response was never stored
    struct BrokenIndex(TransactionReference);

    impl StoreView for BrokenIndex {
        fn request(&self, _: &TransactionReference) -> Result<Option<TransactionRequest>, StoreError> {
            Ok(None)
        }

        fn response(&self, _: &TransactionReference) -> Result<Option<TransactionResponse>, StoreError> {
            Ok(None)
        }

        fn history(&self, _: &StorageReference) -> Result<Vec<TransactionReference>, StoreError> {
            Ok(vec![self.0])
        }

        fn manifest(&self) -> Result<Option<StorageReference>, StoreError> {
            Ok(None)
        }
    }

    #[test]
    fn test_missing_response_is_a_store_error() {
        let tx = reference(b"lost");
        let store = BrokenIndex(tx);
        let object = StorageReference::new(tx, 0);

        match persisted_state(&store, &object) {
            Err(DeserializationError::Store(StoreError::MissingResponse(missing))) => assert_eq!(missing, tx),
            other => panic!("expected a store error, got {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch_detected() {
        let mut store = MemoryStore::new();
        let jar = reference(b"jar");
        let object = StorageReference::new(reference(b"create"), 0);
        commit(&mut store, b"create", vec![
            Update::ClassTag { object, class_name: "app.Box".into(), jar },
            Update::Field {
                object,
                field: FieldSignature::new("app.Box", "count", StorageType::Int),
                value: StorageValue::String("one".into()),
            },
        ]);

        let classpath = classpath(jar);
        assert!(matches!(
            ObjectDeserializer::new(&store, &classpath).deserialize(&object),
            Err(DeserializationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_class() {
        let mut store = MemoryStore::new();
        let jar = reference(b"jar");
        let object = StorageReference::new(reference(b"create"), 0);
        commit(&mut store, b"create", vec![Update::ClassTag { object, class_name: "app.Gone".into(), jar }]);

        let classpath = classpath(jar);
        assert!(matches!(
            ObjectDeserializer::new(&store, &classpath).deserialize(&object),
            Err(DeserializationError::UnknownClass(_))
        ));
    }
}
