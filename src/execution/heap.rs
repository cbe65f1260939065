// Heap - Objets manipulés par une transaction en cours
use super::codec::RuntimeValue;
use crate::types::{Balance, FieldSignature, StorageReference, StorageValue, TransactionReference};
use std::collections::BTreeMap;

/// State of an object as it was in storage before the transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub fields: BTreeMap<FieldSignature, StorageValue>,
    pub balance: Option<Balance>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    Loaded(Snapshot),
    Created,
}

/// An object of the heap. `balance` is `Some` for contracts only.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeObject {
    pub class_name: String,
    pub jar: TransactionReference,
    pub fields: BTreeMap<FieldSignature, RuntimeValue>,
    pub balance: Option<Balance>,
    pub origin: Origin,
}

impl RuntimeObject {
    pub fn is_created(&self) -> bool {
        matches!(self.origin, Origin::Created)
    }
}

/// Objects loaded or created by one transaction, keyed by reference.
/// New references are allocated with increasing progressives, so two runs of
/// the same transaction allocate the same references.
#[derive(Debug, Clone)]
pub struct Heap {
    transaction: TransactionReference,
    next_progressive: u64,
    objects: BTreeMap<StorageReference, RuntimeObject>,
    events: Vec<StorageReference>,
}

impl Heap {
    pub fn new(transaction: TransactionReference) -> Self {
        Self {
            transaction,
            next_progressive: 0,
            objects: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn transaction(&self) -> TransactionReference {
        self.transaction
    }

    /// Allocates a new object created by this transaction
    pub fn allocate(
        &mut self,
        class_name: &str,
        jar: TransactionReference,
        fields: BTreeMap<FieldSignature, RuntimeValue>,
        balance: Option<Balance>,
    ) -> StorageReference {
        let reference = StorageReference::new(self.transaction, self.next_progressive);
        self.next_progressive += 1;
        self.objects.insert(
            reference,
            RuntimeObject {
                class_name: class_name.to_string(),
                jar,
                fields,
                balance,
                origin: Origin::Created,
            },
        );
        reference
    }

    /// Adds an object deserialized from storage
    pub fn insert_loaded(&mut self, reference: StorageReference, object: RuntimeObject) {
        self.objects.insert(reference, object);
    }

    pub fn get(&self, reference: &StorageReference) -> Option<&RuntimeObject> {
        self.objects.get(reference)
    }

    pub fn get_mut(&mut self, reference: &StorageReference) -> Option<&mut RuntimeObject> {
        self.objects.get_mut(reference)
    }

    pub fn contains(&self, reference: &StorageReference) -> bool {
        self.objects.contains_key(reference)
    }

    pub fn objects(&self) -> impl Iterator<Item = (&StorageReference, &RuntimeObject)> {
        self.objects.iter()
    }

    /// References of the objects that were loaded from storage
    pub fn loaded(&self) -> Vec<StorageReference> {
        self.objects
            .iter()
            .filter(|(_, o)| !o.is_created())
            .map(|(r, _)| *r)
            .collect()
    }

    pub fn add_event(&mut self, event: StorageReference) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[StorageReference] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash;

    #[test]
    fn test_allocation_is_sequential() {
        let tx = TransactionReference::new(Hash::hash(b"tx"));
        let mut heap = Heap::new(tx);
        let first = heap.allocate("app.A", tx, BTreeMap::new(), None);
        let second = heap.allocate("app.B", tx, BTreeMap::new(), Some(0));

        assert_eq!(first, StorageReference::new(tx, 0));
        assert_eq!(second, StorageReference::new(tx, 1));
        assert!(heap.get(&second).unwrap().is_created());
        assert!(heap.loaded().is_empty());
    }

    #[test]
    fn test_loaded_objects_listed() {
        let tx = TransactionReference::new(Hash::hash(b"tx"));
        let old = StorageReference::new(TransactionReference::new(Hash::hash(b"old")), 3);
        let mut heap = Heap::new(tx);
        heap.insert_loaded(
            old,
            RuntimeObject {
                class_name: "app.A".into(),
                jar: tx,
                fields: BTreeMap::new(),
                balance: None,
                origin: Origin::Loaded(Snapshot { fields: BTreeMap::new(), balance: None }),
            },
        );
        heap.allocate("app.A", tx, BTreeMap::new(), None);

        assert_eq!(heap.loaded(), vec![old]);
    }
}
