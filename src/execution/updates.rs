// Updates - Calcul de l'ensemble canonique des updates d'une transaction
use super::classpath::Classpath;
use super::codec::{to_storage, CodecError, RuntimeValue};
use super::heap::{Heap, Origin, RuntimeObject};
use crate::types::{StorageReference, StorageValue, Update, UpdateSet};
use std::collections::{BTreeSet, VecDeque};

/// Diffs the heap of a transaction against the snapshots of the loaded
/// objects. New objects are kept only if reachable from the roots: every
/// loaded object plus the extra roots of the call.
pub struct UpdateSetComputer<'a> {
    heap: &'a Heap,
    classpath: &'a Classpath,
}

impl<'a> UpdateSetComputer<'a> {
    pub fn new(heap: &'a Heap, classpath: &'a Classpath) -> Self {
        Self { heap, classpath }
    }

    pub fn compute(&self, extra_roots: &[StorageReference]) -> Result<UpdateSet, UpdateError> {
        let mut updates = UpdateSet::new();

        for reference in self.reachable(extra_roots) {
            let Some(object) = self.heap.get(&reference) else {
                continue;
            };
            match &object.origin {
                Origin::Created => self.created(&reference, object, &mut updates)?,
                Origin::Loaded(snapshot) => {
                    for (field, value) in &object.fields {
                        let current = self.storage_value(value, field)?;
                        if snapshot.fields.get(field) != Some(&current) {
                            Self::insert(&mut updates, Update::Field {
                                object: reference,
                                field: field.clone(),
                                value: current,
                            })?;
                        }
                    }
                    if let Some(balance) = object.balance {
                        if snapshot.balance != Some(balance) {
                            Self::insert(&mut updates, Update::Balance { object: reference, balance })?;
                        }
                    }
                }
            }
        }

        Ok(updates)
    }

    /// A new object is published in full: class tag, every field, balance
    fn created(
        &self,
        reference: &StorageReference,
        object: &RuntimeObject,
        updates: &mut UpdateSet,
    ) -> Result<(), UpdateError> {
        Self::insert(updates, Update::ClassTag {
            object: *reference,
            class_name: object.class_name.clone(),
            jar: object.jar,
        })?;
        for (field, value) in &object.fields {
            let value = self.storage_value(value, field)?;
            Self::insert(updates, Update::Field { object: *reference, field: field.clone(), value })?;
        }
        if let Some(balance) = object.balance {
            Self::insert(updates, Update::Balance { object: *reference, balance })?;
        }
        Ok(())
    }

    fn storage_value(
        &self,
        value: &RuntimeValue,
        field: &crate::types::FieldSignature,
    ) -> Result<StorageValue, UpdateError> {
        to_storage(value, &field.field_type, self.heap, self.classpath).map_err(|error| UpdateError::IllegalValue {
            field: field.to_string(),
            error,
        })
    }

    fn insert(updates: &mut UpdateSet, update: Update) -> Result<(), UpdateError> {
        updates
            .insert(update)
            .map_err(|e| UpdateError::Duplicate(e.to_string()))
    }

    /// Heap objects reachable from the roots through reference fields
    fn reachable(&self, extra_roots: &[StorageReference]) -> BTreeSet<StorageReference> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<StorageReference> = self
            .heap
            .loaded()
            .into_iter()
            .chain(extra_roots.iter().copied())
            .chain(self.heap.events().iter().copied())
            .collect();

        while let Some(reference) = queue.pop_front() {
            let Some(object) = self.heap.get(&reference) else {
                continue;
            };
            if !seen.insert(reference) {
                continue;
            }
            queue.extend(object.fields.values().filter_map(RuntimeValue::as_object));
        }

        seen
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpdateError {
    #[error("illegal value in {field}: {error}")]
    IllegalValue { field: String, error: CodecError },

    #[error("{0}")]
    Duplicate(String),
}
