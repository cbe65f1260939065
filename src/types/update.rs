// Updates - Description canonique des changements d'état d'une transaction
use super::primitives::Balance;
use super::reference::{StorageReference, TransactionReference};
use super::signatures::FieldSignature;
use super::values::{string_slots, StorageValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Slots taken by a balance update: object reference (2) + u128 (2).
/// Constant, so a payer's balance update can be costed before its value is known.
pub const BALANCE_UPDATE_SLOTS: u64 = 4;

/// One change to the state of a storage object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Update {
    /// Creation record: class of the object and the jar defining it
    ClassTag {
        object: StorageReference,
        class_name: String,
        jar: TransactionReference,
    },
    /// New value of a field
    Field {
        object: StorageReference,
        field: FieldSignature,
        value: StorageValue,
    },
    /// New balance of a contract
    Balance {
        object: StorageReference,
        balance: Balance,
    },
}

/// The slot of an object that an update overwrites.
/// Variant order is the canonical order: class tag, then fields, then balance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateSlot {
    ClassTag,
    Field(FieldSignature),
    Balance,
}

/// Uniqueness key of an update inside an `UpdateSet`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateKey {
    pub object: StorageReference,
    pub slot: UpdateSlot,
}

impl Update {
    pub fn object(&self) -> &StorageReference {
        match self {
            Update::ClassTag { object, .. }
            | Update::Field { object, .. }
            | Update::Balance { object, .. } => object,
        }
    }

    pub fn key(&self) -> UpdateKey {
        let slot = match self {
            Update::ClassTag { .. } => UpdateSlot::ClassTag,
            Update::Field { field, .. } => UpdateSlot::Field(field.clone()),
            Update::Balance { .. } => UpdateSlot::Balance,
        };
        UpdateKey {
            object: *self.object(),
            slot,
        }
    }

    pub fn size_in_slots(&self) -> u64 {
        match self {
            Update::ClassTag { class_name, .. } => 2 + string_slots(class_name) + 2,
            Update::Field { field, value, .. } => {
                2 + string_slots(&field.defining_class)
                    + string_slots(&field.name)
                    + value.size_in_slots()
            }
            Update::Balance { .. } => BALANCE_UPDATE_SLOTS,
        }
    }
}

impl PartialOrd for Update {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Object, then kind (class tag < field < balance), then field signature, then value
impl Ord for Update {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key()).then_with(|| match (self, other) {
            (
                Update::ClassTag { class_name: c1, jar: j1, .. },
                Update::ClassTag { class_name: c2, jar: j2, .. },
            ) => c1.cmp(c2).then_with(|| j1.cmp(j2)),
            (Update::Field { value: v1, .. }, Update::Field { value: v2, .. }) => v1.cmp(v2),
            (Update::Balance { balance: b1, .. }, Update::Balance { balance: b2, .. }) => {
                b1.cmp(b2)
            }
            _ => Ordering::Equal,
        })
    }
}

/// Canonically ordered set of updates, at most one per (object, slot).
/// Serializes as the ordered sequence of its updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Update>", into = "Vec<Update>")]
pub struct UpdateSet {
    updates: BTreeMap<UpdateKey, Update>,
}

impl UpdateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an update; fails if the slot it overwrites is already updated
    pub fn insert(&mut self, update: Update) -> Result<(), DuplicateUpdate> {
        let key = update.key();
        if self.updates.contains_key(&key) {
            return Err(DuplicateUpdate {
                object: key.object,
                slot: format!("{:?}", key.slot),
            });
        }
        self.updates.insert(key, update);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Updates in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Update> {
        self.updates.values()
    }

    /// Updates of a single object, in canonical order
    pub fn for_object<'a>(&'a self, object: &'a StorageReference) -> impl Iterator<Item = &'a Update> + 'a {
        self.updates
            .values()
            .skip_while(move |u| u.object() < object)
            .take_while(move |u| u.object() == object)
    }

    /// Objects touched by this set, each once, in canonical order
    pub fn objects(&self) -> Vec<StorageReference> {
        let mut objects: Vec<StorageReference> = self.updates.keys().map(|k| k.object).collect();
        objects.dedup();
        objects
    }

    pub fn balance_of(&self, object: &StorageReference) -> Option<Balance> {
        self.updates
            .get(&UpdateKey {
                object: *object,
                slot: UpdateSlot::Balance,
            })
            .and_then(|u| match u {
                Update::Balance { balance, .. } => Some(*balance),
                _ => None,
            })
    }

    pub fn field_of(&self, object: &StorageReference, field: &FieldSignature) -> Option<&StorageValue> {
        self.updates
            .get(&UpdateKey {
                object: *object,
                slot: UpdateSlot::Field(field.clone()),
            })
            .and_then(|u| match u {
                Update::Field { value, .. } => Some(value),
                _ => None,
            })
    }

    pub fn size_in_slots(&self) -> u64 {
        self.iter().map(Update::size_in_slots).sum()
    }

    /// Size ignoring the balance update of `object`, if any
    pub fn size_in_slots_without_balance_of(&self, object: &StorageReference) -> u64 {
        self.iter()
            .filter(|u| !(matches!(u, Update::Balance { .. }) && u.object() == object))
            .map(Update::size_in_slots)
            .sum()
    }
}

impl TryFrom<Vec<Update>> for UpdateSet {
    type Error = DuplicateUpdate;

    fn try_from(updates: Vec<Update>) -> Result<Self, Self::Error> {
        let mut set = UpdateSet::new();
        for update in updates {
            set.insert(update)?;
        }
        Ok(set)
    }
}

impl From<UpdateSet> for Vec<Update> {
    fn from(set: UpdateSet) -> Self {
        set.updates.into_values().collect()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("duplicate update of {slot} for object {object}")]
pub struct DuplicateUpdate {
    pub object: StorageReference,
    pub slot: String,
}
