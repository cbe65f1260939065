// Storage values - Valeurs persistées dans les champs des objets
use super::reference::StorageReference;
use super::signatures::StorageType;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// `f32` with a total order (`total_cmp`) and bitwise equality
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Float32(pub f32);

/// `f64` with a total order (`total_cmp`) and bitwise equality
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Float64(pub f64);

macro_rules! total_float {
    ($name:ident) => {
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.to_bits() == other.0.to_bits()
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.to_bits().hash(state)
            }
        }
    };
}

total_float!(Float32);
total_float!(Float64);

/// A value that can be kept in storage. Never an arbitrary object: objects
/// are only ever stored through their `StorageReference`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(Float32),
    Double(Float64),
    String(String),
    BigInteger(BigInt),
    Enum { class_name: String, name: String },
    Reference(StorageReference),
}

impl StorageValue {
    /// Default value of a field of the given type that was never assigned
    pub fn default_for(storage_type: &StorageType) -> Self {
        match storage_type {
            StorageType::Boolean => StorageValue::Boolean(false),
            StorageType::Byte => StorageValue::Byte(0),
            StorageType::Char => StorageValue::Char('\0'),
            StorageType::Short => StorageValue::Short(0),
            StorageType::Int => StorageValue::Int(0),
            StorageType::Long => StorageValue::Long(0),
            StorageType::Float => StorageValue::Float(Float32(0.0)),
            StorageType::Double => StorageValue::Double(Float64(0.0)),
            StorageType::Class(_) => StorageValue::Null,
        }
    }

    pub fn big_integer(value: impl Into<BigInt>) -> Self {
        StorageValue::BigInteger(value.into())
    }

    /// Size in storage slots (8-byte words), used by the storage gas charge
    pub fn size_in_slots(&self) -> u64 {
        match self {
            StorageValue::Null
            | StorageValue::Boolean(_)
            | StorageValue::Byte(_)
            | StorageValue::Char(_)
            | StorageValue::Short(_)
            | StorageValue::Int(_)
            | StorageValue::Long(_)
            | StorageValue::Float(_)
            | StorageValue::Double(_) => 1,
            StorageValue::String(s) => string_slots(s),
            StorageValue::BigInteger(i) => 1 + i.bits() / 64,
            StorageValue::Enum { class_name, name } => string_slots(class_name) + string_slots(name),
            StorageValue::Reference(_) => 2,
        }
    }
}

/// Slots of a length-prefixed string
pub fn string_slots(s: &str) -> u64 {
    1 + (s.len() as u64).div_ceil(8)
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageValue::Null => write!(f, "null"),
            StorageValue::Boolean(b) => write!(f, "{}", b),
            StorageValue::Byte(b) => write!(f, "{}", b),
            StorageValue::Char(c) => write!(f, "'{}'", c),
            StorageValue::Short(s) => write!(f, "{}", s),
            StorageValue::Int(i) => write!(f, "{}", i),
            StorageValue::Long(l) => write!(f, "{}", l),
            StorageValue::Float(v) => write!(f, "{}", v.0),
            StorageValue::Double(v) => write!(f, "{}", v.0),
            StorageValue::String(s) => write!(f, "\"{}\"", s),
            StorageValue::BigInteger(i) => write!(f, "{}", i),
            StorageValue::Enum { class_name, name } => write!(f, "{}.{}", class_name, name),
            StorageValue::Reference(r) => write!(f, "{}", r),
        }
    }
}
