// Codec - Conversion entre valeurs d'exécution et valeurs de storage
//
// Every value crossing the boundary between the sandbox and the store goes
// through here and is checked against the type it is declared with.

use super::classpath::Classpath;
use super::heap::Heap;
use crate::types::{
    Float32, Float64, StorageReference, StorageType, StorageValue, BIG_INTEGER_CLASS,
    STRING_CLASS,
};
use num_bigint::BigInt;

/// Value as seen by executing code. Objects are designated by the reference
/// they have (or will have) in storage; their state lives in the `Heap`.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    BigInteger(BigInt),
    Enum { class_name: String, name: String },
    Object(StorageReference),
}

impl RuntimeValue {
    pub fn as_object(&self) -> Option<StorageReference> {
        match self {
            RuntimeValue::Object(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_big_integer(&self) -> Option<&BigInt> {
        match self {
            RuntimeValue::BigInteger(i) => Some(i),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RuntimeValue::Null => "null",
            RuntimeValue::Boolean(_) => "boolean",
            RuntimeValue::Byte(_) => "byte",
            RuntimeValue::Char(_) => "char",
            RuntimeValue::Short(_) => "short",
            RuntimeValue::Int(_) => "int",
            RuntimeValue::Long(_) => "long",
            RuntimeValue::Float(_) => "float",
            RuntimeValue::Double(_) => "double",
            RuntimeValue::String(_) => STRING_CLASS,
            RuntimeValue::BigInteger(_) => BIG_INTEGER_CLASS,
            RuntimeValue::Enum { .. } => "enum",
            RuntimeValue::Object(_) => "object",
        }
    }
}

/// Checks that a storage value can be held by something of type `expected`.
/// References are not followed: the class of the referenced object is
/// checked when the object gets loaded.
pub fn check_type(
    value: &StorageValue,
    expected: &StorageType,
    classpath: &Classpath,
) -> Result<(), CodecError> {
    let ok = match (value, expected) {
        (StorageValue::Boolean(_), StorageType::Boolean)
        | (StorageValue::Byte(_), StorageType::Byte)
        | (StorageValue::Char(_), StorageType::Char)
        | (StorageValue::Short(_), StorageType::Short)
        | (StorageValue::Int(_), StorageType::Int)
        | (StorageValue::Long(_), StorageType::Long)
        | (StorageValue::Float(_), StorageType::Float)
        | (StorageValue::Double(_), StorageType::Double) => true,
        (StorageValue::Null, StorageType::Class(_)) => true,
        (StorageValue::String(_), StorageType::Class(name)) => name == STRING_CLASS,
        (StorageValue::BigInteger(_), StorageType::Class(name)) => name == BIG_INTEGER_CLASS,
        (StorageValue::Enum { class_name, name }, StorageType::Class(expected_class)) => {
            if class_name != expected_class {
                false
            } else {
                match classpath.class(class_name) {
                    Some(class) if class.info.is_enum() => {
                        if !class.info.enum_cases.contains(name) {
                            return Err(CodecError::UnknownEnumCase {
                                class_name: class_name.clone(),
                                name: name.clone(),
                            });
                        }
                        true
                    }
                    _ => false,
                }
            }
        }
        (StorageValue::Reference(_), StorageType::Class(name)) => {
            !StorageType::is_builtin_class(name) && !classpath.is_enum(name)
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(CodecError::TypeMismatch {
            expected: expected.to_string(),
            found: value.to_string(),
        })
    }
}

/// Storage value → runtime value, checked against the declared type
pub fn to_runtime(
    value: &StorageValue,
    expected: &StorageType,
    classpath: &Classpath,
) -> Result<RuntimeValue, CodecError> {
    check_type(value, expected, classpath)?;

    Ok(match value {
        StorageValue::Null => RuntimeValue::Null,
        StorageValue::Boolean(b) => RuntimeValue::Boolean(*b),
        StorageValue::Byte(b) => RuntimeValue::Byte(*b),
        StorageValue::Char(c) => RuntimeValue::Char(*c),
        StorageValue::Short(s) => RuntimeValue::Short(*s),
        StorageValue::Int(i) => RuntimeValue::Int(*i),
        StorageValue::Long(l) => RuntimeValue::Long(*l),
        StorageValue::Float(f) => RuntimeValue::Float(f.0),
        StorageValue::Double(d) => RuntimeValue::Double(d.0),
        StorageValue::String(s) => RuntimeValue::String(s.clone()),
        StorageValue::BigInteger(i) => RuntimeValue::BigInteger(i.clone()),
        StorageValue::Enum { class_name, name } => RuntimeValue::Enum {
            class_name: class_name.clone(),
            name: name.clone(),
        },
        StorageValue::Reference(r) => RuntimeValue::Object(*r),
    })
}

/// Runtime value → storage value, checked against the declared type.
/// Objects must be instances of a storage class compatible with `expected`;
/// objects not in the heap were never loaded, so they are already in storage.
pub fn to_storage(
    value: &RuntimeValue,
    expected: &StorageType,
    heap: &Heap,
    classpath: &Classpath,
) -> Result<StorageValue, CodecError> {
    let stored = match value {
        RuntimeValue::Null => StorageValue::Null,
        RuntimeValue::Boolean(b) => StorageValue::Boolean(*b),
        RuntimeValue::Byte(b) => StorageValue::Byte(*b),
        RuntimeValue::Char(c) => StorageValue::Char(*c),
        RuntimeValue::Short(s) => StorageValue::Short(*s),
        RuntimeValue::Int(i) => StorageValue::Int(*i),
        RuntimeValue::Long(l) => StorageValue::Long(*l),
        RuntimeValue::Float(f) => StorageValue::Float(Float32(*f)),
        RuntimeValue::Double(d) => StorageValue::Double(Float64(*d)),
        RuntimeValue::String(s) => StorageValue::String(s.clone()),
        RuntimeValue::BigInteger(i) => StorageValue::BigInteger(i.clone()),
        RuntimeValue::Enum { class_name, name } => StorageValue::Enum {
            class_name: class_name.clone(),
            name: name.clone(),
        },
        RuntimeValue::Object(reference) => {
            if let Some(object) = heap.get(reference) {
                if !classpath.is_storage(&object.class_name) {
                    return Err(CodecError::NotStorable(object.class_name.clone()));
                }
                if let StorageType::Class(expected_class) = expected {
                    if !classpath.is_subclass_of(&object.class_name, expected_class) {
                        return Err(CodecError::TypeMismatch {
                            expected: expected_class.clone(),
                            found: object.class_name.clone(),
                        });
                    }
                }
            }
            StorageValue::Reference(*reference)
        }
    };

    check_type(&stored, expected, classpath).map_err(|e| match e {
        CodecError::TypeMismatch { expected, .. } => CodecError::TypeMismatch {
            expected,
            found: value.kind().to_string(),
        },
        other => other,
    })?;

    Ok(stored)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("unknown case {name} of enum {class_name}")]
    UnknownEnumCase { class_name: String, name: String },

    #[error("instances of {0} cannot be kept in storage")]
    NotStorable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::heap::Heap;
    use crate::types::{
        ClassInfo, CodeUnit, Hash, TransactionReference, ACCOUNT_CLASS, CONTRACT_CLASS,
        STORAGE_CLASS,
    };

    fn classpath() -> Classpath {
        let mut classpath = Classpath::empty();
        classpath
            .add(
                TransactionReference::new(Hash::hash(b"base")),
                CodeUnit::new(vec![
                    ClassInfo::new(STORAGE_CLASS, None),
                    ClassInfo::new(CONTRACT_CLASS, Some(STORAGE_CLASS)),
                    ClassInfo::new(ACCOUNT_CLASS, Some(CONTRACT_CLASS)),
                    ClassInfo::new("app.Color", None).with_enum_cases(&["RED", "GREEN"]),
                    ClassInfo::new("app.Scratch", None),
                ]),
            )
            .unwrap();
        classpath
    }

    #[test]
    fn test_primitive_types_must_match_exactly() {
        let classpath = classpath();
        assert!(check_type(&StorageValue::Int(1), &StorageType::Int, &classpath).is_ok());
        assert!(matches!(
            check_type(&StorageValue::Int(1), &StorageType::Long, &classpath),
            Err(CodecError::TypeMismatch { .. })
        ));
        assert!(check_type(&StorageValue::Null, &StorageType::Int, &classpath).is_err());
        assert!(check_type(&StorageValue::Null, &StorageType::string(), &classpath).is_ok());
    }

    #[test]
    fn test_enum_cases_checked() {
        let classpath = classpath();
        let color = StorageType::class("app.Color");
        let red = StorageValue::Enum { class_name: "app.Color".into(), name: "RED".into() };
        let blue = StorageValue::Enum { class_name: "app.Color".into(), name: "BLUE".into() };
        assert!(to_runtime(&red, &color, &classpath).is_ok());
        assert!(matches!(
            to_runtime(&blue, &color, &classpath),
            Err(CodecError::UnknownEnumCase { .. })
        ));
    }

    #[test]
    fn test_objects_must_be_storable_and_compatible() {
        let classpath = classpath();
        let tx = TransactionReference::new(Hash::hash(b"tx"));
        let mut heap = Heap::new(tx);
        let account = heap.allocate(ACCOUNT_CLASS, tx, Default::default(), Some(0));
        let scratch = heap.allocate("app.Scratch", tx, Default::default(), None);

        let as_contract = to_storage(
            &RuntimeValue::Object(account),
            &StorageType::class(CONTRACT_CLASS),
            &heap,
            &classpath,
        );
        assert_eq!(as_contract, Ok(StorageValue::Reference(account)));

        assert!(matches!(
            to_storage(&RuntimeValue::Object(scratch), &StorageType::class(STORAGE_CLASS), &heap, &classpath),
            Err(CodecError::NotStorable(_))
        ));
        assert!(matches!(
            to_storage(&RuntimeValue::Object(account), &StorageType::string(), &heap, &classpath),
            Err(CodecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_runtime_kind_reported_on_mismatch() {
        let classpath = classpath();
        let heap = Heap::new(TransactionReference::new(Hash::ZERO));
        let err = to_storage(&RuntimeValue::Long(3), &StorageType::Int, &heap, &classpath).unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch { expected: "int".into(), found: "long".into() }
        );
    }
}
