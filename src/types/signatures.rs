// Signatures - Types de storage, champs, constructeurs et méthodes
use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of all classes whose instances can be kept in storage
pub const STORAGE_CLASS: &str = "lang.Storage";
/// Storage objects holding a balance
pub const CONTRACT_CLASS: &str = "lang.Contract";
/// Contracts that can pay for transactions (nonce + public key)
pub const ACCOUNT_CLASS: &str = "lang.Account";
/// The first privileged account
pub const GAMETE_CLASS: &str = "lang.Gamete";
/// Built-in string type
pub const STRING_CLASS: &str = "lang.String";
/// Built-in arbitrary-precision integer type
pub const BIG_INTEGER_CLASS: &str = "lang.BigInteger";

/// Type of a field, formal argument or return value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Class type, by fully qualified name
    Class(String),
}

impl StorageType {
    pub fn class(name: &str) -> Self {
        StorageType::Class(name.to_string())
    }

    pub fn string() -> Self {
        Self::class(STRING_CLASS)
    }

    pub fn big_integer() -> Self {
        Self::class(BIG_INTEGER_CLASS)
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            StorageType::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Built-in class types that are not described by any jar
    pub fn is_builtin_class(name: &str) -> bool {
        name == STRING_CLASS || name == BIG_INTEGER_CLASS
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageType::Boolean => write!(f, "boolean"),
            StorageType::Byte => write!(f, "byte"),
            StorageType::Char => write!(f, "char"),
            StorageType::Short => write!(f, "short"),
            StorageType::Int => write!(f, "int"),
            StorageType::Long => write!(f, "long"),
            StorageType::Float => write!(f, "float"),
            StorageType::Double => write!(f, "double"),
            StorageType::Class(name) => write!(f, "{}", name),
        }
    }
}

/// Field, identified by its defining class, its name and its type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldSignature {
    pub defining_class: String,
    pub name: String,
    pub field_type: StorageType,
}

impl FieldSignature {
    pub fn new(defining_class: &str, name: &str, field_type: StorageType) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            name: name.to_string(),
            field_type,
        }
    }

    /// `lang.Account.nonce: long`
    pub fn account_nonce() -> Self {
        Self::new(ACCOUNT_CLASS, "nonce", StorageType::Long)
    }

    /// `lang.Account.publicKey: lang.String`
    pub fn account_public_key() -> Self {
        Self::new(ACCOUNT_CLASS, "publicKey", StorageType::string())
    }
}

impl fmt::Display for FieldSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}:{}", self.defining_class, self.name, self.field_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstructorSignature {
    pub defining_class: String,
    pub formals: Vec<StorageType>,
}

impl ConstructorSignature {
    pub fn new(defining_class: &str, formals: Vec<StorageType>) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            formals,
        }
    }
}

impl fmt::Display for ConstructorSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.defining_class, join(&self.formals))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub defining_class: String,
    pub name: String,
    pub formals: Vec<StorageType>,
    /// `None` for void methods
    pub returns: Option<StorageType>,
}

impl MethodSignature {
    pub fn new(
        defining_class: &str,
        name: &str,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
    ) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            name: name.to_string(),
            formals,
            returns,
        }
    }

    /// `lang.Contract.getBalance(): lang.BigInteger`
    pub fn get_balance() -> Self {
        Self::new(CONTRACT_CLASS, "getBalance", vec![], Some(StorageType::big_integer()))
    }

    /// `lang.Account.nonce(): long`
    pub fn nonce() -> Self {
        Self::new(ACCOUNT_CLASS, "nonce", vec![], Some(StorageType::Long))
    }

    /// `lang.Account.pay(lang.Contract, lang.BigInteger): void`
    pub fn pay() -> Self {
        Self::new(
            ACCOUNT_CLASS,
            "pay",
            vec![StorageType::class(CONTRACT_CLASS), StorageType::big_integer()],
            None,
        )
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let returns = self
            .returns
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "void".to_string());
        write!(
            f,
            "{} {}.{}({})",
            returns,
            self.defining_class,
            self.name,
            join(&self.formals)
        )
    }
}

fn join(types: &[StorageType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
