// Verifier - Vérification des jars avant installation
use super::classpath::Classpath;
use crate::types::{ClassInfo, CodeUnit, StorageType};
use std::collections::BTreeSet;
use std::fmt;

/// Highest verification version this node knows how to apply
pub const SUPPORTED_VERIFICATION_VERSION: u32 = 1;

/// Turns a submitted jar into the artifact kept in storage, or refuses it.
/// Must be deterministic: every node verifies the same jar the same way.
pub trait Verifier: Send + Sync + fmt::Debug {
    /// `dependencies` holds the classes the jar may refer to
    fn verify(
        &self,
        jar: &[u8],
        dependencies: &Classpath,
        verification_version: u32,
    ) -> Result<Vec<u8>, VerificationError>;
}

/// Verifies jars made of a bincode `CodeUnit`. The instrumented artifact is
/// the same unit re-encoded with its classes sorted by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestVerifier;

impl ManifestVerifier {
    fn check_class(
        class: &ClassInfo,
        known: &dyn Fn(&str) -> bool,
    ) -> Result<(), VerificationError> {
        let resolves = |t: &StorageType| match t {
            StorageType::Class(name) => StorageType::is_builtin_class(name) || known(name),
            _ => true,
        };
        let unresolved = |what: String| VerificationError::Unresolved {
            class_name: class.name.clone(),
            what,
        };

        if let Some(superclass) = &class.superclass {
            if !known(superclass) {
                return Err(unresolved(format!("superclass {}", superclass)));
            }
        }

        let mut names = BTreeSet::new();
        for field in &class.fields {
            if !names.insert(&field.name) {
                return Err(VerificationError::DuplicateMember {
                    class_name: class.name.clone(),
                    member: field.name.clone(),
                });
            }
            if !resolves(&field.field_type) {
                return Err(unresolved(format!("type of field {}", field.name)));
            }
        }

        for constructor in &class.constructors {
            if let Some(t) = constructor.formals.iter().find(|t| !resolves(t)) {
                return Err(unresolved(format!("constructor formal {}", t)));
            }
            if let Some(e) = constructor.throws.iter().find(|e| !known(e)) {
                return Err(unresolved(format!("exception {}", e)));
            }
        }

        let mut signatures = BTreeSet::new();
        for method in &class.methods {
            if !signatures.insert((&method.name, &method.formals)) {
                return Err(VerificationError::DuplicateMember {
                    class_name: class.name.clone(),
                    member: method.name.clone(),
                });
            }
            if let Some(t) = method.formals.iter().chain(method.returns.iter()).find(|t| !resolves(t)) {
                return Err(unresolved(format!("type {} in method {}", t, method.name)));
            }
            if let Some(e) = method.throws.iter().find(|e| !known(e)) {
                return Err(unresolved(format!("exception {}", e)));
            }
            if method.is_static && method.self_charged {
                return Err(VerificationError::IllegalModifier {
                    class_name: class.name.clone(),
                    method: method.name.clone(),
                });
            }
        }

        Ok(())
    }
}

impl Verifier for ManifestVerifier {
    fn verify(
        &self,
        jar: &[u8],
        dependencies: &Classpath,
        verification_version: u32,
    ) -> Result<Vec<u8>, VerificationError> {
        if verification_version > SUPPORTED_VERIFICATION_VERSION {
            return Err(VerificationError::UnsupportedVersion(verification_version));
        }

        let mut unit = CodeUnit::decode(jar).map_err(|e| VerificationError::Malformed(e.to_string()))?;
        if unit.classes.is_empty() {
            return Err(VerificationError::Malformed("jar defines no classes".to_string()));
        }

        let mut own = BTreeSet::new();
        for class in &unit.classes {
            if dependencies.contains(&class.name) || !own.insert(class.name.clone()) {
                return Err(VerificationError::DuplicateClass(class.name.clone()));
            }
        }

        let known = |name: &str| own.contains(name) || dependencies.contains(name);
        for class in &unit.classes {
            Self::check_class(class, &known)?;
        }

        // no superclass cycle inside the jar
        for class in &unit.classes {
            let mut current = class.superclass.clone();
            let mut steps = 0;
            while let Some(name) = current {
                if name == class.name || steps > unit.classes.len() {
                    return Err(VerificationError::CyclicHierarchy(class.name.clone()));
                }
                steps += 1;
                current = unit
                    .classes
                    .iter()
                    .find(|c| c.name == name)
                    .and_then(|c| c.superclass.clone());
            }
        }

        unit.classes.sort_by(|a, b| a.name.cmp(&b.name));
        unit.encode().map_err(|e| VerificationError::Malformed(e.to_string()))
    }
}

/// Erreurs de vérification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("verification version {0} not supported")]
    UnsupportedVersion(u32),

    #[error("malformed jar: {0}")]
    Malformed(String),

    #[error("class {0} already defined")]
    DuplicateClass(String),

    #[error("{class_name} declares {member} twice")]
    DuplicateMember { class_name: String, member: String },

    #[error("{class_name}: cannot resolve {what}")]
    Unresolved { class_name: String, what: String },

    #[error("{class_name}.{method} cannot be both static and self-charged")]
    IllegalModifier { class_name: String, method: String },

    #[error("cyclic superclass chain through {0}")]
    CyclicHierarchy(String),
}
