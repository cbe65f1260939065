// Classpath - Résolution des jars installés et de leurs dépendances
use crate::storage::{StoreError, StoreView};
use crate::types::{
    ClassInfo, CodeUnit, ConstructorDecl, ConstructorSignature, FieldSignature, MethodDecl,
    MethodSignature, TransactionReference, CONTRACT_CLASS,
    STORAGE_CLASS,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Longest superclass chain followed before assuming a cycle
const MAX_HIERARCHY_DEPTH: usize = 64;

/// A class together with the jar that defines it
#[derive(Debug, Clone)]
pub struct LoadedClass {
    pub info: ClassInfo,
    pub jar: TransactionReference,
}

/// Classes visible to a transaction: a jar and, transitively, its dependencies
#[derive(Debug, Clone, Default)]
pub struct Classpath {
    jars: Vec<TransactionReference>,
    classes: BTreeMap<String, LoadedClass>,
}

impl Classpath {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves `roots` and all their dependencies, breadth first.
    pub fn resolve(
        store: &dyn StoreView,
        roots: &[TransactionReference],
    ) -> Result<Self, ClasspathError> {
        let mut classpath = Classpath::empty();
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<TransactionReference> = roots.iter().copied().collect();

        while let Some(reference) = queue.pop_front() {
            if !seen.insert(reference) {
                continue;
            }

            let response = store
                .response(&reference)?
                .ok_or(ClasspathError::NotInstalled(reference))?;
            let jar = response
                .installed_jar()
                .ok_or(ClasspathError::NotAJar(reference))?;
            let unit = CodeUnit::decode(&jar.instrumented_jar)
                .map_err(|e| ClasspathError::Corrupted(reference, e.to_string()))?;

            classpath.add(reference, unit)?;
            queue.extend(jar.dependencies.iter().copied());
        }

        Ok(classpath)
    }

    /// Adds the classes of a jar; a class already defined by another jar is an error
    pub fn add(&mut self, jar: TransactionReference, unit: CodeUnit) -> Result<(), ClasspathError> {
        for info in unit.classes {
            if self.classes.contains_key(&info.name) {
                return Err(ClasspathError::DuplicateClass(info.name));
            }
            self.classes
                .insert(info.name.clone(), LoadedClass { info, jar });
        }
        self.jars.push(jar);
        Ok(())
    }

    pub fn jars(&self) -> &[TransactionReference] {
        &self.jars
    }

    pub fn class(&self, name: &str) -> Option<&LoadedClass> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// The class itself, then its superclasses up to the root
    pub fn ancestors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LoadedClass> + 'a {
        let mut next = self.class(name);
        let mut depth = 0;
        std::iter::from_fn(move || {
            let current = next?;
            depth += 1;
            next = if depth < MAX_HIERARCHY_DEPTH {
                current.info.superclass.as_deref().and_then(|s| self.class(s))
            } else {
                None
            };
            Some(current)
        })
    }

    pub fn is_subclass_of(&self, name: &str, ancestor: &str) -> bool {
        self.ancestors(name).any(|c| c.info.name == ancestor)
    }

    pub fn is_storage(&self, name: &str) -> bool {
        self.is_subclass_of(name, STORAGE_CLASS)
    }

    pub fn is_contract(&self, name: &str) -> bool {
        self.is_subclass_of(name, CONTRACT_CLASS)
    }

    pub fn is_enum(&self, name: &str) -> bool {
        self.class(name).is_some_and(|c| c.info.is_enum())
    }

    /// Instance fields of a class, inherited ones first
    pub fn fields_of(&self, name: &str) -> Result<Vec<FieldSignature>, ClasspathError> {
        if !self.contains(name) {
            return Err(ClasspathError::UnknownClass(name.to_string()));
        }

        let mut chain: Vec<&LoadedClass> = self.ancestors(name).collect();
        chain.reverse();

        Ok(chain
            .iter()
            .flat_map(|c| {
                c.info.fields.iter().map(move |f| {
                    FieldSignature::new(&c.info.name, &f.name, f.field_type.clone())
                })
            })
            .collect())
    }

    pub fn constructor(&self, signature: &ConstructorSignature) -> Option<&ConstructorDecl> {
        self.class(&signature.defining_class)?
            .info
            .constructors
            .iter()
            .find(|c| c.formals == signature.formals)
    }

    /// Looks a method up in its defining class, then in the superclasses
    pub fn method<'a>(&'a self, signature: &'a MethodSignature) -> Option<&'a MethodDecl> {
        self.ancestors(&signature.defining_class)
            .flat_map(|c| c.info.methods.iter())
            .find(|m| {
                m.name == signature.name
                    && m.formals == signature.formals
                    && m.returns == signature.returns
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClasspathError {
    #[error("no transaction {0} installed")]
    NotInstalled(TransactionReference),

    #[error("transaction {0} did not install a jar")]
    NotAJar(TransactionReference),

    #[error("jar installed by {0} is corrupted: {1}")]
    Corrupted(TransactionReference, String),

    #[error("class {0} defined twice in the classpath")]
    DuplicateClass(String),

    #[error("unknown class {0}")]
    UnknownClass(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hash, StorageType, ACCOUNT_CLASS};

    fn jar(tag: &[u8]) -> TransactionReference {
        TransactionReference::new(Hash::hash(tag))
    }

    fn sample() -> Classpath {
        let mut classpath = Classpath::empty();
        classpath
            .add(
                jar(b"base"),
                CodeUnit::new(vec![
                    ClassInfo::new(STORAGE_CLASS, None),
                    ClassInfo::new(CONTRACT_CLASS, Some(STORAGE_CLASS)),
                    ClassInfo::new(ACCOUNT_CLASS, Some(CONTRACT_CLASS))
                        .with_field("nonce", StorageType::Long)
                        .with_method(MethodDecl::new("nonce", vec![], Some(StorageType::Long)).view()),
                ]),
            )
            .unwrap();
        classpath
            .add(
                jar(b"app"),
                CodeUnit::new(vec![ClassInfo::new("app.Wallet", Some(ACCOUNT_CLASS))
                    .with_field("owner", StorageType::string())]),
            )
            .unwrap();
        classpath
    }

    #[test]
    fn test_hierarchy_queries() {
        let classpath = sample();
        assert!(classpath.is_contract("app.Wallet"));
        assert!(classpath.is_storage(ACCOUNT_CLASS));
        assert!(classpath.is_subclass_of("app.Wallet", ACCOUNT_CLASS));
        assert!(!classpath.is_storage("app.Missing"));
        assert_eq!(classpath.class("app.Wallet").unwrap().jar, jar(b"app"));
    }

    #[test]
    fn test_fields_inherited_first() {
        let fields = sample().fields_of("app.Wallet").unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["nonce", "owner"]);
        assert_eq!(fields[0].defining_class, ACCOUNT_CLASS);
    }

    #[test]
    fn test_method_found_in_superclass() {
        let classpath = sample();
        let signature = MethodSignature::new("app.Wallet", "nonce", vec![], Some(StorageType::Long));
        assert!(classpath.method(&signature).unwrap().is_view);
        let wrong = MethodSignature::new("app.Wallet", "nonce", vec![], Some(StorageType::Int));
        assert!(classpath.method(&wrong).is_none());
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut classpath = sample();
        let result = classpath.add(jar(b"again"), CodeUnit::new(vec![ClassInfo::new("app.Wallet", None)]));
        assert!(matches!(result, Err(ClasspathError::DuplicateClass(_))));
    }
}
