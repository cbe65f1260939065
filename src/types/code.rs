// Code - Métadonnées des classes contenues dans un jar
use super::signatures::StorageType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub field_type: StorageType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorDecl {
    pub formals: Vec<StorageType>,
    /// Exception classes the constructor is declared to throw
    pub throws: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub formals: Vec<StorageType>,
    pub returns: Option<StorageType>,
    pub is_static: bool,
    /// Read-only method, callable through view transactions
    #[serde(default)]
    pub is_view: bool,
    /// The receiver pays for the gas of the call, if the node allows it
    #[serde(default)]
    pub self_charged: bool,
    pub throws: Vec<String>,
}

impl MethodDecl {
    pub fn new(name: &str, formals: Vec<StorageType>, returns: Option<StorageType>) -> Self {
        Self {
            name: name.to_string(),
            formals,
            returns,
            is_static: false,
            is_view: false,
            self_charged: false,
            throws: vec![],
        }
    }

    pub fn view(mut self) -> Self {
        self.is_view = true;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn self_charged(mut self) -> Self {
        self.self_charged = true;
        self
    }

    pub fn throws(mut self, exception: &str) -> Self {
        self.throws.push(exception.to_string());
        self
    }
}

/// Description of one class of a jar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub superclass: Option<String>,
    /// Enumeration cases; empty unless the class is an enum
    #[serde(default)]
    pub enum_cases: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub constructors: Vec<ConstructorDecl>,
    pub methods: Vec<MethodDecl>,
}

impl ClassInfo {
    pub fn new(name: &str, superclass: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
            enum_cases: vec![],
            fields: vec![],
            constructors: vec![],
            methods: vec![],
        }
    }

    pub fn with_field(mut self, name: &str, field_type: StorageType) -> Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            field_type,
        });
        self
    }

    pub fn with_constructor(mut self, formals: Vec<StorageType>, throws: &[&str]) -> Self {
        self.constructors.push(ConstructorDecl {
            formals,
            throws: throws.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn with_method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_enum_cases(mut self, cases: &[&str]) -> Self {
        self.enum_cases = cases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn is_enum(&self) -> bool {
        !self.enum_cases.is_empty()
    }
}

/// Content of a jar: the classes it defines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit {
    pub classes: Vec<ClassInfo>,
}

impl CodeUnit {
    pub fn new(classes: Vec<ClassInfo>) -> Self {
        Self { classes }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
