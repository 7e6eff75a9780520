use serde::{Serialize, Serializer};
use std::fmt;

/// Declared type signature for a parameter, return value, or composite
/// field. `Named` refers to a composite type registered ahead of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSig {
    Str,
    Int,
    Float,
    Bool,
    List(Box<TypeSig>),
    Map(Box<TypeSig>),
    Named(String),
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Str => write!(f, "string"),
            TypeSig::Int => write!(f, "int"),
            TypeSig::Float => write!(f, "float"),
            TypeSig::Bool => write!(f, "bool"),
            TypeSig::List(inner) => write!(f, "list<{}>", inner),
            TypeSig::Map(inner) => write!(f, "map<{}>", inner),
            TypeSig::Named(name) => write!(f, "{}", name),
        }
    }
}

impl Serialize for TypeSig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One declared parameter of an operation, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSig,
    pub description: String,
    pub required: bool,
}

/// One declared return value of an operation, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSig,
    pub description: String,
}

/// Field layout entry of a registered composite type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: TypeSig,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// Documentation-derived description of one operation. Built once during
/// startup extraction, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMetadata {
    pub name: String,
    pub category: String,
    pub display_name: String,
    pub parameters: Vec<ParameterSpec>,
    pub returns: Vec<ReturnSpec>,
    pub documentation: String,
}

impl OperationMetadata {
    /// Minimal metadata for an executable that discovery never saw.
    pub fn synthesized(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            category: "uncategorized".to_string(),
            parameters: Vec::new(),
            returns: Vec::new(),
            documentation: String::new(),
        }
    }
}

/// Discovery input: one operation module's raw source text plus its
/// category label. One module = one category.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    pub category: String,
    pub source: String,
}

impl ModuleSource {
    pub fn new(category: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            source: source.into(),
        }
    }
}
