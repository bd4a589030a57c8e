//! Declared types
//!
//! Only the declared shape of a symbol lives here; type inference belongs to
//! the type checker.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclaredType {
    /// Not declared or not yet inferred
    #[default]
    Any,
    String,
    Int,
    Bool,
    Object,
    Array(Box<DeclaredType>),
    /// Resource of the given type name (`Microsoft.Storage/storageAccounts`)
    Resource(String),
    /// Module instantiated from the given path
    Module(String),
}

impl DeclaredType {
    pub fn array_of(element: DeclaredType) -> Self {
        DeclaredType::Array(Box::new(element))
    }

    /// Element type of an array, `Any` for anything else
    pub fn element_type(&self) -> DeclaredType {
        match self {
            DeclaredType::Array(inner) => (**inner).clone(),
            _ => DeclaredType::Any,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DeclaredType::Array(_))
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Any => write!(f, "any"),
            DeclaredType::String => write!(f, "string"),
            DeclaredType::Int => write!(f, "int"),
            DeclaredType::Bool => write!(f, "bool"),
            DeclaredType::Object => write!(f, "object"),
            DeclaredType::Array(inner) => write!(f, "{}[]", inner),
            DeclaredType::Resource(name) => write!(f, "resource '{}'", name),
            DeclaredType::Module(path) => write!(f, "module '{}'", path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ty = DeclaredType::array_of(DeclaredType::Resource("Microsoft.Storage/storageAccounts".into()));
        assert_eq!(ty.to_string(), "resource 'Microsoft.Storage/storageAccounts'[]");
        assert_eq!(ty.element_type(), DeclaredType::Resource("Microsoft.Storage/storageAccounts".into()));
        assert_eq!(DeclaredType::Int.element_type(), DeclaredType::Any);
    }
}
