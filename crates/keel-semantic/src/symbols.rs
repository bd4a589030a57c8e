//! Symbols produced by binding
//!
//! A [`Symbol`] is immutable once bound and shared through `Arc` by every
//! operation that references it.

use crate::syntax::{Expr, ExprKind, SyntaxId};
use crate::types::DeclaredType;
use keel_error::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique ID of a symbol within one compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

/// Identity of a copy loop: the syntax id of its `for` expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoopId(pub SyntaxId);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// Describes one copy loop a declaration (or reference site) sits in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDescriptor {
    pub id: LoopId,
    pub item_variable: String,
    pub index_variable: Option<String>,
    /// The array expression driving the loop
    pub source: Expr,
    pub span: Span,
}

impl LoopDescriptor {
    /// Descriptor for a `for` expression, `None` for any other node
    pub fn from_for(expr: &Expr) -> Option<Self> {
        match &expr.kind {
            ExprKind::For {
                item_variable,
                index_variable,
                source,
                ..
            } => Some(Self {
                id: LoopId(expr.id),
                item_variable: item_variable.clone(),
                index_variable: index_variable.clone(),
                source: (**source).clone(),
                span: expr.span,
            }),
            _ => None,
        }
    }

    /// Same loop referentially, or iterating a structurally identical source
    pub fn denotes_same_loop(&self, other: &LoopDescriptor) -> bool {
        self.id == other.id || self.source.same_shape(&other.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentScope {
    #[default]
    ResourceGroup,
    Subscription,
    ManagementGroup,
    Tenant,
}

impl fmt::Display for DeploymentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentScope::ResourceGroup => "resourceGroup",
            DeploymentScope::Subscription => "subscription",
            DeploymentScope::ManagementGroup => "managementGroup",
            DeploymentScope::Tenant => "tenant",
        };
        write!(f, "{}", s)
    }
}

/// `Namespace/type@apiVersion`, split into its parts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceTypeReference {
    pub type_name: String,
    pub api_version: Option<String>,
}

impl ResourceTypeReference {
    pub fn parse(text: &str) -> Self {
        match text.split_once('@') {
            Some((type_name, version)) if !version.is_empty() => Self {
                type_name: type_name.to_string(),
                api_version: Some(version.to_string()),
            },
            Some((type_name, _)) => Self {
                type_name: type_name.to_string(),
                api_version: None,
            },
            None => Self {
                type_name: text.to_string(),
                api_version: None,
            },
        }
    }
}

impl fmt::Display for ResourceTypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.api_version {
            Some(version) => write!(f, "{}@{}", self.type_name, version),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// Resolved facts about a resource declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub type_reference: ResourceTypeReference,
    pub scope: DeploymentScope,
}

impl ResourceMetadata {
    pub fn api_version(&self) -> Option<&str> {
        self.type_reference.api_version.as_deref()
    }
}

/// Resolved facts about a module declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub path: String,
    pub scope: DeploymentScope,
}

/// Role of a variable introduced by a copy loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopLocal {
    Item,
    Index,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SymbolKind {
    Resource(ResourceMetadata),
    Module(ModuleMetadata),
    Variable,
    Parameter,
    Output,
    /// Item or index variable of a copy loop
    Local { loop_id: LoopId, role: LoopLocal },
}

/// A bound, uniquely named declared entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub declared_type: DeclaredType,
    /// Copy loops replicating the declaration, outermost first
    pub loops: Vec<LoopDescriptor>,
    /// Guard of a conditionally deployed declaration
    pub condition: Option<Expr>,
    /// The declaration (or `for` expression, for locals) that introduced it
    pub declaration: SyntaxId,
    pub span: Span,
}

impl Symbol {
    pub fn is_looped(&self) -> bool {
        !self.loops.is_empty()
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            SymbolKind::Resource(_) => "resource",
            SymbolKind::Module(_) => "module",
            SymbolKind::Variable => "variable",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Output => "output",
            SymbolKind::Local { .. } => "loop variable",
        }
    }

    pub fn resource_metadata(&self) -> Option<&ResourceMetadata> {
        match &self.kind {
            SymbolKind::Resource(metadata) => Some(metadata),
            _ => None,
        }
    }
}
