//! Operation node set
//!
//! The closed set of operation variants making up the graph. Operations are
//! plain immutable records: every child is owned by exactly one parent, so
//! the graph is a tree. Equality is structural.

use crate::index::IndexReplacementContext;
use keel_error::{Span, Spanned};
use keel_semantic::{
    BinaryOperator, LiteralValue, LoopId, LoopLocal, ModuleMetadata, ResourceMetadata, Symbol,
    SyntaxId, UnaryOperator,
};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Serializes a symbol reference as the symbol's name
pub(crate) fn symbol_name<S: Serializer>(symbol: &Arc<Symbol>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&symbol.name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Operation {
    Literal(LiteralOperation),
    Interpolation(InterpolationOperation),
    Object(ObjectOperation),
    Array(ArrayOperation),
    ResourceInfo(ResourceInfoOperation),
    ModuleInfo(ModuleInfoOperation),
    VariableAccess(VariableAccessOperation),
    ParameterAccess(ParameterAccessOperation),
    LocalVariableAccess(LocalVariableAccessOperation),
    PropertyAccess(PropertyAccessOperation),
    ArrayAccess(ArrayAccessOperation),
    Conditional(ConditionalOperation),
    FunctionCall(FunctionCallOperation),
    Binary(BinaryOperation),
    Unary(UnaryOperation),
    For(ForOperation),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteralOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub value: LiteralValue,
}

/// String interpolation; `segments` surround `expressions`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpolationOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub segments: Vec<String>,
    pub expressions: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPropertyOperation {
    pub key: String,
    pub value: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub properties: Vec<ObjectPropertyOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub items: Vec<Operation>,
}

/// Reference to a resource declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfoOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    #[serde(serialize_with = "symbol_name")]
    pub symbol: Arc<Symbol>,
    pub metadata: ResourceMetadata,
    /// Present exactly when the resource is replicated by a copy loop
    pub index_context: Option<IndexReplacementContext>,
}

/// Reference to a module declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfoOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    #[serde(serialize_with = "symbol_name")]
    pub symbol: Arc<Symbol>,
    pub metadata: ModuleMetadata,
    pub index_context: Option<IndexReplacementContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableAccessOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    #[serde(serialize_with = "symbol_name")]
    pub symbol: Arc<Symbol>,
    pub index_context: Option<IndexReplacementContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterAccessOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    #[serde(serialize_with = "symbol_name")]
    pub symbol: Arc<Symbol>,
}

/// Access to a copy loop's item or index variable
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalVariableAccessOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    #[serde(serialize_with = "symbol_name")]
    pub symbol: Arc<Symbol>,
    pub loop_id: LoopId,
    pub role: LoopLocal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAccessOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub base: Box<Operation>,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayAccessOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub base: Box<Operation>,
    pub index: Box<Operation>,
}

/// Ternary expression, or a declaration guard when `if_false` is absent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub condition: Box<Operation>,
    pub if_true: Box<Operation>,
    pub if_false: Option<Box<Operation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub name: String,
    pub arguments: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub operator: BinaryOperator,
    pub left: Box<Operation>,
    pub right: Box<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnaryOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub operator: UnaryOperator,
    pub operand: Box<Operation>,
}

/// Copy loop expression
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    pub loop_id: LoopId,
    pub item_variable: String,
    pub index_variable: Option<String>,
    pub source: Box<Operation>,
    pub body: Box<Operation>,
}

fn context_children(context: &Option<IndexReplacementContext>) -> Vec<&Operation> {
    context
        .as_ref()
        .map(|c| c.explicit_indices().collect())
        .unwrap_or_default()
}

impl LiteralOperation {
    pub fn children(&self) -> Vec<&Operation> {
        Vec::new()
    }
}

impl InterpolationOperation {
    pub fn children(&self) -> Vec<&Operation> {
        self.expressions.iter().collect()
    }
}

impl ObjectOperation {
    pub fn children(&self) -> Vec<&Operation> {
        self.properties.iter().map(|p| &p.value).collect()
    }

    pub fn property(&self, key: &str) -> Option<&Operation> {
        self.properties.iter().find(|p| p.key == key).map(|p| &p.value)
    }
}

impl ArrayOperation {
    pub fn children(&self) -> Vec<&Operation> {
        self.items.iter().collect()
    }
}

impl ResourceInfoOperation {
    /// Explicit index expressions folded into the context
    pub fn children(&self) -> Vec<&Operation> {
        context_children(&self.index_context)
    }
}

impl ModuleInfoOperation {
    pub fn children(&self) -> Vec<&Operation> {
        context_children(&self.index_context)
    }
}

impl VariableAccessOperation {
    pub fn children(&self) -> Vec<&Operation> {
        context_children(&self.index_context)
    }
}

impl ParameterAccessOperation {
    pub fn children(&self) -> Vec<&Operation> {
        Vec::new()
    }
}

impl LocalVariableAccessOperation {
    pub fn children(&self) -> Vec<&Operation> {
        Vec::new()
    }
}

impl PropertyAccessOperation {
    pub fn children(&self) -> Vec<&Operation> {
        vec![&self.base]
    }
}

impl ArrayAccessOperation {
    pub fn children(&self) -> Vec<&Operation> {
        vec![&self.base, &self.index]
    }
}

impl ConditionalOperation {
    pub fn children(&self) -> Vec<&Operation> {
        let mut children: Vec<&Operation> = vec![&self.condition, &self.if_true];
        children.extend(self.if_false.as_deref());
        children
    }
}

impl FunctionCallOperation {
    pub fn children(&self) -> Vec<&Operation> {
        self.arguments.iter().collect()
    }
}

impl BinaryOperation {
    pub fn children(&self) -> Vec<&Operation> {
        vec![&self.left, &self.right]
    }
}

impl UnaryOperation {
    pub fn children(&self) -> Vec<&Operation> {
        vec![&self.operand]
    }
}

impl ForOperation {
    pub fn children(&self) -> Vec<&Operation> {
        vec![&self.source, &self.body]
    }
}

impl Operation {
    fn header(&self) -> (SyntaxId, Span) {
        match self {
            Operation::Literal(op) => (op.syntax, op.span),
            Operation::Interpolation(op) => (op.syntax, op.span),
            Operation::Object(op) => (op.syntax, op.span),
            Operation::Array(op) => (op.syntax, op.span),
            Operation::ResourceInfo(op) => (op.syntax, op.span),
            Operation::ModuleInfo(op) => (op.syntax, op.span),
            Operation::VariableAccess(op) => (op.syntax, op.span),
            Operation::ParameterAccess(op) => (op.syntax, op.span),
            Operation::LocalVariableAccess(op) => (op.syntax, op.span),
            Operation::PropertyAccess(op) => (op.syntax, op.span),
            Operation::ArrayAccess(op) => (op.syntax, op.span),
            Operation::Conditional(op) => (op.syntax, op.span),
            Operation::FunctionCall(op) => (op.syntax, op.span),
            Operation::Binary(op) => (op.syntax, op.span),
            Operation::Unary(op) => (op.syntax, op.span),
            Operation::For(op) => (op.syntax, op.span),
        }
    }

    /// Syntax node this operation was built from
    pub fn syntax(&self) -> SyntaxId {
        self.header().0
    }

    /// Child operations in source order, explicit loop indices included
    pub fn children(&self) -> Vec<&Operation> {
        match self {
            Operation::Literal(op) => op.children(),
            Operation::Interpolation(op) => op.children(),
            Operation::Object(op) => op.children(),
            Operation::Array(op) => op.children(),
            Operation::ResourceInfo(op) => op.children(),
            Operation::ModuleInfo(op) => op.children(),
            Operation::VariableAccess(op) => op.children(),
            Operation::ParameterAccess(op) => op.children(),
            Operation::LocalVariableAccess(op) => op.children(),
            Operation::PropertyAccess(op) => op.children(),
            Operation::ArrayAccess(op) => op.children(),
            Operation::Conditional(op) => op.children(),
            Operation::FunctionCall(op) => op.children(),
            Operation::Binary(op) => op.children(),
            Operation::Unary(op) => op.children(),
            Operation::For(op) => op.children(),
        }
    }

    /// Symbol referenced by this operation, if it is a reference
    pub fn referenced_symbol(&self) -> Option<&Arc<Symbol>> {
        match self {
            Operation::ResourceInfo(op) => Some(&op.symbol),
            Operation::ModuleInfo(op) => Some(&op.symbol),
            Operation::VariableAccess(op) => Some(&op.symbol),
            Operation::ParameterAccess(op) => Some(&op.symbol),
            Operation::LocalVariableAccess(op) => Some(&op.symbol),
            _ => None,
        }
    }

    /// Index context of a reference to a replicable declaration
    pub fn index_context(&self) -> Option<&IndexReplacementContext> {
        match self {
            Operation::ResourceInfo(op) => op.index_context.as_ref(),
            Operation::ModuleInfo(op) => op.index_context.as_ref(),
            Operation::VariableAccess(op) => op.index_context.as_ref(),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Operation::Literal(_) => "literal",
            Operation::Interpolation(_) => "interpolation",
            Operation::Object(_) => "object",
            Operation::Array(_) => "array",
            Operation::ResourceInfo(_) => "resource",
            Operation::ModuleInfo(_) => "module",
            Operation::VariableAccess(_) => "variable",
            Operation::ParameterAccess(_) => "parameter",
            Operation::LocalVariableAccess(_) => "local",
            Operation::PropertyAccess(_) => "property",
            Operation::ArrayAccess(_) => "index",
            Operation::Conditional(_) => "conditional",
            Operation::FunctionCall(_) => "call",
            Operation::Binary(_) => "binary",
            Operation::Unary(_) => "unary",
            Operation::For(_) => "for",
        }
    }

    /// Number of operations in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }
}

impl Spanned for Operation {
    fn span(&self) -> Span {
        self.header().1
    }
}
