//! Bound syntax tree
//!
//! The tree handed over by the binder: declarations in source order, each
//! holding an expression tree whose nodes carry a stable [`SyntaxId`].

use crate::types::DeclaredType;
use crate::symbols::DeploymentScope;
use keel_error::{Span, Spanned};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable identity of a syntax node within one compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyntaxId(pub u32);

impl fmt::Display for SyntaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    String(String),
    Null,
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::Int(i) => write!(f, "{}", i),
            LiteralValue::String(s) => write!(f, "'{}'", s.escape_default()),
            LiteralValue::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Coalesce,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Coalesce => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOperator {
    Not,
    Minus,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Minus => "-",
        }
    }
}

/// `key: value` entry of an object literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub key: String,
    pub value: Expr,
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: SyntaxId,
    #[serde(default)]
    pub span: Span,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExprKind {
    Literal {
        value: LiteralValue,
    },
    /// `'prefix${a}middle${b}suffix'`: `segments.len() == expressions.len() + 1`
    Interpolation {
        segments: Vec<String>,
        expressions: Vec<Expr>,
    },
    Object {
        properties: Vec<ObjectProperty>,
    },
    Array {
        items: Vec<Expr>,
    },
    /// Bare name, resolved through the symbol model
    Reference {
        name: String,
    },
    PropertyAccess {
        base: Box<Expr>,
        property: String,
    },
    ArrayAccess {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// `condition ? if_true : if_false`
    Ternary {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// `if (condition) body` guarding a declaration value
    IfCondition {
        condition: Box<Expr>,
        body: Box<Expr>,
    },
    FunctionCall {
        name: String,
        arguments: Vec<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    /// Copy loop: `[for (item, index) in source: body]`
    For {
        item_variable: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index_variable: Option<String>,
        source: Box<Expr>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn new(id: SyntaxId, span: Span, kind: ExprKind) -> Self {
        Self { id, span, kind }
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal { .. } | ExprKind::Reference { .. } => Vec::new(),
            ExprKind::Interpolation { expressions, .. } => expressions.iter().collect(),
            ExprKind::Object { properties } => properties.iter().map(|p| &p.value).collect(),
            ExprKind::Array { items } => items.iter().collect(),
            ExprKind::PropertyAccess { base, .. } => vec![base],
            ExprKind::ArrayAccess { base, index } => vec![base, index],
            ExprKind::Ternary { condition, if_true, if_false } => vec![condition, if_true, if_false],
            ExprKind::IfCondition { condition, body } => vec![condition, body],
            ExprKind::FunctionCall { arguments, .. } => arguments.iter().collect(),
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::For { source, body, .. } => vec![source, body],
        }
    }

    /// Pre-order traversal of this expression and all descendants
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Number of expression nodes in this tree
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    pub fn as_reference(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Reference { name } => Some(name),
            _ => None,
        }
    }

    /// Reference nodes of this tree, pre-order
    pub fn references(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if e.as_reference().is_some() {
                out.push(e);
            }
        });
        out
    }

    /// Structural equality ignoring node ids and spans
    pub fn same_shape(&self, other: &Expr) -> bool {
        use ExprKind::*;

        fn all_same(a: &[Expr], b: &[Expr]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_shape(y))
        }

        match (&self.kind, &other.kind) {
            (Literal { value: a }, Literal { value: b }) => a == b,
            (Interpolation { segments: s1, expressions: e1 }, Interpolation { segments: s2, expressions: e2 }) => {
                s1 == s2 && all_same(e1, e2)
            }
            (Object { properties: p1 }, Object { properties: p2 }) => {
                p1.len() == p2.len()
                    && p1.iter().zip(p2).all(|(a, b)| a.key == b.key && a.value.same_shape(&b.value))
            }
            (Array { items: a }, Array { items: b }) => all_same(a, b),
            (Reference { name: a }, Reference { name: b }) => a == b,
            (PropertyAccess { base: b1, property: p1 }, PropertyAccess { base: b2, property: p2 }) => {
                p1 == p2 && b1.same_shape(b2)
            }
            (ArrayAccess { base: b1, index: i1 }, ArrayAccess { base: b2, index: i2 }) => {
                b1.same_shape(b2) && i1.same_shape(i2)
            }
            (
                Ternary { condition: c1, if_true: t1, if_false: f1 },
                Ternary { condition: c2, if_true: t2, if_false: f2 },
            ) => c1.same_shape(c2) && t1.same_shape(t2) && f1.same_shape(f2),
            (IfCondition { condition: c1, body: b1 }, IfCondition { condition: c2, body: b2 }) => {
                c1.same_shape(c2) && b1.same_shape(b2)
            }
            (FunctionCall { name: n1, arguments: a1 }, FunctionCall { name: n2, arguments: a2 }) => {
                n1 == n2 && all_same(a1, a2)
            }
            (
                Binary { operator: o1, left: l1, right: r1 },
                Binary { operator: o2, left: l2, right: r2 },
            ) => o1 == o2 && l1.same_shape(l2) && r1.same_shape(r2),
            (Unary { operator: o1, operand: a }, Unary { operator: o2, operand: b }) => {
                o1 == o2 && a.same_shape(b)
            }
            (
                For { item_variable: v1, index_variable: i1, source: s1, body: b1 },
                For { item_variable: v2, index_variable: i2, source: s2, body: b2 },
            ) => v1 == v2 && i1 == i2 && s1.same_shape(s2) && b1.same_shape(b2),
            _ => false,
        }
    }
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        self.span
    }
}

/// What a declaration declares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeclarationKind {
    Parameter {
        #[serde(rename = "type")]
        ty: DeclaredType,
    },
    Variable,
    Resource {
        /// `Namespace/type@apiVersion`
        #[serde(rename = "type")]
        type_reference: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<DeploymentScope>,
    },
    Module {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<DeploymentScope>,
    },
    Output {
        #[serde(rename = "type")]
        ty: DeclaredType,
    },
}

/// Top-level or nested declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: SyntaxId,
    pub name: String,
    #[serde(default)]
    pub span: Span,
    #[serde(flatten)]
    pub kind: DeclarationKind,
    /// Initializer; a parameter's default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expr>,
    /// Nested child resources, lexically inside this declaration's loop body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Declaration>,
}

impl Declaration {
    pub fn with_children(mut self, children: Vec<Declaration>) -> Self {
        self.children = children;
        self
    }

    pub fn is_resource(&self) -> bool {
        matches!(self.kind, DeclarationKind::Resource { .. })
    }
}

impl Spanned for Declaration {
    fn span(&self) -> Span {
        self.span
    }
}

/// The bound tree of one compilation unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundProgram {
    #[serde(default)]
    pub target_scope: DeploymentScope,
    pub declarations: Vec<Declaration>,
}

impl BoundProgram {
    pub fn new(declarations: Vec<Declaration>) -> Self {
        Self {
            target_scope: DeploymentScope::default(),
            declarations,
        }
    }

    /// Every expression node of the unit, in declaration order then pre-order
    pub fn expressions(&self) -> Vec<&Expr> {
        fn collect<'a>(decl: &'a Declaration, out: &mut Vec<&'a Expr>) {
            if let Some(value) = &decl.value {
                value.walk(&mut |e| out.push(e));
            }
            for child in &decl.children {
                collect(child, out);
            }
        }

        let mut out = Vec::new();
        for decl in &self.declarations {
            collect(decl, &mut out);
        }
        out
    }

    /// Nodes reusing a syntax id already taken by an earlier node
    pub fn duplicate_ids(&self) -> Vec<(SyntaxId, Span)> {
        fn visit(decl: &Declaration, seen: &mut HashSet<SyntaxId>, out: &mut Vec<(SyntaxId, Span)>) {
            if !seen.insert(decl.id) {
                out.push((decl.id, decl.span));
            }
            if let Some(value) = &decl.value {
                value.walk(&mut |e| {
                    if !seen.insert(e.id) {
                        out.push((e.id, e.span));
                    }
                });
            }
            for child in &decl.children {
                visit(child, seen, out);
            }
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for decl in &self.declarations {
            visit(decl, &mut seen, &mut out);
        }
        out
    }
}

/// Allocates syntax ids and spans for trees assembled in code
///
/// Node `n` gets id `n` and a one-byte span on line `n + 1`, so every node
/// has a distinct position.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    next_id: u32,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> (SyntaxId, Span) {
        let id = self.next_id;
        self.next_id += 1;
        (SyntaxId(id), Span::on_line(id + 1, 1, id as usize, 1))
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        let (id, span) = self.alloc();
        Expr::new(id, span, kind)
    }

    pub fn string(&mut self, value: &str) -> Expr {
        self.expr(ExprKind::Literal {
            value: LiteralValue::String(value.to_string()),
        })
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.expr(ExprKind::Literal {
            value: LiteralValue::Int(value),
        })
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.expr(ExprKind::Literal {
            value: LiteralValue::Bool(value),
        })
    }

    pub fn null(&mut self) -> Expr {
        self.expr(ExprKind::Literal {
            value: LiteralValue::Null,
        })
    }

    pub fn interpolation(&mut self, segments: &[&str], expressions: Vec<Expr>) -> Expr {
        debug_assert_eq!(segments.len(), expressions.len() + 1);
        self.expr(ExprKind::Interpolation {
            segments: segments.iter().map(|s| s.to_string()).collect(),
            expressions,
        })
    }

    pub fn object(&mut self, properties: Vec<(&str, Expr)>) -> Expr {
        self.expr(ExprKind::Object {
            properties: properties
                .into_iter()
                .map(|(key, value)| ObjectProperty {
                    key: key.to_string(),
                    value,
                })
                .collect(),
        })
    }

    pub fn array(&mut self, items: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Array { items })
    }

    pub fn reference(&mut self, name: &str) -> Expr {
        self.expr(ExprKind::Reference {
            name: name.to_string(),
        })
    }

    pub fn property(&mut self, base: Expr, property: &str) -> Expr {
        self.expr(ExprKind::PropertyAccess {
            base: Box::new(base),
            property: property.to_string(),
        })
    }

    pub fn index(&mut self, base: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::ArrayAccess {
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    pub fn ternary(&mut self, condition: Expr, if_true: Expr, if_false: Expr) -> Expr {
        self.expr(ExprKind::Ternary {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        })
    }

    pub fn if_condition(&mut self, condition: Expr, body: Expr) -> Expr {
        self.expr(ExprKind::IfCondition {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }

    pub fn call(&mut self, name: &str, arguments: Vec<Expr>) -> Expr {
        self.expr(ExprKind::FunctionCall {
            name: name.to_string(),
            arguments,
        })
    }

    pub fn binary(&mut self, operator: BinaryOperator, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(&mut self, operator: UnaryOperator, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    pub fn for_loop(&mut self, item: &str, index: Option<&str>, source: Expr, body: Expr) -> Expr {
        self.expr(ExprKind::For {
            item_variable: item.to_string(),
            index_variable: index.map(str::to_string),
            source: Box::new(source),
            body: Box::new(body),
        })
    }

    fn declaration(&mut self, name: &str, kind: DeclarationKind, value: Option<Expr>) -> Declaration {
        let (id, span) = self.alloc();
        Declaration {
            id,
            name: name.to_string(),
            span,
            kind,
            value,
            children: Vec::new(),
        }
    }

    pub fn parameter(&mut self, name: &str, ty: DeclaredType, default: Option<Expr>) -> Declaration {
        self.declaration(name, DeclarationKind::Parameter { ty }, default)
    }

    pub fn variable(&mut self, name: &str, value: Expr) -> Declaration {
        self.declaration(name, DeclarationKind::Variable, Some(value))
    }

    pub fn resource(&mut self, name: &str, type_reference: &str, value: Expr) -> Declaration {
        self.declaration(
            name,
            DeclarationKind::Resource {
                type_reference: type_reference.to_string(),
                scope: None,
            },
            Some(value),
        )
    }

    pub fn module(&mut self, name: &str, path: &str, value: Expr) -> Declaration {
        self.declaration(
            name,
            DeclarationKind::Module {
                path: path.to_string(),
                scope: None,
            },
            Some(value),
        )
    }

    pub fn output(&mut self, name: &str, ty: DeclaredType, value: Expr) -> Declaration {
        self.declaration(name, DeclarationKind::Output { ty }, Some(value))
    }
}
