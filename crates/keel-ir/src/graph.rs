//! Operation graph of one compilation unit

use crate::index::IndexReplacementContext;
use crate::operation::{symbol_name, Operation};
use crate::visitor::OperationVisitor;
use keel_error::{Diagnostics, Span};
use keel_semantic::{Symbol, SymbolId, SyntaxId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// A declaration and the operation built from its value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationOperation {
    pub syntax: SyntaxId,
    pub span: Span,
    #[serde(serialize_with = "symbol_name")]
    pub symbol: Arc<Symbol>,
    /// `None` when the value was elided after an error, or never given
    pub value: Option<Operation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeclarationOperation>,
}

impl DeclarationOperation {
    /// This declaration followed by its nested children, pre-order
    pub fn flatten(&self) -> Vec<&DeclarationOperation> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

/// The lowered form of a compilation unit, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationGraph {
    declarations: Vec<DeclarationOperation>,
    diagnostics: Diagnostics,
    #[serde(skip)]
    referenced: BTreeSet<SymbolId>,
}

impl OperationGraph {
    pub(crate) fn new(declarations: Vec<DeclarationOperation>, diagnostics: Diagnostics) -> Self {
        let mut graph = Self {
            declarations,
            diagnostics,
            referenced: BTreeSet::new(),
        };
        graph.referenced = graph
            .operations()
            .into_iter()
            .filter_map(Operation::referenced_symbol)
            .map(|symbol| symbol.id)
            .collect();
        graph
    }

    /// Adds symbols resolved by references that were elided with their subtree
    pub(crate) fn with_resolved(mut self, resolved: impl IntoIterator<Item = SymbolId>) -> Self {
        self.referenced.extend(resolved);
        self
    }

    /// Every symbol some reference in the unit resolved to, elided ones included
    pub fn referenced_symbols(&self) -> &BTreeSet<SymbolId> {
        &self.referenced
    }

    /// Top-level declarations in source order
    pub fn declarations(&self) -> &[DeclarationOperation] {
        &self.declarations
    }

    /// Every declaration, nested children included
    pub fn all_declarations(&self) -> Vec<&DeclarationOperation> {
        self.declarations.iter().flat_map(|d| d.flatten()).collect()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (Vec<DeclarationOperation>, Diagnostics) {
        (self.declarations, self.diagnostics)
    }

    /// Root operation of every declaration value, in declaration order
    pub fn roots(&self) -> impl Iterator<Item = &Operation> {
        self.all_declarations()
            .into_iter()
            .filter_map(|d| d.value.as_ref())
    }

    /// Every operation, pre-order, explicit index operations included
    pub fn operations(&self) -> Vec<&Operation> {
        let mut out = Vec::new();
        let mut stack: Vec<&Operation> = self.roots().collect();
        stack.reverse();
        while let Some(op) = stack.pop() {
            out.push(op);
            let mut children = op.children();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    pub fn operation_count(&self) -> usize {
        self.roots().map(Operation::node_count).sum()
    }

    /// Operation built from the syntax node `syntax`
    pub fn find(&self, syntax: SyntaxId) -> Option<&Operation> {
        self.operations().into_iter().find(|op| op.syntax() == syntax)
    }

    /// Dispatches every declaration value to the visitor
    pub fn accept<V: OperationVisitor + ?Sized>(&self, visitor: &mut V) {
        for root in self.roots() {
            root.accept(visitor);
        }
    }
}

fn context_suffix(context: Option<&IndexReplacementContext>) -> String {
    context.map(|c| format!(" {}", c)).unwrap_or_default()
}

fn describe(op: &Operation) -> String {
    match op {
        Operation::Literal(o) => format!("literal {}", o.value),
        Operation::Interpolation(o) => format!("interpolation {:?}", o.segments),
        Operation::Object(o) => {
            let keys: Vec<&str> = o.properties.iter().map(|p| p.key.as_str()).collect();
            format!("object {{{}}}", keys.join(", "))
        }
        Operation::Array(o) => format!("array ({})", o.items.len()),
        Operation::ResourceInfo(o) => format!(
            "resource {} '{}'{}",
            o.symbol.name,
            o.metadata.type_reference,
            context_suffix(o.index_context.as_ref())
        ),
        Operation::ModuleInfo(o) => format!(
            "module {} '{}'{}",
            o.symbol.name,
            o.metadata.path,
            context_suffix(o.index_context.as_ref())
        ),
        Operation::VariableAccess(o) => format!(
            "variable {}{}",
            o.symbol.name,
            context_suffix(o.index_context.as_ref())
        ),
        Operation::ParameterAccess(o) => format!("parameter {}", o.symbol.name),
        Operation::LocalVariableAccess(o) => format!("local {} of {}", o.symbol.name, o.loop_id),
        Operation::PropertyAccess(o) => format!("property .{}", o.property),
        Operation::ArrayAccess(_) => "index".to_string(),
        Operation::Conditional(o) if o.if_false.is_none() => "condition".to_string(),
        Operation::Conditional(_) => "ternary".to_string(),
        Operation::FunctionCall(o) => format!("call {}", o.name),
        Operation::Binary(o) => format!("binary {}", o.operator.as_str()),
        Operation::Unary(o) => format!("unary {}", o.operator.as_str()),
        Operation::For(o) => match &o.index_variable {
            Some(index) => format!("for ({}, {}) {}", o.item_variable, index, o.loop_id),
            None => format!("for {} {}", o.item_variable, o.loop_id),
        },
    }
}

fn dump_operation(out: &mut String, op: &Operation, depth: usize) -> fmt::Result {
    writeln!(out, "{}{}", "  ".repeat(depth), describe(op))?;
    for child in op.children() {
        dump_operation(out, child, depth + 1)?;
    }
    Ok(())
}

fn dump_declaration(out: &mut String, decl: &DeclarationOperation, depth: usize) -> fmt::Result {
    writeln!(
        out,
        "{}{} {}: {}",
        "  ".repeat(depth),
        decl.symbol.kind_name(),
        decl.symbol.name,
        decl.symbol.declared_type
    )?;
    match &decl.value {
        Some(value) => dump_operation(out, value, depth + 1)?,
        None => writeln!(out, "{}<none>", "  ".repeat(depth + 1))?,
    }
    for child in &decl.children {
        dump_declaration(out, child, depth + 1)?;
    }
    Ok(())
}

impl fmt::Display for OperationGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for decl in &self.declarations {
            dump_declaration(&mut out, decl, 0)?;
        }
        f.write_str(&out)
    }
}
