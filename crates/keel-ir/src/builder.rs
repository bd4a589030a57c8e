//! Operation builder: bound tree → operation graph
//!
//! One pass per compilation unit. Declarations are built in source order and
//! expressions post-order: every composite operation is assembled from
//! children that were built first. User errors never abort the pass; they
//! become diagnostics, and only the subtree that cannot be represented
//! (an unknown name, a reference to an output) is elided.

use crate::graph::{DeclarationOperation, OperationGraph};
use crate::index::{correlate, ExplicitIndex, IndexReplacementContext};
use crate::operation::*;
use crate::verify::verify_graph;
use keel_error::{Diagnostic, Diagnostics, ErrorCode};
use keel_semantic::{
    BoundProgram, Declaration, Expr, ExprKind, LoopId, Symbol, SymbolId, SymbolKind, SymbolModel,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// When the finished graph is checked for internal invariants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerifyMode {
    /// Only in builds with debug assertions
    #[default]
    Debug,
    Always,
    Never,
}

impl VerifyMode {
    pub fn enabled(self) -> bool {
        match self {
            VerifyMode::Debug => cfg!(debug_assertions),
            VerifyMode::Always => true,
            VerifyMode::Never => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOptions {
    pub verify: VerifyMode,
}

/// Builds the operation graph of a bound compilation unit
pub fn build<M: SymbolModel + ?Sized>(program: &BoundProgram, model: &M) -> OperationGraph {
    build_with_options(program, model, &BuildOptions::default())
}

/// Builds the operation graph of a bound compilation unit
///
/// # Panics
///
/// When verification is enabled and the finished graph breaks an internal
/// invariant. That is a builder bug, never a user error. Trees reusing syntax
/// ids are not verified.
pub fn build_with_options<M: SymbolModel + ?Sized>(
    program: &BoundProgram,
    model: &M,
    options: &BuildOptions,
) -> OperationGraph {
    let mut builder = OperationBuilder::new(model);
    let declarations: Vec<_> = program
        .declarations
        .iter()
        .filter_map(|decl| builder.build_declaration(decl))
        .collect();

    let graph = OperationGraph::new(declarations, builder.diagnostics).with_resolved(builder.resolved);
    debug!(
        declarations = graph.declarations().len(),
        operations = graph.operation_count(),
        diagnostics = graph.diagnostics().len(),
        "built operation graph"
    );

    if options.verify.enabled() {
        // Node identity only holds for well-formed trees
        if !program.duplicate_ids().is_empty() {
            warn!("bound tree reuses syntax ids, skipping graph verification");
            return graph;
        }
        if let Err(violation) = verify_graph(&graph, model) {
            panic!("operation graph invariant violated: {}", violation);
        }
    }
    graph
}

/// Builder state for one compilation unit
struct OperationBuilder<'m, M: SymbolModel + ?Sized> {
    model: &'m M,
    diagnostics: Diagnostics,
    /// Every symbol a reference resolved to, kept even when the reference is elided
    resolved: BTreeSet<SymbolId>,
}

/// What an index chain is applied to
enum Head {
    Symbol(Option<Arc<Symbol>>),
    Operation(Option<Operation>),
}

impl<'m, M: SymbolModel + ?Sized> OperationBuilder<'m, M> {
    fn new(model: &'m M) -> Self {
        Self {
            model,
            diagnostics: Diagnostics::new(),
            resolved: BTreeSet::new(),
        }
    }

    fn build_declaration(&mut self, decl: &Declaration) -> Option<DeclarationOperation> {
        let Some(symbol) = self.model.declared_symbol(decl.id) else {
            self.diagnostics.push(
                Diagnostic::error(format!("declaration `{}` was not bound", decl.name))
                    .with_code(ErrorCode::UNKNOWN_SYMBOL)
                    .with_label(decl.span, "no symbol for this declaration"),
            );
            return None;
        };

        let value = decl.value.as_ref().and_then(|value| self.build_expr(value));
        let children = decl
            .children
            .iter()
            .filter_map(|child| self.build_declaration(child))
            .collect();

        Some(DeclarationOperation {
            syntax: decl.id,
            span: decl.span,
            symbol,
            value,
            children,
        })
    }

    /// `None` when the expression was elided; the reason is already reported
    fn build_expr(&mut self, expr: &Expr) -> Option<Operation> {
        let (syntax, span) = (expr.id, expr.span);
        let op = match &expr.kind {
            ExprKind::Literal { value } => Operation::Literal(LiteralOperation {
                syntax,
                span,
                value: value.clone(),
            }),
            ExprKind::Interpolation {
                segments,
                expressions,
            } => {
                let expressions = self.build_all(expressions)?;
                Operation::Interpolation(InterpolationOperation {
                    syntax,
                    span,
                    segments: segments.clone(),
                    expressions,
                })
            }
            ExprKind::Object { properties } => {
                let properties = properties
                    .iter()
                    .filter_map(|p| {
                        let value = self.build_expr(&p.value)?;
                        Some(ObjectPropertyOperation {
                            key: p.key.clone(),
                            value,
                        })
                    })
                    .collect();
                Operation::Object(ObjectOperation {
                    syntax,
                    span,
                    properties,
                })
            }
            ExprKind::Array { items } => {
                let items = items.iter().filter_map(|item| self.build_expr(item)).collect();
                Operation::Array(ArrayOperation { syntax, span, items })
            }
            ExprKind::Reference { .. } | ExprKind::ArrayAccess { .. } => {
                return self.build_access_chain(expr);
            }
            ExprKind::PropertyAccess { base, property } => {
                let base = self.build_expr(base)?;
                Operation::PropertyAccess(PropertyAccessOperation {
                    syntax,
                    span,
                    base: Box::new(base),
                    property: property.clone(),
                })
            }
            ExprKind::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                let condition = self.build_expr(condition);
                let if_true = self.build_expr(if_true);
                let if_false = self.build_expr(if_false);
                Operation::Conditional(ConditionalOperation {
                    syntax,
                    span,
                    condition: Box::new(condition?),
                    if_true: Box::new(if_true?),
                    if_false: Some(Box::new(if_false?)),
                })
            }
            ExprKind::IfCondition { condition, body } => {
                let condition = self.build_expr(condition);
                let body = self.build_expr(body);
                Operation::Conditional(ConditionalOperation {
                    syntax,
                    span,
                    condition: Box::new(condition?),
                    if_true: Box::new(body?),
                    if_false: None,
                })
            }
            ExprKind::FunctionCall { name, arguments } => {
                let arguments = self.build_all(arguments)?;
                Operation::FunctionCall(FunctionCallOperation {
                    syntax,
                    span,
                    name: name.clone(),
                    arguments,
                })
            }
            ExprKind::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.build_expr(left);
                let right = self.build_expr(right);
                Operation::Binary(BinaryOperation {
                    syntax,
                    span,
                    operator: *operator,
                    left: Box::new(left?),
                    right: Box::new(right?),
                })
            }
            ExprKind::Unary { operator, operand } => {
                let operand = self.build_expr(operand)?;
                Operation::Unary(UnaryOperation {
                    syntax,
                    span,
                    operator: *operator,
                    operand: Box::new(operand),
                })
            }
            ExprKind::For {
                item_variable,
                index_variable,
                source,
                body,
            } => {
                let source = self.build_expr(source);
                let body = self.build_expr(body);
                Operation::For(ForOperation {
                    syntax,
                    span,
                    loop_id: LoopId(syntax),
                    item_variable: item_variable.clone(),
                    index_variable: index_variable.clone(),
                    source: Box::new(source?),
                    body: Box::new(body?),
                })
            }
        };
        Some(op)
    }

    /// Builds every expression before giving up on any of them, so each
    /// failing sibling still gets its diagnostics reported
    fn build_all(&mut self, exprs: &[Expr]) -> Option<Vec<Operation>> {
        let built: Vec<Option<Operation>> = exprs.iter().map(|e| self.build_expr(e)).collect();
        built.into_iter().collect()
    }

    /// Builds `head[i][j]...`, folding indices into the head's index context
    /// where they address a copy loop
    fn build_access_chain(&mut self, expr: &Expr) -> Option<Operation> {
        let mut accesses = Vec::new();
        let mut head = expr;
        while let ExprKind::ArrayAccess { base, index } = &head.kind {
            accesses.push((head, index.as_ref()));
            head = base;
        }
        // Innermost access first
        accesses.reverse();

        let head_result = match head.as_reference() {
            Some(name) => Head::Symbol(self.resolve(head, name)),
            None => Head::Operation(self.build_expr(head)),
        };

        let indices: Vec<Option<ExplicitIndex>> = accesses
            .iter()
            .map(|(access, index)| {
                let index = self.build_expr(index)?;
                Some(ExplicitIndex {
                    access: access.id,
                    span: access.span,
                    index,
                })
            })
            .collect();
        let indices: Vec<ExplicitIndex> = indices.into_iter().collect::<Option<_>>()?;

        let (base, remaining) = match head_result {
            Head::Symbol(symbol) => self.reference_operation(head, symbol?, indices)?,
            Head::Operation(op) => (op?, indices),
        };

        Some(remaining.into_iter().fold(base, |base, access| {
            Operation::ArrayAccess(ArrayAccessOperation {
                syntax: access.access,
                span: access.span,
                base: Box::new(base),
                index: Box::new(access.index),
            })
        }))
    }

    fn resolve(&mut self, site: &Expr, name: &str) -> Option<Arc<Symbol>> {
        let symbol = self.model.lookup(name, site.id);
        if let Some(symbol) = &symbol {
            self.resolved.insert(symbol.id);
        } else {
            self.diagnostics.push(
                Diagnostic::error(format!("unknown symbol `{}`", name))
                    .with_code(ErrorCode::UNKNOWN_SYMBOL)
                    .with_label(site.span, "not found in this scope"),
            );
        }
        symbol
    }

    /// Reference operation for `symbol` at `site`, plus the explicit indices
    /// its index context did not consume
    fn reference_operation(
        &mut self,
        site: &Expr,
        symbol: Arc<Symbol>,
        explicit: Vec<ExplicitIndex>,
    ) -> Option<(Operation, Vec<ExplicitIndex>)> {
        let (syntax, span) = (site.id, site.span);
        let built = match &symbol.kind {
            SymbolKind::Output => {
                self.diagnostics.push(
                    Diagnostic::error(format!("output `{}` cannot be referenced", symbol.name))
                        .with_code(ErrorCode::OUTPUT_REFERENCE)
                        .with_label(span, "outputs are only visible to the caller")
                        .with_secondary_label(symbol.span, "output declared here"),
                );
                return None;
            }
            SymbolKind::Parameter => (
                Operation::ParameterAccess(ParameterAccessOperation {
                    syntax,
                    span,
                    symbol: symbol.clone(),
                }),
                explicit,
            ),
            SymbolKind::Local { loop_id, role } => (
                Operation::LocalVariableAccess(LocalVariableAccessOperation {
                    syntax,
                    span,
                    symbol: symbol.clone(),
                    loop_id: *loop_id,
                    role: *role,
                }),
                explicit,
            ),
            SymbolKind::Variable => {
                let (index_context, remaining) = self.index_context(site, &symbol, explicit);
                (
                    Operation::VariableAccess(VariableAccessOperation {
                        syntax,
                        span,
                        symbol: symbol.clone(),
                        index_context,
                    }),
                    remaining,
                )
            }
            SymbolKind::Resource(metadata) => {
                let (index_context, remaining) = self.index_context(site, &symbol, explicit);
                (
                    Operation::ResourceInfo(ResourceInfoOperation {
                        syntax,
                        span,
                        symbol: symbol.clone(),
                        metadata: metadata.clone(),
                        index_context,
                    }),
                    remaining,
                )
            }
            SymbolKind::Module(metadata) => {
                let (index_context, remaining) = self.index_context(site, &symbol, explicit);
                (
                    Operation::ModuleInfo(ModuleInfoOperation {
                        syntax,
                        span,
                        symbol: symbol.clone(),
                        metadata: metadata.clone(),
                        index_context,
                    }),
                    remaining,
                )
            }
        };
        Some(built)
    }

    fn index_context(
        &mut self,
        site: &Expr,
        symbol: &Symbol,
        explicit: Vec<ExplicitIndex>,
    ) -> (Option<IndexReplacementContext>, Vec<ExplicitIndex>) {
        let model = self.model;
        let target = model.loop_descriptor_of(symbol);
        let scope = model.enclosing_loop_scope(site.id);
        let (context, remaining) = correlate(model, target, scope, explicit);

        if let Some(context) = &context {
            trace!(
                symbol = %symbol.name,
                site = %site.id,
                kind = %context.kind(),
                "correlated loop index"
            );

            if let Some(level) = context.first_unresolved() {
                let mut diagnostic = Diagnostic::error(format!(
                    "{} `{}` is replicated by a copy loop and needs an index here",
                    symbol.kind_name(),
                    symbol.name
                ))
                .with_code(ErrorCode::MISSING_LOOP_INDEX)
                .with_label(site.span, "index required for this reference");
                if let Some(loop_) = target.iter().find(|l| l.id == level.target_loop) {
                    diagnostic = diagnostic.with_secondary_label(
                        loop_.span,
                        format!("loop over `{}` declared here", loop_.item_variable),
                    );
                }
                self.diagnostics.push(diagnostic.with_help(format!(
                    "index the reference, for example `{}[0]`",
                    site.as_reference().unwrap_or(&symbol.name)
                )));
            }
        }
        (context, remaining)
    }
}
