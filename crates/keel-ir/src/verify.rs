//! Operation graph verification
//!
//! Checks the structural invariants every built graph must satisfy. A
//! violation is a builder bug, so it is an error type rather than a
//! diagnostic.

use crate::graph::OperationGraph;
use crate::index::IndexReplacementContext;
use crate::operation::*;
use crate::visitor::{walk_children, OperationVisitor};
use keel_error::{Diagnostics, ErrorCode, Span};
use keel_semantic::{Symbol, SymbolModel, SyntaxId};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{syntax}: `{name}` does not resolve to the symbol the operation holds")]
    DanglingSymbol { syntax: SyntaxId, name: String },

    #[error("{syntax}: reference to looped `{name}` has no index context")]
    MissingIndexContext { syntax: SyntaxId, name: String },

    #[error("{syntax}: reference to `{name}` has an index context but the symbol is not looped")]
    UnexpectedIndexContext { syntax: SyntaxId, name: String },

    #[error("{syntax}: index context of `{name}` has {found} level(s), symbol has {expected} loop(s)")]
    LevelMismatch {
        syntax: SyntaxId,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("{syntax}: unresolved index of `{name}` was not reported")]
    UnreportedUnresolvedIndex { syntax: SyntaxId, name: String },

    #[error("{syntax}: syntax node lowered more than once")]
    DuplicateSyntax { syntax: SyntaxId },
}

/// Checks `graph` against the model it was built from
pub fn verify_graph<M: SymbolModel + ?Sized>(
    graph: &OperationGraph,
    model: &M,
) -> Result<(), InvariantViolation> {
    for decl in graph.all_declarations() {
        let bound = model.declared_symbol(decl.syntax);
        if bound.map(|s| s.id) != Some(decl.symbol.id) {
            return Err(InvariantViolation::DanglingSymbol {
                syntax: decl.syntax,
                name: decl.symbol.name.clone(),
            });
        }
    }

    let mut verifier = GraphVerifier {
        model,
        diagnostics: graph.diagnostics(),
        seen: HashSet::new(),
        violation: None,
    };
    graph.accept(&mut verifier);
    match verifier.violation {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

struct GraphVerifier<'a, M: SymbolModel + ?Sized> {
    model: &'a M,
    diagnostics: &'a Diagnostics,
    seen: HashSet<SyntaxId>,
    violation: Option<InvariantViolation>,
}

impl<'a, M: SymbolModel + ?Sized> GraphVerifier<'a, M> {
    fn fail(&mut self, violation: InvariantViolation) {
        if self.violation.is_none() {
            self.violation = Some(violation);
        }
    }

    fn mark(&mut self, syntax: SyntaxId) {
        if !self.seen.insert(syntax) {
            self.fail(InvariantViolation::DuplicateSyntax { syntax });
        }
    }

    fn check_symbol(&mut self, syntax: SyntaxId, symbol: &Symbol) {
        self.mark(syntax);
        let resolved = self.model.lookup(&symbol.name, syntax);
        if resolved.map(|s| s.id) != Some(symbol.id) {
            self.fail(InvariantViolation::DanglingSymbol {
                syntax,
                name: symbol.name.clone(),
            });
        }
    }

    fn check_reference(
        &mut self,
        syntax: SyntaxId,
        span: Span,
        symbol: &Symbol,
        context: Option<&IndexReplacementContext>,
    ) {
        self.check_symbol(syntax, symbol);
        let model = self.model;
        let loops = model.loop_descriptor_of(symbol);
        let name = symbol.name.clone();

        let Some(context) = context else {
            if !loops.is_empty() {
                self.fail(InvariantViolation::MissingIndexContext { syntax, name });
            }
            return;
        };

        if loops.is_empty() {
            self.fail(InvariantViolation::UnexpectedIndexContext { syntax, name });
            return;
        }
        let levels_match = context.levels.len() == loops.len()
            && context
                .levels
                .iter()
                .zip(loops)
                .all(|(level, loop_)| level.target_loop == loop_.id);
        if !levels_match {
            self.fail(InvariantViolation::LevelMismatch {
                syntax,
                name,
                expected: loops.len(),
                found: context.levels.len(),
            });
            return;
        }

        for access in context.explicit_accesses() {
            self.mark(access);
        }

        if context.is_unresolved() {
            let reported = self
                .diagnostics
                .with_code(ErrorCode::MISSING_LOOP_INDEX)
                .any(|d| d.position() == Some(span));
            if !reported {
                self.fail(InvariantViolation::UnreportedUnresolvedIndex { syntax, name });
            }
        }
    }
}

impl<'a, M: SymbolModel + ?Sized> OperationVisitor for GraphVerifier<'a, M> {
    fn visit_literal(&mut self, op: &LiteralOperation) {
        self.mark(op.syntax);
    }

    fn visit_interpolation(&mut self, op: &InterpolationOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }

    fn visit_object(&mut self, op: &ObjectOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }

    fn visit_array(&mut self, op: &ArrayOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }

    fn visit_resource_info(&mut self, op: &ResourceInfoOperation) {
        self.check_reference(op.syntax, op.span, &op.symbol, op.index_context.as_ref());
        walk_children(self, op.children());
    }

    fn visit_module_info(&mut self, op: &ModuleInfoOperation) {
        self.check_reference(op.syntax, op.span, &op.symbol, op.index_context.as_ref());
        walk_children(self, op.children());
    }

    fn visit_variable_access(&mut self, op: &VariableAccessOperation) {
        self.check_reference(op.syntax, op.span, &op.symbol, op.index_context.as_ref());
        walk_children(self, op.children());
    }

    fn visit_parameter_access(&mut self, op: &ParameterAccessOperation) {
        self.check_symbol(op.syntax, &op.symbol);
    }

    fn visit_local_variable_access(&mut self, op: &LocalVariableAccessOperation) {
        self.check_symbol(op.syntax, &op.symbol);
    }

    fn visit_property_access(&mut self, op: &PropertyAccessOperation) {
        self.mark(op.syntax);
        op.base.accept(self);
    }

    fn visit_array_access(&mut self, op: &ArrayAccessOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }

    fn visit_conditional(&mut self, op: &ConditionalOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }

    fn visit_function_call(&mut self, op: &FunctionCallOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }

    fn visit_binary(&mut self, op: &BinaryOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }

    fn visit_unary(&mut self, op: &UnaryOperation) {
        self.mark(op.syntax);
        op.operand.accept(self);
    }

    fn visit_for(&mut self, op: &ForOperation) {
        self.mark(op.syntax);
        walk_children(self, op.children());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_with_options, BuildOptions, VerifyMode};
    use crate::graph::DeclarationOperation;
    use keel_semantic::{BoundProgram, DeclaredType, SemanticModel, TreeBuilder};

    fn unverified(program: &BoundProgram, model: &SemanticModel) -> OperationGraph {
        let options = BuildOptions {
            verify: VerifyMode::Never,
        };
        build_with_options(program, model, &options)
    }

    fn looped_program() -> BoundProgram {
        let mut b = TreeBuilder::new();
        let source = b.reference("names");
        let body = b.object(vec![]);
        let value = b.for_loop("n", None, source, body);
        let names = b.parameter("names", DeclaredType::array_of(DeclaredType::String), None);
        let site = b.resource("site", "Microsoft.Web/sites@2022-09-01", value);
        let reference = b.reference("site");
        let zero = b.int(0);
        let first = b.index(reference, zero);
        let out = b.output("first", DeclaredType::Any, first);
        BoundProgram::new(vec![names, site, out])
    }

    #[test]
    fn test_built_graph_verifies() {
        let program = looped_program();
        let model = SemanticModel::bind(&program);
        let graph = unverified(&program, &model);
        assert_eq!(verify_graph(&graph, &model), Ok(()));
    }

    #[test]
    fn test_missing_context_detected() {
        let program = looped_program();
        let model = SemanticModel::bind(&program);
        let (mut declarations, diagnostics) = unverified(&program, &model).into_parts();

        // Strip the context off the output's reference
        let out: &mut DeclarationOperation = &mut declarations[2];
        if let Some(Operation::ResourceInfo(op)) = out.value.as_mut() {
            op.index_context = None;
        }
        let tampered = OperationGraph::new(declarations, diagnostics);

        let err = verify_graph(&tampered, &model).unwrap_err();
        assert!(matches!(err, InvariantViolation::MissingIndexContext { ref name, .. } if name == "site"));
        assert!(err.to_string().contains("has no index context"));
    }

    #[test]
    fn test_unreported_unresolved_detected() {
        let mut b = TreeBuilder::new();
        let source = b.reference("names");
        let body = b.object(vec![]);
        let value = b.for_loop("n", None, source, body);
        let site = b.resource("site", "Microsoft.Web/sites@2022-09-01", value);
        let reference = b.reference("site");
        let out = b.output("all", DeclaredType::Any, reference);
        let program = BoundProgram::new(vec![site, out]);
        let model = SemanticModel::bind(&program);

        let (declarations, _) = unverified(&program, &model).into_parts();
        let silenced = OperationGraph::new(declarations, Diagnostics::new());
        assert!(matches!(
            verify_graph(&silenced, &model),
            Err(InvariantViolation::UnreportedUnresolvedIndex { .. })
        ));
    }
}
