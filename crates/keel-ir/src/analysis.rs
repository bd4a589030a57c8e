//! Analyses over the operation graph
//!
//! - [`find_references`]: every site referencing a symbol
//! - [`lint`]: declarations that are never referenced

use crate::graph::OperationGraph;
use crate::index::{IndexContextKind, IndexReplacementContext};
use crate::operation::*;
use crate::visitor::{walk_children, OperationVisitor};
use keel_error::{Diagnostic, Diagnostics, ErrorCode, Level, Span};
use keel_semantic::{Symbol, SymbolId, SymbolKind, SyntaxId};
use serde::{Deserialize, Serialize};

/// One site referencing a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolReference {
    pub syntax: SyntaxId,
    pub span: Span,
    /// How a looped target is indexed at this site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexContextKind>,
}

/// Collects the reference sites of one symbol in visit order
pub struct ReferenceFinder {
    target: SymbolId,
    references: Vec<SymbolReference>,
}

impl ReferenceFinder {
    pub fn new(target: &Symbol) -> Self {
        Self {
            target: target.id,
            references: Vec::new(),
        }
    }

    pub fn into_references(self) -> Vec<SymbolReference> {
        self.references
    }

    fn record(&mut self, syntax: SyntaxId, span: Span, symbol: &Symbol, context: Option<&IndexReplacementContext>) {
        if symbol.id == self.target {
            self.references.push(SymbolReference {
                syntax,
                span,
                index: context.map(IndexReplacementContext::kind),
            });
        }
    }
}

impl OperationVisitor for ReferenceFinder {
    fn visit_literal(&mut self, _op: &LiteralOperation) {}

    fn visit_interpolation(&mut self, op: &InterpolationOperation) {
        walk_children(self, op.children());
    }

    fn visit_object(&mut self, op: &ObjectOperation) {
        walk_children(self, op.children());
    }

    fn visit_array(&mut self, op: &ArrayOperation) {
        walk_children(self, op.children());
    }

    fn visit_resource_info(&mut self, op: &ResourceInfoOperation) {
        self.record(op.syntax, op.span, &op.symbol, op.index_context.as_ref());
        walk_children(self, op.children());
    }

    fn visit_module_info(&mut self, op: &ModuleInfoOperation) {
        self.record(op.syntax, op.span, &op.symbol, op.index_context.as_ref());
        walk_children(self, op.children());
    }

    fn visit_variable_access(&mut self, op: &VariableAccessOperation) {
        self.record(op.syntax, op.span, &op.symbol, op.index_context.as_ref());
        walk_children(self, op.children());
    }

    fn visit_parameter_access(&mut self, op: &ParameterAccessOperation) {
        self.record(op.syntax, op.span, &op.symbol, None);
    }

    fn visit_local_variable_access(&mut self, op: &LocalVariableAccessOperation) {
        self.record(op.syntax, op.span, &op.symbol, None);
    }

    fn visit_property_access(&mut self, op: &PropertyAccessOperation) {
        walk_children(self, op.children());
    }

    fn visit_array_access(&mut self, op: &ArrayAccessOperation) {
        walk_children(self, op.children());
    }

    fn visit_conditional(&mut self, op: &ConditionalOperation) {
        walk_children(self, op.children());
    }

    fn visit_function_call(&mut self, op: &FunctionCallOperation) {
        walk_children(self, op.children());
    }

    fn visit_binary(&mut self, op: &BinaryOperation) {
        walk_children(self, op.children());
    }

    fn visit_unary(&mut self, op: &UnaryOperation) {
        walk_children(self, op.children());
    }

    fn visit_for(&mut self, op: &ForOperation) {
        walk_children(self, op.children());
    }
}

/// Every site in `graph` referencing `symbol`
pub fn find_references(graph: &OperationGraph, symbol: &Symbol) -> Vec<SymbolReference> {
    let mut finder = ReferenceFinder::new(symbol);
    graph.accept(&mut finder);
    finder.into_references()
}

/// Severity of each lint rule; `None` turns a rule off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LintOptions {
    pub unused_declarations: Option<Level>,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            unused_declarations: Some(Level::Warning),
        }
    }
}

/// Runs the enabled lint rules over a built graph
pub fn lint(graph: &OperationGraph, options: &LintOptions) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    if let Some(level) = options.unused_declarations {
        diagnostics.extend(unused_declarations(graph, level));
    }
    diagnostics
}

/// Top-level parameters, variables, resources and modules nothing refers to
///
/// Nested child resources are deployed with their parent and never reported.
/// A reference counts even when an error elided the operation around it.
pub fn unused_declarations(graph: &OperationGraph, level: Level) -> Diagnostics {
    let referenced = graph.referenced_symbols();

    let mut diagnostics = Diagnostics::new();
    for decl in graph.declarations() {
        let symbol = &decl.symbol;
        let checked = matches!(
            symbol.kind,
            SymbolKind::Parameter | SymbolKind::Variable | SymbolKind::Resource(_) | SymbolKind::Module(_)
        );
        if !checked || referenced.contains(&symbol.id) {
            continue;
        }
        diagnostics.push(
            Diagnostic::new(level, format!("{} `{}` is declared but never used", symbol.kind_name(), symbol.name))
                .with_code(ErrorCode::UNUSED_DECLARATION)
                .with_label(decl.span, "unused declaration"),
        );
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use keel_semantic::{BoundProgram, DeclaredType, SemanticModel, SymbolModel, TreeBuilder};

    fn program() -> BoundProgram {
        let mut b = TreeBuilder::new();
        let location = b.parameter("location", DeclaredType::String, None);
        let unused = b.parameter("unusedTag", DeclaredType::String, None);

        let source = b.reference("names");
        let loc = b.reference("location");
        let body = b.object(vec![("location", loc)]);
        let value = b.for_loop("n", None, source, body);
        let names = b.parameter("names", DeclaredType::array_of(DeclaredType::String), None);
        let storage = b.resource("storage", "Microsoft.Storage/storageAccounts@2023-01-01", value);

        let first = {
            let reference = b.reference("storage");
            let zero = b.int(0);
            let access = b.index(reference, zero);
            b.property(access, "id")
        };
        let all = b.reference("storage");
        let first_out = b.output("firstId", DeclaredType::String, first);
        let all_out = b.output("all", DeclaredType::Any, all);
        BoundProgram::new(vec![location, unused, names, storage, first_out, all_out])
    }

    #[test]
    fn test_find_references_with_index_kinds() {
        let program = program();
        let model = SemanticModel::bind(&program);
        let graph = build(&program, &model);

        let storage = model.lookup("storage", SyntaxId(0)).unwrap();
        let references = find_references(&graph, &storage);
        let kinds: Vec<_> = references.iter().map(|r| r.index).collect();
        assert_eq!(kinds, vec![Some(IndexContextKind::Explicit), Some(IndexContextKind::Unresolved)]);

        let location = model.lookup("location", SyntaxId(0)).unwrap();
        let references = find_references(&graph, &location);
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].index, None);
    }

    #[test]
    fn test_unused_declarations_reported() {
        let program = program();
        let model = SemanticModel::bind(&program);
        let graph = build(&program, &model);

        let diagnostics = lint(&graph, &LintOptions::default());
        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["parameter `unusedTag` is declared but never used"]);
        assert!(!diagnostics.has_errors());

        let off = LintOptions {
            unused_declarations: None,
        };
        assert!(lint(&graph, &off).is_empty());
    }

    #[test]
    fn test_lint_options_from_json() {
        let options: LintOptions = serde_json::from_str(r#"{ "unusedDeclarations": "error" }"#).unwrap();
        assert_eq!(options.unused_declarations, Some(Level::Error));
        let defaults: LintOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, LintOptions::default());
        let off: LintOptions = serde_json::from_str(r#"{ "unusedDeclarations": null }"#).unwrap();
        assert_eq!(off.unused_declarations, None);
    }

    #[test]
    fn test_reference_in_elided_subtree_counts_as_use() {
        let mut b = TreeBuilder::new();
        let subnet_body = b.object(vec![]);
        let subnet = b.resource("subnet", "Microsoft.Network/virtualNetworks/subnets@2023-04-01", subnet_body);
        let vnet_body = b.object(vec![]);
        let vnet = b
            .resource("vnet", "Microsoft.Network/virtualNetworks@2023-04-01", vnet_body)
            .with_children(vec![subnet]);

        // concat(vnet.id, missing)
        let id = {
            let reference = b.reference("vnet");
            b.property(reference, "id")
        };
        let missing = b.reference("missing");
        let call = b.call("concat", vec![id, missing]);
        let joined = b.variable("joined", call);
        let out_ref = b.reference("joined");
        let out = b.output("result", DeclaredType::String, out_ref);

        let program = BoundProgram::new(vec![vnet, joined, out]);
        let model = SemanticModel::bind(&program);
        let graph = build(&program, &model);
        assert_eq!(graph.diagnostics().with_code(ErrorCode::UNKNOWN_SYMBOL).count(), 1);
        assert!(graph.declarations()[1].value.is_none());

        // Neither `vnet` nor its unreferenced child is reported
        assert!(lint(&graph, &LintOptions::default()).is_empty());
    }
}
