//! Pipeline tests for the keel compiler
//!
//! Drives the complete lowering pipeline on bound trees:
//! BoundProgram → bind → operation graph → lint

use keel_error::{Diagnostics, ErrorCode};
use keel_ir::{build_with_options, lint, BuildOptions, LintOptions, OperationGraph, VerifyMode};
use keel_semantic::{BoundProgram, SemanticModel, SyntaxId};
use std::collections::BTreeSet;

/// Result of lowering one compilation unit
#[derive(Debug)]
pub struct CompileResult {
    /// No error diagnostics in any phase
    pub success: bool,
    /// Binding, lowering and lint diagnostics, in that order
    pub diagnostics: Diagnostics,
    pub model: SemanticModel,
    pub graph: OperationGraph,
}

/// Binds, lowers (always verifying the graph) and lints a program
pub fn compile(program: &BoundProgram) -> CompileResult {
    let model = SemanticModel::bind(program);
    let options = BuildOptions {
        verify: VerifyMode::Always,
    };
    let graph = build_with_options(program, &model, &options);

    let mut diagnostics = model.diagnostics().clone();
    diagnostics.extend(graph.diagnostics().clone());
    diagnostics.extend(lint(&graph, &LintOptions::default()));

    CompileResult {
        success: !diagnostics.has_errors(),
        diagnostics,
        model,
        graph,
    }
}

/// Compiles a bound tree given as JSON
pub fn compile_json(json: &str) -> CompileResult {
    let program: BoundProgram = serde_json::from_str(json).expect("invalid bound tree JSON");
    compile(&program)
}

/// Asserts that the program lowers without errors
pub fn assert_compiles(program: &BoundProgram) -> CompileResult {
    let result = compile(program);
    if !result.success {
        panic!("Expected program to lower, but got errors:\n{:#?}", result.diagnostics);
    }
    result
}

/// Asserts that lowering reports `code` at least once
pub fn assert_error_code(program: &BoundProgram, code: ErrorCode) -> CompileResult {
    let result = compile(program);
    if result.diagnostics.with_code(code).next().is_none() {
        panic!("Expected {} diagnostic, got:\n{:#?}", code, result.diagnostics);
    }
    result
}

/// Syntax ids represented in the graph: operations plus folded index accesses
pub fn covered_syntax(graph: &OperationGraph) -> BTreeSet<SyntaxId> {
    let mut ids = BTreeSet::new();
    for op in graph.operations() {
        ids.insert(op.syntax());
        if let Some(context) = op.index_context() {
            ids.extend(context.explicit_accesses());
        }
    }
    ids
}

/// Every expression id of a program
pub fn expression_ids(program: &BoundProgram) -> BTreeSet<SyntaxId> {
    program.expressions().iter().map(|e| e.id).collect()
}

/// Bound trees shared by the test modules
pub mod fixtures {
    use keel_semantic::{BoundProgram, DeclaredType, SyntaxId, TreeBuilder};

    /// ```text
    /// resource storage '...' = [for i in range(0, 3): { name: 's${i}' }]
    /// resource diag '...' = [for j in range(0, 3): { target: storage.id }]
    /// output storageId string = storage.id
    /// ```
    pub struct StorageScenario {
        pub program: BoundProgram,
        pub inside_loop: SyntaxId,
        pub top_level: SyntaxId,
    }

    pub fn storage_scenario() -> StorageScenario {
        let mut b = TreeBuilder::new();
        let range = |b: &mut TreeBuilder| {
            let (lo, hi) = (b.int(0), b.int(3));
            b.call("range", vec![lo, hi])
        };

        let storage = {
            let source = range(&mut b);
            let i = b.reference("i");
            let name = b.interpolation(&["s", ""], vec![i]);
            let body = b.object(vec![("name", name)]);
            let value = b.for_loop("i", None, source, body);
            b.resource("storage", "Microsoft.Storage/storageAccounts@2023-01-01", value)
        };

        let reference = b.reference("storage");
        let inside_loop = reference.id;
        let diag = {
            let source = range(&mut b);
            let target = b.property(reference, "id");
            let body = b.object(vec![("target", target)]);
            let value = b.for_loop("j", None, source, body);
            b.resource("diag", "Microsoft.Insights/diagnosticSettings@2021-05-01-preview", value)
        };

        let reference = b.reference("storage");
        let top_level = reference.id;
        let id = b.property(reference, "id");
        let out = b.output("storageId", DeclaredType::String, id);

        StorageScenario {
            program: BoundProgram::new(vec![storage, diag, out]),
            inside_loop,
            top_level,
        }
    }

    /// A looped storage account with a looped child container, and a lock
    /// looping over the same accounts that references both
    pub struct NestedScenario {
        pub program: BoundProgram,
        /// `storage` from inside the lock loop
        pub storage_in_lock: SyntaxId,
        /// `storage::blob` from inside the lock and container loops
        pub blob_in_both: SyntaxId,
        /// `storage::blob` from inside the lock loop only
        pub blob_partial: SyntaxId,
        /// `storage::blob[0]` from inside the lock loop only
        pub blob_indexed: SyntaxId,
    }

    pub fn nested_scenario() -> NestedScenario {
        let mut b = TreeBuilder::new();
        let strings = || DeclaredType::array_of(DeclaredType::String);
        let accounts = b.parameter("accounts", strings(), None);
        let containers = b.parameter("containers", strings(), None);

        let storage = {
            let source = b.reference("accounts");
            let account = b.reference("account");
            let body = b.object(vec![("name", account)]);
            let value = b.for_loop("account", None, source, body);
            b.resource("storage", "Microsoft.Storage/storageAccounts@2023-01-01", value)
        };
        let blob = {
            let source = b.reference("containers");
            let container = b.reference("container");
            let body = b.object(vec![("name", container)]);
            let value = b.for_loop("container", Some("j"), source, body);
            b.resource(
                "blob",
                "Microsoft.Storage/storageAccounts/blobServices/containers@2023-01-01",
                value,
            )
        };
        let storage = storage.with_children(vec![blob]);

        let storage_ref = b.reference("storage");
        let storage_in_lock = storage_ref.id;
        let storage_id = b.property(storage_ref, "id");

        let blob_in_both_ref = b.reference("storage::blob");
        let blob_in_both = blob_in_both_ref.id;
        let inner = {
            let source = b.reference("containers");
            let id = b.property(blob_in_both_ref, "id");
            b.for_loop("c", None, source, id)
        };

        let partial_ref = b.reference("storage::blob");
        let blob_partial = partial_ref.id;
        let partial = b.property(partial_ref, "name");

        let indexed_ref = b.reference("storage::blob");
        let blob_indexed = indexed_ref.id;
        let indexed = {
            let zero = b.int(0);
            let access = b.index(indexed_ref, zero);
            b.property(access, "name")
        };

        let lock = {
            let source = b.reference("accounts");
            let body = b.object(vec![
                ("storage", storage_id),
                ("containers", inner),
                ("partial", partial),
                ("first", indexed),
            ]);
            let value = b.for_loop("a", None, source, body);
            b.resource("lock", "Microsoft.Authorization/locks@2020-05-01", value)
        };

        NestedScenario {
            program: BoundProgram::new(vec![accounts, containers, storage, lock]),
            storage_in_lock,
            blob_in_both,
            blob_partial,
            blob_indexed,
        }
    }

    /// ```text
    /// param regions string[]
    /// param deploy bool
    /// module net 'modules/network.keel' = [for region in regions: { location: region }]
    /// resource vault '...' = if (deploy) { name: 'kv' }
    /// var firstNet = net[0].outputs
    /// var allNets = net
    /// var names = [for r in regions: r]
    /// output firstName string = names[0]
    /// output vaultName string = deploy ? vault.name : firstNet
    /// ```
    pub fn module_scenario() -> BoundProgram {
        let mut b = TreeBuilder::new();
        let regions = b.parameter("regions", DeclaredType::array_of(DeclaredType::String), None);
        let deploy = b.parameter("deploy", DeclaredType::Bool, None);

        let net = {
            let source = b.reference("regions");
            let region = b.reference("region");
            let body = b.object(vec![("location", region)]);
            let value = b.for_loop("region", None, source, body);
            b.module("net", "modules/network.keel", value)
        };
        let vault = {
            let guard = b.reference("deploy");
            let name = b.string("kv");
            let body = b.object(vec![("name", name)]);
            let value = b.if_condition(guard, body);
            b.resource("vault", "Microsoft.KeyVault/vaults@2023-02-01", value)
        };
        let first_net = {
            let reference = b.reference("net");
            let zero = b.int(0);
            let access = b.index(reference, zero);
            let outputs = b.property(access, "outputs");
            b.variable("firstNet", outputs)
        };
        let all_nets = {
            let reference = b.reference("net");
            b.variable("allNets", reference)
        };
        let names = {
            let source = b.reference("regions");
            let r = b.reference("r");
            let value = b.for_loop("r", None, source, r);
            b.variable("names", value)
        };
        let first_name = {
            let reference = b.reference("names");
            let zero = b.int(0);
            let access = b.index(reference, zero);
            b.output("firstName", DeclaredType::String, access)
        };
        let vault_name = {
            let condition = b.reference("deploy");
            let vault = b.reference("vault");
            let name = b.property(vault, "name");
            let fallback = b.reference("firstNet");
            let choice = b.ternary(condition, name, fallback);
            b.output("vaultName", DeclaredType::String, choice)
        };

        BoundProgram::new(vec![
            regions, deploy, net, vault, first_net, all_nets, names, first_name, vault_name,
        ])
    }

    /// ```text
    /// param names string[]
    /// resource storage '...' = [for n in names: { name: n }]
    /// output firstId string = storage[0].id
    /// ```
    pub fn small_program() -> BoundProgram {
        let mut b = TreeBuilder::new();
        let names = b.parameter("names", DeclaredType::array_of(DeclaredType::String), None);
        let storage = {
            let source = b.reference("names");
            let n = b.reference("n");
            let body = b.object(vec![("name", n)]);
            let value = b.for_loop("n", None, source, body);
            b.resource("storage", "Microsoft.Storage/storageAccounts@2023-01-01", value)
        };
        let out = {
            let reference = b.reference("storage");
            let zero = b.int(0);
            let access = b.index(reference, zero);
            let id = b.property(access, "id");
            b.output("firstId", DeclaredType::String, id)
        };
        BoundProgram::new(vec![names, storage, out])
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::fixtures::*;
    use super::*;
    use keel_error::Spanned;
    use keel_ir::{IndexContextKind, IndexOutcome, Operation};

    #[test]
    fn test_storage_scenario() {
        let scenario = storage_scenario();
        let result = compile(&scenario.program);

        let missing: Vec<_> = result.diagnostics.with_code(ErrorCode::MISSING_LOOP_INDEX).collect();
        assert_eq!(missing.len(), 1);
        let top_level = result.graph.find(scenario.top_level).unwrap();
        assert_eq!(missing[0].position(), Some(top_level.span()));
        assert_eq!(top_level.index_context().map(|c| c.kind()), Some(IndexContextKind::Unresolved));

        let inside = result.graph.find(scenario.inside_loop).unwrap();
        assert_eq!(inside.index_context().map(|c| c.kind()), Some(IndexContextKind::Implicit));
        assert!(!result
            .diagnostics
            .iter()
            .any(|d| d.position() == Some(inside.span())));
    }

    #[test]
    fn test_nested_scenario() {
        let scenario = nested_scenario();
        let result = compile(&scenario.program);
        let kind_of = |id| {
            result
                .graph
                .find(id)
                .and_then(Operation::index_context)
                .map(|c| c.kind())
        };

        assert_eq!(kind_of(scenario.storage_in_lock), Some(IndexContextKind::Implicit));
        assert_eq!(kind_of(scenario.blob_in_both), Some(IndexContextKind::Implicit));
        assert_eq!(kind_of(scenario.blob_partial), Some(IndexContextKind::Unresolved));
        assert_eq!(kind_of(scenario.blob_indexed), Some(IndexContextKind::Explicit));

        // Matching outer level stays implicit next to the unresolved inner one
        let partial = result.graph.find(scenario.blob_partial).unwrap();
        let levels = &partial.index_context().unwrap().levels;
        assert_eq!(levels.len(), 2);
        assert!(matches!(levels[0].outcome, IndexOutcome::Implicit { .. }));
        assert_eq!(levels[1].outcome, IndexOutcome::Unresolved);

        let missing: Vec<_> = result.diagnostics.with_code(ErrorCode::MISSING_LOOP_INDEX).collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].position(), Some(partial.span()));
    }

    #[test]
    fn test_child_resource_symbol() {
        let scenario = nested_scenario();
        let result = compile(&scenario.program);

        let storage = &result.graph.declarations()[2];
        assert_eq!(storage.children.len(), 1);
        let blob = &storage.children[0].symbol;
        assert_eq!(blob.name, "storage::blob");
        assert_eq!(blob.loops.len(), 2);
        assert_eq!(blob.declared_type.to_string(), "resource 'Microsoft.Storage/storageAccounts/blobServices/containers'[][]");
    }

    #[test]
    fn test_module_scenario() {
        let program = module_scenario();
        let result = compile(&program);

        // Only `allNets` lacks an index
        let missing: Vec<_> = result.diagnostics.with_code(ErrorCode::MISSING_LOOP_INDEX).collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.contains("module `net`"));

        let modules: Vec<_> = result
            .graph
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::ModuleInfo(module) => Some(module),
                _ => None,
            })
            .collect();
        assert_eq!(modules.len(), 2);
        assert!(modules.iter().all(|m| m.metadata.path == "modules/network.keel"));

        // A variable built by a for expression is a plain array
        let names = result
            .graph
            .operations()
            .into_iter()
            .find(|op| matches!(op, Operation::VariableAccess(v) if v.symbol.name == "names"))
            .unwrap();
        assert!(names.index_context().is_none());
    }

    #[test]
    fn test_conditional_declaration_lowered() {
        let program = module_scenario();
        let result = compile(&program);

        let vault = result
            .graph
            .declarations()
            .iter()
            .find(|d| d.symbol.name == "vault")
            .unwrap();
        assert!(vault.symbol.is_conditional());
        match vault.value.as_ref().unwrap() {
            Operation::Conditional(condition) => {
                assert!(condition.if_false.is_none());
                assert_eq!(condition.condition.kind_name(), "parameter");
            }
            other => panic!("expected conditional, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_compile_json() {
        let result = compile_json(
            r#"{
                "declarations": [
                    { "id": 0, "name": "names", "kind": "parameter", "type": { "array": "string" } },
                    { "id": 6, "name": "storage", "kind": "resource",
                      "type": "Microsoft.Storage/storageAccounts@2023-01-01",
                      "value": { "id": 5, "kind": "for", "itemVariable": "n",
                        "source": { "id": 1, "kind": "reference", "name": "names" },
                        "body": { "id": 4, "kind": "object", "properties": [
                          { "key": "name", "value": { "id": 2, "kind": "reference", "name": "n" } }
                        ] } } },
                    { "id": 9, "name": "all", "kind": "output", "type": "any",
                      "value": { "id": 8, "kind": "reference", "name": "storage" } }
                ]
            }"#,
        );

        assert!(!result.success);
        assert_eq!(result.diagnostics.with_code(ErrorCode::MISSING_LOOP_INDEX).count(), 1);
        assert_eq!(result.graph.operation_count(), 5);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use keel_semantic::{DeclaredType, TreeBuilder};

    #[test]
    fn test_unknown_symbol_does_not_stop_other_declarations() {
        let mut b = TreeBuilder::new();
        let ghost = b.reference("ghost");
        let broken = b.variable("broken", ghost);
        let fine_value = b.string("ok");
        let fine = b.variable("fine", fine_value);
        let reference = b.reference("fine");
        let out = b.output("result", DeclaredType::String, reference);

        let result = assert_error_code(&BoundProgram::new(vec![broken, fine, out]), ErrorCode::UNKNOWN_SYMBOL);
        let declarations = result.graph.declarations();
        assert_eq!(declarations.len(), 3);
        assert!(declarations[0].value.is_none());
        assert!(declarations[1].value.is_some());
        assert!(declarations[2].value.is_some());
    }

    #[test]
    fn test_duplicate_declaration_reported_once() {
        let mut b = TreeBuilder::new();
        let one = b.int(1);
        let first = b.variable("count", one);
        let two = b.int(2);
        let second = b.variable("count", two);
        let reference = b.reference("count");
        let out = b.output("total", DeclaredType::Int, reference);

        let result = assert_error_code(&BoundProgram::new(vec![first, second, out]), ErrorCode::DUPLICATE_DECLARATION);
        assert_eq!(result.diagnostics.with_code(ErrorCode::DUPLICATE_DECLARATION).count(), 1);
        // The duplicate is never referenced
        assert_eq!(result.diagnostics.with_code(ErrorCode::UNUSED_DECLARATION).count(), 1);
    }

    #[test]
    fn test_reused_syntax_id_is_reported() {
        let result = compile_json(
            r#"{
                "declarations": [
                    { "id": 1, "name": "a", "kind": "variable",
                      "value": { "id": 5, "kind": "literal", "value": 1 } },
                    { "id": 2, "name": "b", "kind": "variable",
                      "value": { "id": 5, "kind": "literal", "value": 2 } }
                ]
            }"#,
        );
        assert!(!result.success);
        assert_eq!(result.diagnostics.with_code(ErrorCode::DUPLICATE_SYNTAX_ID).count(), 1);
        assert_eq!(result.graph.declarations().len(), 2);

        let rendered = result.diagnostics.render(&keel_error::SourceCache::new());
        assert!(rendered.contains("error[ET001]: syntax id #5 is used by more than one node"));
        assert!(rendered.contains("= note: every node of a bound tree needs its own syntax id"));
    }

    #[test]
    fn test_output_reference_is_error() {
        let mut b = TreeBuilder::new();
        let value = b.string("x");
        let out = b.output("name", DeclaredType::String, value);
        let reference = b.reference("name");
        let copy = b.output("copy", DeclaredType::String, reference);

        assert_error_code(&BoundProgram::new(vec![out, copy]), ErrorCode::OUTPUT_REFERENCE);
    }

    #[test]
    fn test_unused_declarations_are_warnings() {
        let mut b = TreeBuilder::new();
        let unused = b.parameter("unused", DeclaredType::String, None);
        let body = b.object(vec![]);
        let vnet = b.resource("vnet", "Microsoft.Network/virtualNetworks@2023-04-01", body);

        let result = assert_compiles(&BoundProgram::new(vec![unused, vnet]));
        let unused: Vec<_> = result.diagnostics.with_code(ErrorCode::UNUSED_DECLARATION).collect();
        assert_eq!(unused.len(), 2);
    }

    #[test]
    fn test_rendered_diagnostic() {
        let scenario = fixtures::storage_scenario();
        let result = compile(&scenario.program);
        let rendered = result
            .diagnostics
            .with_code(ErrorCode::MISSING_LOOP_INDEX)
            .next()
            .map(|d| keel_error::DiagnosticRenderer::new(&keel_error::SourceCache::new()).without_colors().render(d))
            .unwrap();

        assert!(rendered.starts_with("error[EI001]: resource `storage` is replicated by a copy loop"));
        assert!(rendered.contains("index required for this reference"));
        assert!(rendered.contains("= help: index the reference, for example `storage[0]`"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::fixtures::*;
    use super::*;
    use keel_ir::build;
    use std::collections::HashSet;

    fn programs() -> Vec<BoundProgram> {
        vec![
            storage_scenario().program,
            nested_scenario().program,
            module_scenario(),
            small_program(),
        ]
    }

    #[test]
    fn test_totality() {
        for program in programs() {
            let result = compile(&program);
            assert_eq!(covered_syntax(&result.graph), expression_ids(&program));
        }
    }

    #[test]
    fn test_determinism() {
        for program in programs() {
            let first = compile(&program);
            let second = compile(&program.clone());
            assert_eq!(first.graph, second.graph);
            assert_eq!(first.diagnostics, second.diagnostics);
        }
    }

    #[test]
    fn test_no_context_on_unlooped_symbols() {
        for program in programs() {
            let result = compile(&program);
            for op in result.graph.operations() {
                if let Some(symbol) = op.referenced_symbol() {
                    assert_eq!(op.index_context().is_some(), symbol.is_looped(), "{}", symbol.name);
                }
            }
        }
    }

    #[test]
    fn test_acyclic() {
        for program in programs() {
            let model = SemanticModel::bind(&program);
            let graph = build(&program, &model);

            // The walk terminates after exactly one visit per node
            let walked = graph.operations();
            assert_eq!(walked.len(), graph.operation_count());
            let distinct: HashSet<_> = walked.iter().map(|op| op.syntax()).collect();
            assert_eq!(distinct.len(), walked.len());
        }
    }

    #[test]
    fn test_one_diagnostic_per_unresolved_site() {
        for program in programs() {
            let result = compile(&program);
            let unresolved = result
                .graph
                .operations()
                .into_iter()
                .filter(|op| op.index_context().is_some_and(|c| c.is_unresolved()))
                .count();
            assert_eq!(result.diagnostics.with_code(ErrorCode::MISSING_LOOP_INDEX).count(), unresolved);
        }
    }
}

#[cfg(test)]
mod dump_tests {
    use super::fixtures::small_program;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_graph_dump() {
        let result = assert_compiles(&small_program());
        let expected = "\
parameter names: string[]
  <none>
resource storage: resource 'Microsoft.Storage/storageAccounts'[]
  for n loop#4
    parameter names
    object {name}
      local n of loop#4
output firstId: string
  property .id
    resource storage 'Microsoft.Storage/storageAccounts@2023-01-01' explicit[#8]
      literal 0
";
        assert_eq!(result.graph.to_string(), expected);
    }

    #[test]
    fn test_graph_json() {
        let result = assert_compiles(&small_program());
        let json = serde_json::to_value(&result.graph).unwrap();

        let reference = &json["declarations"][2]["value"]["base"];
        assert_eq!(reference["operation"], "resourceInfo");
        assert_eq!(reference["symbol"], "storage");
        assert_eq!(reference["indexContext"]["levels"][0]["outcome"]["kind"], "explicit");
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::fixtures::*;
    use super::*;
    use keel_ir::build;
    use std::thread;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_types_are_shareable() {
        assert_send_sync::<OperationGraph>();
        assert_send_sync::<SemanticModel>();
        assert_send_sync::<keel_semantic::Symbol>();
    }

    #[test]
    fn test_independent_units_on_threads() {
        let programs = vec![storage_scenario().program, nested_scenario().program, module_scenario()];
        let sequential: Vec<_> = programs.iter().map(|p| compile(p).graph).collect();

        let parallel: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = programs
                .iter()
                .map(|program| scope.spawn(move || compile(program).graph))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_shared_model_read_concurrently() {
        let program = nested_scenario().program;
        let model = SemanticModel::bind(&program);

        let (a, b) = thread::scope(|scope| {
            let first = scope.spawn(|| build(&program, &model));
            let second = scope.spawn(|| build(&program, &model));
            (first.join().unwrap(), second.join().unwrap())
        });
        assert_eq!(a, b);
    }
}
