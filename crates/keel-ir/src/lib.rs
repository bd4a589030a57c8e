//! keel-ir - Operation graph of the keel compiler
//!
//! The operation graph is the semantic IR downstream passes (template
//! emission, find references, linting) traverse instead of re-deriving
//! symbol and loop information from syntax:
//! - Every reference is resolved to its [`Symbol`](keel_semantic::Symbol)
//! - References to copy-looped declarations carry an
//!   [`IndexReplacementContext`] saying which instance they address
//! - User errors are collected as diagnostics on the graph
//!
//! # Architecture
//!
//! ```text
//! BoundProgram + SymbolModel (keel-semantic)
//!         ↓
//!     [Builder] ── correlate loop indices per reference
//!         ↓
//!   OperationGraph
//!   ├── DeclarationOperation
//!   │   └── Operation tree
//!   └── Diagnostics
//!         ↓
//!   [OperationVisitor] ── verify, find references, lint
//! ```
//!
//! # Example
//!
//! ```rust
//! use keel_ir::{build, IndexContextKind};
//! use keel_semantic::{BoundProgram, DeclaredType, SemanticModel, TreeBuilder};
//!
//! let mut b = TreeBuilder::new();
//! let names = b.reference("names");
//! let body = b.object(vec![]);
//! let value = b.for_loop("n", None, names, body);
//! let names_param = b.parameter("names", DeclaredType::array_of(DeclaredType::String), None);
//! let site = b.resource("site", "Microsoft.Web/sites@2022-09-01", value);
//!
//! let reference = b.reference("site");
//! let zero = b.int(0);
//! let first = b.index(reference, zero);
//! let out = b.output("firstSite", DeclaredType::Any, first);
//!
//! let program = BoundProgram::new(vec![names_param, site, out]);
//! let model = SemanticModel::bind(&program);
//! let graph = build(&program, &model);
//!
//! assert!(graph.diagnostics().is_empty());
//! let value = graph.declarations()[2].value.as_ref().unwrap();
//! assert_eq!(value.index_context().map(|c| c.kind()), Some(IndexContextKind::Explicit));
//! ```

pub mod analysis;
pub mod builder;
pub mod graph;
pub mod index;
pub mod operation;
pub mod verify;
pub mod visitor;

pub use analysis::{find_references, lint, LintOptions, ReferenceFinder, SymbolReference};
pub use builder::{build, build_with_options, BuildOptions, VerifyMode};
pub use graph::{DeclarationOperation, OperationGraph};
pub use index::{
    correlate, ExplicitIndex, IndexContextKind, IndexLevel, IndexOutcome, IndexReplacementContext,
    Substitution,
};
pub use operation::*;
pub use verify::{verify_graph, InvariantViolation};
pub use visitor::{walk_children, walk_operation, OperationVisitor};
