//! keel-semantic - Symbol model of the keel compiler
//!
//! Holds what the binder produces for one compilation unit:
//! - The bound syntax tree ([`BoundProgram`])
//! - Symbols with their copy-loop and condition metadata
//! - The [`SymbolModel`] contract consumed by the operation builder
//!
//! # Example
//!
//! ```rust
//! use keel_semantic::{BoundProgram, SemanticModel, SymbolModel, TreeBuilder};
//!
//! let mut b = TreeBuilder::new();
//! let zones = b.reference("zones");
//! let body = b.object(vec![]);
//! let value = b.for_loop("zone", None, zones, body);
//! let ip = b.resource("ip", "Microsoft.Network/publicIPAddresses@2023-04-01", value);
//!
//! let program = BoundProgram::new(vec![ip]);
//! let model = SemanticModel::bind(&program);
//! let symbol = model.lookup("ip", program.declarations[0].id).unwrap();
//! assert!(symbol.is_looped());
//! ```

pub mod model;
pub mod symbols;
pub mod syntax;
pub mod types;

pub use model::{SemanticModel, SymbolModel};
pub use symbols::{
    DeploymentScope, LoopDescriptor, LoopId, LoopLocal, ModuleMetadata, ResourceMetadata,
    ResourceTypeReference, Symbol, SymbolId, SymbolKind,
};
pub use syntax::{
    BinaryOperator, BoundProgram, Declaration, DeclarationKind, Expr, ExprKind, LiteralValue,
    ObjectProperty, SyntaxId, TreeBuilder, UnaryOperator,
};
pub use types::DeclaredType;
