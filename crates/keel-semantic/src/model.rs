//! Symbol Model
//!
//! [`SymbolModel`] is the read-only contract the operation builder consumes.
//! [`SemanticModel`] is the binder's implementation of it: one per
//! compilation unit, immutable after [`SemanticModel::bind`].

use crate::symbols::{
    DeploymentScope, LoopDescriptor, LoopId, LoopLocal, ModuleMetadata, ResourceMetadata,
    ResourceTypeReference, Symbol, SymbolId, SymbolKind,
};
use crate::syntax::{BoundProgram, Declaration, DeclarationKind, Expr, ExprKind, SyntaxId};
use crate::types::DeclaredType;
use keel_error::{Diagnostic, Diagnostics, ErrorCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of the symbols of one compilation unit
pub trait SymbolModel {
    /// Resolves `name` as seen from the syntax node `scope`
    fn lookup(&self, name: &str, scope: SyntaxId) -> Option<Arc<Symbol>>;

    /// Symbol introduced by a declaration node
    fn declared_symbol(&self, declaration: SyntaxId) -> Option<Arc<Symbol>>;

    /// Copy loops replicating `symbol`, outermost first
    fn loop_descriptor_of<'a>(&'a self, symbol: &'a Symbol) -> &'a [LoopDescriptor] {
        &symbol.loops
    }

    /// Copy loops lexically enclosing `node`, outermost first
    fn enclosing_loop_scope(&self, node: SyntaxId) -> &[LoopDescriptor];

    /// Nearest copy loop enclosing `node`
    fn innermost_enclosing_loop(&self, node: SyntaxId) -> Option<&LoopDescriptor> {
        self.enclosing_loop_scope(node).last()
    }

    /// Whether two copy loops are the same loop: one `for` node, or sources of
    /// the same shape whose references bind alike
    fn same_loop(&self, a: &LoopDescriptor, b: &LoopDescriptor) -> bool {
        if a.id == b.id {
            return true;
        }
        a.denotes_same_loop(b)
            && a
                .source
                .references()
                .into_iter()
                .zip(b.source.references())
                .all(|(x, y)| same_binding(self, x, y))
    }
}

/// Two same-named references bind alike when they resolve to one symbol, or
/// to the same variable of two loops that are themselves the same loop
fn same_binding<M: SymbolModel + ?Sized>(model: &M, a: &Expr, b: &Expr) -> bool {
    let resolve = |e: &Expr| e.as_reference().and_then(|name| model.lookup(name, e.id));
    match (resolve(a), resolve(b)) {
        (None, None) => true,
        (Some(x), Some(y)) if x.id == y.id => true,
        (Some(x), Some(y)) => match (&x.kind, &y.kind) {
            (
                SymbolKind::Local { loop_id: loop_a, role: role_a },
                SymbolKind::Local { loop_id: loop_b, role: role_b },
            ) if role_a == role_b => {
                let outer_a = model.enclosing_loop_scope(a.id).iter().find(|l| l.id == *loop_a);
                let outer_b = model.enclosing_loop_scope(b.id).iter().find(|l| l.id == *loop_b);
                match (outer_a, outer_b) {
                    (Some(outer_a), Some(outer_b)) => model.same_loop(outer_a, outer_b),
                    _ => false,
                }
            }
            _ => false,
        },
        _ => false,
    }
}

/// Symbols, scopes and loop chains of one bound compilation unit
#[derive(Debug, Default)]
pub struct SemanticModel {
    target_scope: DeploymentScope,
    /// All symbols in declaration order, locals included
    symbols: Vec<Arc<Symbol>>,
    globals: HashMap<String, SymbolId>,
    locals: HashMap<(LoopId, String), SymbolId>,
    declarations: HashMap<SyntaxId, SymbolId>,
    /// Enclosing loop chain of every expression node inside at least one loop
    loop_scopes: HashMap<SyntaxId, Arc<[LoopDescriptor]>>,
    diagnostics: Diagnostics,
}

impl SemanticModel {
    /// Binds a program: declares every symbol, then records loop scopes
    pub fn bind(program: &BoundProgram) -> Self {
        let mut model = Self {
            target_scope: program.target_scope,
            ..Self::default()
        };

        for (id, span) in program.duplicate_ids() {
            model.diagnostics.push(
                Diagnostic::error(format!("syntax id {} is used by more than one node", id))
                    .with_code(ErrorCode::DUPLICATE_SYNTAX_ID)
                    .with_label(span, "reused syntax id")
                    .with_note("every node of a bound tree needs its own syntax id"),
            );
        }

        let root: Arc<[LoopDescriptor]> = Arc::from(Vec::new());
        for decl in &program.declarations {
            model.declare(decl, None, &root);
        }

        tracing::debug!(
            symbols = model.symbols.len(),
            looped_nodes = model.loop_scopes.len(),
            diagnostics = model.diagnostics.len(),
            "bound compilation unit"
        );
        model
    }

    pub fn target_scope(&self) -> DeploymentScope {
        self.target_scope
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Arc<Symbol>> {
        self.symbols.get(id.0 as usize)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Arc<Symbol>> {
        self.symbols.iter()
    }

    /// Binding diagnostics (duplicate declarations, reused syntax ids)
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn next_id(&self) -> SymbolId {
        SymbolId(self.symbols.len() as u32)
    }

    fn declare(&mut self, decl: &Declaration, parent: Option<&Symbol>, parent_chain: &Arc<[LoopDescriptor]>) {
        let name = match parent {
            Some(parent) => format!("{}::{}", parent.name, decl.name),
            None => decl.name.clone(),
        };

        let (own_loop, guarded) = split_value(decl.value.as_ref());
        let replicable = matches!(
            decl.kind,
            DeclarationKind::Resource { .. } | DeclarationKind::Module { .. }
        );

        let mut loops = parent_chain.to_vec();
        let mut condition = None;
        if replicable {
            if let Some(descriptor) = own_loop.and_then(LoopDescriptor::from_for) {
                loops.push(descriptor);
            }
            if let Some(ExprKind::IfCondition { condition: guard, .. }) = guarded.map(|e| &e.kind) {
                condition = Some((**guard).clone());
            }
        }

        let (kind, element_type) = match &decl.kind {
            DeclarationKind::Parameter { ty } => (SymbolKind::Parameter, ty.clone()),
            DeclarationKind::Variable => (SymbolKind::Variable, DeclaredType::Any),
            DeclarationKind::Output { ty } => (SymbolKind::Output, ty.clone()),
            DeclarationKind::Resource { type_reference, scope } => {
                let type_reference = ResourceTypeReference::parse(type_reference);
                let ty = DeclaredType::Resource(type_reference.type_name.clone());
                let metadata = ResourceMetadata {
                    type_reference,
                    scope: scope.unwrap_or(self.target_scope),
                };
                (SymbolKind::Resource(metadata), ty)
            }
            DeclarationKind::Module { path, scope } => {
                let metadata = ModuleMetadata {
                    path: path.clone(),
                    scope: scope.unwrap_or(self.target_scope),
                };
                (SymbolKind::Module(metadata), DeclaredType::Module(path.clone()))
            }
        };
        let declared_type = loops
            .iter()
            .fold(element_type, |ty, _| DeclaredType::array_of(ty));

        let symbol = Arc::new(Symbol {
            id: self.next_id(),
            name: name.clone(),
            kind,
            declared_type,
            loops,
            condition,
            declaration: decl.id,
            span: decl.span,
        });

        if let Some(&existing) = self.globals.get(&name) {
            let first_span = self.symbols[existing.0 as usize].span;
            self.diagnostics.push(
                Diagnostic::error(format!("`{}` is declared more than once", name))
                    .with_code(ErrorCode::DUPLICATE_DECLARATION)
                    .with_label(decl.span, "duplicate declaration")
                    .with_secondary_label(first_span, "first declared here"),
            );
        } else {
            self.globals.insert(name, symbol.id);
        }
        self.declarations.insert(decl.id, symbol.id);
        self.symbols.push(symbol.clone());

        // The declaration's own loop is already part of its symbol's chain,
        // so the value is scoped starting from the parent's chain.
        if let Some(value) = &decl.value {
            self.scope_expr(value, parent_chain);
        }

        let body_chain: Arc<[LoopDescriptor]> = Arc::from(symbol.loops.clone());
        for child in &decl.children {
            self.declare(child, Some(symbol.as_ref()), &body_chain);
        }
    }

    fn scope_expr(&mut self, expr: &Expr, chain: &Arc<[LoopDescriptor]>) {
        if !chain.is_empty() {
            self.loop_scopes.insert(expr.id, chain.clone());
        }

        match &expr.kind {
            ExprKind::For {
                item_variable,
                index_variable,
                source,
                body,
            } => {
                // The source is evaluated outside the loop it drives
                self.scope_expr(source, chain);

                let Some(descriptor) = LoopDescriptor::from_for(expr) else {
                    return;
                };
                self.declare_local(&descriptor, item_variable, LoopLocal::Item, DeclaredType::Any);
                if let Some(index) = index_variable {
                    self.declare_local(&descriptor, index, LoopLocal::Index, DeclaredType::Int);
                }

                let mut inner = chain.to_vec();
                inner.push(descriptor);
                let inner: Arc<[LoopDescriptor]> = Arc::from(inner);
                self.scope_expr(body, &inner);
            }
            _ => {
                for child in expr.children() {
                    self.scope_expr(child, chain);
                }
            }
        }
    }

    fn declare_local(&mut self, descriptor: &LoopDescriptor, name: &str, role: LoopLocal, ty: DeclaredType) {
        let symbol = Arc::new(Symbol {
            id: self.next_id(),
            name: name.to_string(),
            kind: SymbolKind::Local {
                loop_id: descriptor.id,
                role,
            },
            declared_type: ty,
            loops: Vec::new(),
            condition: None,
            declaration: descriptor.id.0,
            span: descriptor.span,
        });
        self.locals.insert((descriptor.id, name.to_string()), symbol.id);
        self.symbols.push(symbol);
    }
}

/// Splits a declaration value into its own copy loop and its guarded body
fn split_value(value: Option<&Expr>) -> (Option<&Expr>, Option<&Expr>) {
    let Some(value) = value else {
        return (None, None);
    };
    match &value.kind {
        ExprKind::For { body, .. } => (Some(value), Some(body)),
        _ => (None, Some(value)),
    }
}

impl SymbolModel for SemanticModel {
    fn lookup(&self, name: &str, scope: SyntaxId) -> Option<Arc<Symbol>> {
        // Loop variables shadow declarations, innermost loop first
        let local = self
            .enclosing_loop_scope(scope)
            .iter()
            .rev()
            .find_map(|l| self.locals.get(&(l.id, name.to_string())));

        local
            .or_else(|| self.globals.get(name))
            .and_then(|id| self.symbol(*id))
            .cloned()
    }

    fn declared_symbol(&self, declaration: SyntaxId) -> Option<Arc<Symbol>> {
        self.declarations
            .get(&declaration)
            .and_then(|id| self.symbol(*id))
            .cloned()
    }

    fn enclosing_loop_scope(&self, node: SyntaxId) -> &[LoopDescriptor] {
        self.loop_scopes.get(&node).map(|chain| &chain[..]).unwrap_or(&[])
    }
}
