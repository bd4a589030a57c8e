//! Index replacement contexts
//!
//! A reference to a declaration replicated by copy loops has to say which
//! instance it means. [`correlate`] decides this per loop level of the
//! target, outermost first:
//!
//! - A reference that supplies one explicit index per loop addresses the
//!   instance fully: every level is [`IndexOutcome::Explicit`].
//! - Otherwise the longest prefix of levels where the reference site sits in
//!   the same loop (or one iterating a structurally identical source) is
//!   [`IndexOutcome::Implicit`]: the site's own iteration index is reused.
//! - The remaining levels consume the explicit indices in order; a level left
//!   without one is [`IndexOutcome::Unresolved`].

use crate::operation::Operation;
use keel_error::Span;
use keel_semantic::{LoopDescriptor, LoopId, SymbolModel, SyntaxId};
use serde::Serialize;
use std::fmt;

/// Aggregate classification of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexContextKind {
    Implicit,
    Explicit,
    Unresolved,
}

impl fmt::Display for IndexContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexContextKind::Implicit => "implicit",
            IndexContextKind::Explicit => "explicit",
            IndexContextKind::Unresolved => "unresolved",
        };
        write!(f, "{}", s)
    }
}

/// How one loop level of the target is indexed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IndexOutcome {
    /// The iteration index of the enclosing loop `scope_loop`
    Implicit {
        scope_loop: LoopId,
        index_variable: Option<String>,
    },
    /// A user-supplied index; `access` is the bracket expression it came from
    Explicit {
        access: SyntaxId,
        index: Box<Operation>,
    },
    Unresolved,
}

impl IndexOutcome {
    pub fn kind(&self) -> IndexContextKind {
        match self {
            IndexOutcome::Implicit { .. } => IndexContextKind::Implicit,
            IndexOutcome::Explicit { .. } => IndexContextKind::Explicit,
            IndexOutcome::Unresolved => IndexContextKind::Unresolved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexLevel {
    pub target_loop: LoopId,
    pub outcome: IndexOutcome,
}

/// Per-reference index substitution, one level per loop of the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReplacementContext {
    pub levels: Vec<IndexLevel>,
}

/// Value substituted for one loop level
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Substitution<'a> {
    LoopIndex {
        loop_id: LoopId,
        variable: Option<&'a str>,
    },
    Expression(&'a Operation),
}

impl IndexReplacementContext {
    /// Unresolved if any level is, else Explicit if any level is, else Implicit
    pub fn kind(&self) -> IndexContextKind {
        self.levels
            .iter()
            .map(|level| level.outcome.kind())
            .max()
            .unwrap_or(IndexContextKind::Implicit)
    }

    pub fn is_unresolved(&self) -> bool {
        self.kind() == IndexContextKind::Unresolved
    }

    /// First level left without an index
    pub fn first_unresolved(&self) -> Option<&IndexLevel> {
        self.levels
            .iter()
            .find(|level| level.outcome == IndexOutcome::Unresolved)
    }

    /// Substitutions outermost first, `None` when any level is unresolved
    pub fn replacement(&self) -> Option<Vec<Substitution<'_>>> {
        self.levels
            .iter()
            .map(|level| match &level.outcome {
                IndexOutcome::Implicit {
                    scope_loop,
                    index_variable,
                } => Some(Substitution::LoopIndex {
                    loop_id: *scope_loop,
                    variable: index_variable.as_deref(),
                }),
                IndexOutcome::Explicit { index, .. } => Some(Substitution::Expression(index)),
                IndexOutcome::Unresolved => None,
            })
            .collect()
    }

    /// Index operations supplied by the user, outermost level first
    pub fn explicit_indices(&self) -> impl Iterator<Item = &Operation> {
        self.levels.iter().filter_map(|level| match &level.outcome {
            IndexOutcome::Explicit { index, .. } => Some(index.as_ref()),
            _ => None,
        })
    }

    /// Bracket expressions folded into this context
    pub fn explicit_accesses(&self) -> impl Iterator<Item = SyntaxId> + '_ {
        self.levels.iter().filter_map(|level| match &level.outcome {
            IndexOutcome::Explicit { access, .. } => Some(*access),
            _ => None,
        })
    }
}

impl fmt::Display for IndexReplacementContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.kind())?;
        for (i, level) in self.levels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &level.outcome {
                IndexOutcome::Implicit { scope_loop, .. } => write!(f, "{}", scope_loop)?,
                IndexOutcome::Explicit { access, .. } => write!(f, "{}", access)?,
                IndexOutcome::Unresolved => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

/// `[index]` applied directly to a reference, already built
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitIndex {
    pub access: SyntaxId,
    pub span: Span,
    pub index: Operation,
}

/// Correlates a reference site's loop chain with its target's
///
/// `explicit` holds the bracket indices applied to the reference, innermost
/// access first. Returns the context (`None` when the target is not looped)
/// and the explicit indices it did not consume, in their original order.
pub fn correlate<M: SymbolModel + ?Sized>(
    model: &M,
    target: &[LoopDescriptor],
    site: &[LoopDescriptor],
    explicit: Vec<ExplicitIndex>,
) -> (Option<IndexReplacementContext>, Vec<ExplicitIndex>) {
    if target.is_empty() {
        return (None, explicit);
    }

    let scopes = if explicit.len() >= target.len() {
        Vec::new()
    } else {
        implicit_scopes(model, target, site)
    };

    let mut explicit = explicit.into_iter();
    let levels = target
        .iter()
        .enumerate()
        .map(|(depth, loop_)| {
            let outcome = if let Some(scope) = scopes.get(depth) {
                IndexOutcome::Implicit {
                    scope_loop: scope.id,
                    index_variable: scope.index_variable.clone(),
                }
            } else {
                match explicit.next() {
                    Some(ExplicitIndex { access, index, .. }) => IndexOutcome::Explicit {
                        access,
                        index: Box::new(index),
                    },
                    None => IndexOutcome::Unresolved,
                }
            };
            IndexLevel {
                target_loop: loop_.id,
                outcome,
            }
        })
        .collect();

    (Some(IndexReplacementContext { levels }), explicit.collect())
}

/// Site loops supplying the target's leading levels, outermost first
///
/// Target levels must appear in the site chain in order, though the site may
/// add loops of its own around or between them. The longest such prefix is
/// matched, each level taking the innermost site loop that still leaves room
/// for the levels inside it.
fn implicit_scopes<'s, M: SymbolModel + ?Sized>(
    model: &M,
    target: &[LoopDescriptor],
    site: &'s [LoopDescriptor],
) -> Vec<&'s LoopDescriptor> {
    let mut matched = 0;
    let mut floor = 0;
    for loop_ in target {
        match site[floor..].iter().position(|s| model.same_loop(s, loop_)) {
            Some(offset) => {
                matched += 1;
                floor += offset + 1;
            }
            None => break,
        }
    }

    let mut scopes = Vec::with_capacity(matched);
    let mut ceiling = site.len();
    for loop_ in target[..matched].iter().rev() {
        let Some(pos) = site[..ceiling].iter().rposition(|s| model.same_loop(s, loop_)) else {
            return Vec::new();
        };
        scopes.push(&site[pos]);
        ceiling = pos;
    }
    scopes.reverse();
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::LiteralOperation;
    use keel_semantic::{Expr, LiteralValue, SemanticModel, TreeBuilder};

    fn descriptor(b: &mut TreeBuilder, item: &str, source: &str) -> LoopDescriptor {
        let source = b.reference(source);
        let body = b.object(vec![]);
        let for_expr: Expr = b.for_loop(item, Some("idx"), source, body);
        LoopDescriptor::from_for(&for_expr).unwrap()
    }

    fn unbound() -> SemanticModel {
        SemanticModel::default()
    }

    fn explicit(access: u32, value: i64) -> ExplicitIndex {
        ExplicitIndex {
            access: SyntaxId(access),
            span: Span::default(),
            index: Operation::Literal(LiteralOperation {
                syntax: SyntaxId(access + 1000),
                span: Span::default(),
                value: LiteralValue::Int(value),
            }),
        }
    }

    #[test]
    fn test_not_looped_needs_no_context() {
        let (context, rest) = correlate(&unbound(), &[], &[], vec![explicit(1, 0)]);
        assert!(context.is_none());
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_same_loop_is_implicit() {
        let mut b = TreeBuilder::new();
        let accounts = descriptor(&mut b, "a", "names");

        let (context, rest) = correlate(&unbound(), &[accounts.clone()], &[accounts.clone()], vec![]);
        let context = context.unwrap();
        assert_eq!(context.kind(), IndexContextKind::Implicit);
        assert!(rest.is_empty());
        assert_eq!(
            context.replacement(),
            Some(vec![Substitution::LoopIndex {
                loop_id: accounts.id,
                variable: Some("idx"),
            }])
        );
    }

    #[test]
    fn test_structurally_identical_loop_is_implicit() {
        let mut b = TreeBuilder::new();
        let declared = descriptor(&mut b, "a", "names");
        let site = descriptor(&mut b, "n", "names");

        let (context, _) = correlate(&unbound(), &[declared], &[site.clone()], vec![]);
        let context = context.unwrap();
        assert_eq!(context.kind(), IndexContextKind::Implicit);
        assert_eq!(
            context.levels[0].outcome,
            IndexOutcome::Implicit {
                scope_loop: site.id,
                index_variable: Some("idx".to_string()),
            }
        );
    }

    #[test]
    fn test_cross_loop_without_index_is_unresolved() {
        let mut b = TreeBuilder::new();
        let declared = descriptor(&mut b, "a", "names");
        let other = descriptor(&mut b, "z", "zones");

        let (context, _) = correlate(&unbound(), &[declared.clone()], &[other], vec![]);
        let context = context.unwrap();
        assert!(context.is_unresolved());
        assert_eq!(context.replacement(), None);
        assert_eq!(context.first_unresolved().map(|l| l.target_loop), Some(declared.id));
    }

    #[test]
    fn test_explicit_index_consumed() {
        let mut b = TreeBuilder::new();
        let declared = descriptor(&mut b, "a", "names");

        let (context, rest) = correlate(&unbound(), &[declared], &[], vec![explicit(7, 2), explicit(9, 0)]);
        let context = context.unwrap();
        assert_eq!(context.kind(), IndexContextKind::Explicit);
        assert_eq!(context.explicit_accesses().collect::<Vec<_>>(), vec![SyntaxId(7)]);
        // The second bracket indexes into the instance
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].access, SyntaxId(9));
    }

    #[test]
    fn test_nested_levels_aggregate() {
        let mut b = TreeBuilder::new();
        let outer = descriptor(&mut b, "a", "accounts");
        let inner = descriptor(&mut b, "c", "containers");
        let elsewhere = descriptor(&mut b, "q", "queues");

        // Outer level matches, inner does not
        let (context, _) = correlate(&unbound(), &[outer.clone(), inner.clone()], &[outer.clone(), elsewhere.clone()], vec![]);
        let context = context.unwrap();
        assert_eq!(context.levels[0].outcome.kind(), IndexContextKind::Implicit);
        assert_eq!(context.levels[1].outcome.kind(), IndexContextKind::Unresolved);
        assert_eq!(context.kind(), IndexContextKind::Unresolved);
        assert_eq!(context.to_string(), format!("unresolved[{}, ?]", outer.id));

        // Supplying the inner index resolves it
        let (context, _) = correlate(&unbound(), &[outer.clone(), inner.clone()], &[outer.clone(), elsewhere], vec![explicit(3, 1)]);
        let context = context.unwrap();
        assert_eq!(context.kind(), IndexContextKind::Explicit);
        assert_eq!(context.levels[0].outcome.kind(), IndexContextKind::Implicit);

        // A mismatch at the outer level leaves the inner unmatched too
        let (context, _) = correlate(&unbound(), &[outer, inner.clone()], &[inner], vec![]);
        let context = context.unwrap();
        assert!(context
            .levels
            .iter()
            .all(|level| level.outcome == IndexOutcome::Unresolved));
    }

    #[test]
    fn test_fully_addressed_inside_same_loop() {
        let mut b = TreeBuilder::new();
        let declared = descriptor(&mut b, "a", "names");

        let (context, rest) = correlate(&unbound(), &[declared.clone()], &[declared], vec![explicit(4, 0)]);
        assert_eq!(context.unwrap().kind(), IndexContextKind::Explicit);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_site_nested_deeper_than_target() {
        let mut b = TreeBuilder::new();
        let declared = descriptor(&mut b, "a", "names");
        let zones = descriptor(&mut b, "z", "zones");
        let site = descriptor(&mut b, "n", "names");

        let (context, _) = correlate(&unbound(), &[declared.clone()], &[zones.clone(), site.clone()], vec![]);
        let context = context.unwrap();
        assert_eq!(context.kind(), IndexContextKind::Implicit);
        assert_eq!(
            context.levels[0].outcome,
            IndexOutcome::Implicit {
                scope_loop: site.id,
                index_variable: Some("idx".to_string()),
            }
        );

        // A loop between two target levels is skipped too
        let inner = descriptor(&mut b, "c", "containers");
        let (context, _) = correlate(&unbound(), &[declared.clone(), inner.clone()], &[site.clone(), zones, inner.clone()], vec![]);
        let scopes: Vec<_> = context
            .unwrap()
            .levels
            .iter()
            .map(|level| match &level.outcome {
                IndexOutcome::Implicit { scope_loop, .. } => Some(*scope_loop),
                _ => None,
            })
            .collect();
        assert_eq!(scopes, vec![Some(site.id), Some(inner.id)]);
    }

    #[test]
    fn test_nearest_matching_site_loop_wins() {
        let mut b = TreeBuilder::new();
        let declared = descriptor(&mut b, "a", "names");
        let outer = descriptor(&mut b, "x", "names");
        let inner = descriptor(&mut b, "y", "names");

        let (context, _) = correlate(&unbound(), &[declared], &[outer, inner.clone()], vec![]);
        match &context.unwrap().levels[0].outcome {
            IndexOutcome::Implicit { scope_loop, .. } => assert_eq!(*scope_loop, inner.id),
            other => panic!("expected implicit, got {:?}", other),
        }
    }
}
