//! keel-error - Diagnostics system for the keel compiler
//!
//! User errors are never thrown: each pass pushes [`Diagnostic`]s into a
//! [`Diagnostics`] collection and keeps going.
//!
//! # Example
//!
//! ```rust
//! use keel_error::{Diagnostic, Diagnostics, ErrorCode, SourceCache, Span};
//!
//! let mut cache = SourceCache::new();
//! cache.add("main.keel", "output id string = storage.id");
//!
//! let mut diagnostics = Diagnostics::new();
//! diagnostics.push(
//!     Diagnostic::error("looped resource `storage` requires an index")
//!         .with_code(ErrorCode::MISSING_LOOP_INDEX)
//!         .with_label(Span::on_line(1, 20, 19, 7), "index required here"),
//! );
//!
//! assert!(diagnostics.has_errors());
//! println!("{}", diagnostics.render(&cache));
//! ```

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticRenderer, ErrorCode, Label, Level, SourceCache, SourceFile};
pub use span::{Position, Span, Spanned};

use serde::Serialize;

/// Ordered collection of diagnostics accumulated during a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Diagnostics carrying the given code, in report order
    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.code == Some(code))
    }

    /// Renders all diagnostics without colors
    pub fn render(&self, cache: &SourceCache) -> String {
        let renderer = DiagnosticRenderer::new(cache).without_colors();
        self.items
            .iter()
            .map(|d| renderer.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(items: Vec<Diagnostic>) -> Self {
        Self { items }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
