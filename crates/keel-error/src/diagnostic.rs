//! Diagnostic - user-facing error records
//!
//! Every diagnostic carries:
//! - Severity level
//! - Error code (ER001, EI001, ...)
//! - The primary location it refers to
//! - Optional notes and fix suggestions

use crate::span::Span;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Blocks emission of the unit
    Error,
    /// Reported, does not block emission
    Warning,
    /// Informational
    Info,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        }
    }

    /// ANSI color used by the renderer
    pub fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",   // Bold Red
            Level::Warning => "\x1b[1;33m", // Bold Yellow
            Level::Info => "\x1b[1;36m",    // Bold Cyan
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A label pointing to a specific region of the declaration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub span: Span,
    pub message: String,
    /// Primary labels mark the diagnostic's position
    pub primary: bool,
}

impl Label {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: true,
        }
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: false,
        }
    }
}

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (T = malformed Tree, R = Reference, I = loop Index, L = Lint)
    pub category: char,
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Malformed input tree
    pub const DUPLICATE_SYNTAX_ID: Self = Self::new('T', 1);

    // Reference errors
    pub const UNKNOWN_SYMBOL: Self = Self::new('R', 1);
    pub const OUTPUT_REFERENCE: Self = Self::new('R', 2);
    pub const DUPLICATE_DECLARATION: Self = Self::new('R', 3);

    // Loop index errors
    pub const MISSING_LOOP_INDEX: Self = Self::new('I', 1);

    // Lint rules
    pub const UNUSED_DECLARATION: Self = Self::new('L', 1);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A complete diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a primary label; the first one becomes the diagnostic's position
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Where the diagnostic points: the span of its first primary label
    pub fn position(&self) -> Option<Span> {
        self.labels.iter().find(|l| l.primary).map(|l| l.span)
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

/// Source text of the compilation units, for rendering snippets
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Returns a line of text (`line` is 1-indexed)
    pub fn get_line(&self, line: u32) -> Option<&str> {
        let line_idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(line_idx)?;
        let end = self
            .line_starts
            .get(line_idx + 1)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(self.source.len());

        self.source.get(start..end)
    }
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file and returns its ID
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> u32 {
        let id = self.files.len() as u32;
        self.files.push(SourceFile::new(name, source));
        id
    }

    pub fn get(&self, id: u32) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }
}

/// Renders diagnostics for terminal output
pub struct DiagnosticRenderer<'a> {
    cache: &'a SourceCache,
    use_colors: bool,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(cache: &'a SourceCache) -> Self {
        Self {
            cache,
            use_colors: true,
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let mut output = String::new();

        let reset = if self.use_colors { "\x1b[0m" } else { "" };
        let color = if self.use_colors {
            diagnostic.level.color_code()
        } else {
            ""
        };
        let blue = if self.use_colors { "\x1b[1;34m" } else { "" };

        // error[EI001]: message
        output.push_str(color);
        output.push_str(diagnostic.level.as_str());
        if let Some(code) = &diagnostic.code {
            output.push_str(&format!("[{}]", code));
        }
        output.push_str(reset);
        output.push_str(": ");
        output.push_str(&diagnostic.message);
        output.push('\n');

        for label in &diagnostic.labels {
            let file = self.cache.get(label.span.file_id);
            let name = file.map(|f| f.name.as_str()).unwrap_or("<unit>");
            output.push_str(&format!(
                " {}-->{} {}:{}:{}\n",
                blue, reset, name, label.span.start.line, label.span.start.column
            ));

            // Without source text there is no snippet to underline
            let Some(line_content) = file.and_then(|f| f.get_line(label.span.start.line)) else {
                output.push_str(&format!("   {}|{} {}\n", blue, reset, label.message));
                continue;
            };

            let line_num = label.span.start.line;
            let padding = " ".repeat(line_num.to_string().len());
            output.push_str(&format!(" {} {}|{}\n", padding, blue, reset));
            output.push_str(&format!(" {}{}{} |{} {}\n", blue, line_num, reset, reset, line_content));

            let col_start = label.span.start.column as usize;
            let underline_len = if label.span.start.line == label.span.end.line {
                label.span.end.column.saturating_sub(label.span.start.column).max(1) as usize
            } else {
                line_content.len().saturating_sub(col_start.saturating_sub(1)).max(1)
            };
            let marker = if label.primary { '^' } else { '-' };
            let label_color = if label.primary { color } else { blue };
            output.push_str(&format!(
                " {} {}|{} {}{}{}{} {}\n",
                padding,
                blue,
                reset,
                " ".repeat(col_start.saturating_sub(1)),
                label_color,
                marker.to_string().repeat(underline_len),
                reset,
                label.message
            ));
        }

        for note in &diagnostic.notes {
            output.push_str(&format!("  = note: {}\n", note));
        }
        for help in &diagnostic.help {
            output.push_str(&format!("  = help: {}\n", help));
        }

        output
    }
}
