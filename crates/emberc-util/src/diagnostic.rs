//! Diagnostic collection and rendering.
//!
//! Every phase of the compiler reports problems through a shared [`Handler`]
//! owned by the session. Diagnostics carry a stable short code (`B003`,
//! `P019`, ...), a human message, and a [`Span`]; they are append-only and
//! preserve emission order.
//!
//! # Examples
//!
//! ```
//! use emberc_util::{Handler, Span};
//!
//! let handler = Handler::new();
//! handler.error("P019", "unary operator expects right-hand-side expression", Span::DUMMY);
//!
//! assert!(handler.is_failed());
//! assert_eq!(handler.error_count(), 1);
//! ```

use std::cell::RefCell;
use std::fmt;

use crate::{SourceBuffer, Span};

/// Diagnostic severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// An error that fails the session
    Error,
    /// A warning that does not fail the session
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
        }
    }
}

/// A single diagnostic message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level
    pub level: Level,
    /// Stable short code, e.g. `B021`
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
    /// Source location the diagnostic points at
    pub span: Span,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            level: Level::Error,
            code,
            message: message.into(),
            span,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            level: Level::Warning,
            code,
            message: message.into(),
            span,
        }
    }

    /// Render this diagnostic with a source snippet and a caret pointing at
    /// the offending column.
    ///
    /// ```text
    /// error[B016]: expected token 'semi_colon' but found 'identifier'
    ///   --> demo.em:3:9
    ///    |
    ///  3 | a := 5 + 7
    ///    |         ^
    /// ```
    pub fn render(&self, source: &SourceBuffer) -> String {
        let mut out = format!("{}[{}]: {}\n", self.level, self.code, self.message);
        if self.span == Span::DUMMY {
            return out;
        }
        out.push_str(&format!(
            "  --> {}:{}:{}\n",
            source.path().display(),
            self.span.line,
            self.span.column
        ));
        let line_text = source.line_text(self.span.line);
        let gutter_width = self.span.line.to_string().len().max(2);
        out.push_str(&format!("{:>width$} |\n", "", width = gutter_width));
        out.push_str(&format!(
            "{:>width$} | {}\n",
            self.span.line,
            line_text,
            width = gutter_width
        ));
        let caret_pad = self.span.column.saturating_sub(1) as usize;
        out.push_str(&format!(
            "{:>width$} | {}^\n",
            "",
            " ".repeat(caret_pad),
            width = gutter_width
        ));
        out
    }
}

/// Append-only diagnostic collector.
///
/// Shared by reference between components; interior mutability keeps the
/// borrow story simple while the session threads it everywhere.
pub struct Handler {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Handler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Self {
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    /// Report an error.
    pub fn error(&self, code: &'static str, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::error(code, message, span));
    }

    /// Report a warning.
    pub fn warning(&self, code: &'static str, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::warning(code, message, span));
    }

    /// Append a pre-built diagnostic.
    pub fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// True once any error has been reported.
    pub fn is_failed(&self) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.level == Level::Error)
    }

    /// Number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Error)
            .count()
    }

    /// Snapshot of all diagnostics in emission order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Drop all collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.borrow_mut().clear();
    }
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_display() {
        assert_eq!(format!("{}", Level::Error), "error");
        assert_eq!(format!("{}", Level::Warning), "warning");
    }

    #[test]
    fn test_handler_starts_clean() {
        let handler = Handler::new();
        assert!(!handler.is_failed());
        assert_eq!(handler.error_count(), 0);
    }

    #[test]
    fn test_handler_error_marks_failed() {
        let handler = Handler::new();
        handler.error("B021", "prefix parser for token 'comma' not found.", Span::DUMMY);
        assert!(handler.is_failed());
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_warning_does_not_fail() {
        let handler = Handler::new();
        handler.warning("W001", "unused identifier", Span::DUMMY);
        assert!(!handler.is_failed());
        assert_eq!(handler.error_count(), 0);
        assert_eq!(handler.diagnostics().len(), 1);
    }

    #[test]
    fn test_diagnostics_preserve_order() {
        let handler = Handler::new();
        handler.error("B016", "first", Span::DUMMY);
        handler.error("B021", "second", Span::DUMMY);
        let diags = handler.diagnostics();
        assert_eq!(diags[0].code, "B016");
        assert_eq!(diags[1].code, "B021");
    }

    #[test]
    fn test_render_points_caret_at_column() {
        let source = SourceBuffer::from_string("demo.em", "a := ;\n");
        let span = source.span(5, 6);
        let diag = Diagnostic::error("B021", "prefix parser for token 'semi_colon' not found.", span);
        let rendered = diag.render(&source);
        assert!(rendered.contains("error[B021]"));
        assert!(rendered.contains("demo.em:1:6"));
        assert!(rendered.contains("a := ;"));
        assert!(rendered.lines().last().unwrap().trim_end().ends_with('^'));
    }
}
