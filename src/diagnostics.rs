//! Diagnostic taxonomy: note/warning/error/fatal, per spec.md §7.
//!
//! A [`DiagnosticSink`] collects diagnostics for a single translation unit,
//! tracks the TU error counter, and latches the abort flag that a fatal
//! diagnostic sets. The parser and preprocessor check `should_abort()` at
//! statement/directive boundaries rather than unwinding through panics.

use crate::location::{FileTable, SourceLocation};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic { severity, location, message: message.into() }
    }

    /// Renders as `<file>:<line>:<col>: <severity>: <message>` (spec.md §7).
    pub fn render(&self, files: &FileTable) -> String {
        format!(
            "{}: {}: {}",
            self.location.display(files),
            self.severity,
            self.message
        )
    }
}

/// Collects diagnostics for one translation unit and tracks whether backend
/// emission should be suppressed.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    error_count: u32,
    abort: bool,
    warnings_suppressed: bool,
}

impl DiagnosticSink {
    pub fn new(warnings_suppressed: bool) -> Self {
        DiagnosticSink {
            diagnostics: Vec::new(),
            error_count: 0,
            abort: false,
            warnings_suppressed,
        }
    }

    pub fn report(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Warning if self.warnings_suppressed => return,
            Severity::Error => self.error_count += 1,
            Severity::Fatal => {
                self.error_count += 1;
                self.abort = true;
            }
            _ => {}
        }
        self.diagnostics.push(diag);
    }

    pub fn note(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(Diagnostic::new(Severity::Note, location, message));
    }

    pub fn warning(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(Diagnostic::new(Severity::Warning, location, message));
    }

    pub fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(Diagnostic::new(Severity::Error, location, message));
    }

    pub fn fatal(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(Diagnostic::new(Severity::Fatal, location, message));
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn should_abort(&self) -> bool {
        self.abort
    }

    /// Per spec.md §7: at TU end, a non-zero error counter suppresses
    /// backend emission.
    pub fn should_emit_backend_output(&self) -> bool {
        self.error_count == 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn render_all(&self, files: &FileTable) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            out.push_str(&diag.render(files));
            out.push('\n');
        }
        if self.abort {
            out.push_str("Aborting because of previous error(s).\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn loc(files: &mut FileTable) -> SourceLocation {
        let f = files.intern(Path::new("t.c"));
        SourceLocation::new(f, 1, 1)
    }

    #[test]
    fn warnings_do_not_increment_error_counter() {
        let mut files = FileTable::new();
        let l = loc(&mut files);
        let mut sink = DiagnosticSink::new(false);
        sink.warning(l, "unused variable");
        assert_eq!(sink.error_count(), 0);
        assert!(sink.should_emit_backend_output());
    }

    #[test]
    fn errors_increment_counter_and_suppress_emission() {
        let mut files = FileTable::new();
        let l = loc(&mut files);
        let mut sink = DiagnosticSink::new(false);
        sink.error(l, "undeclared identifier");
        assert_eq!(sink.error_count(), 1);
        assert!(!sink.should_emit_backend_output());
        assert!(!sink.should_abort());
    }

    #[test]
    fn fatal_sets_abort_flag() {
        let mut files = FileTable::new();
        let l = loc(&mut files);
        let mut sink = DiagnosticSink::new(false);
        sink.fatal(l, "unterminated comment");
        assert!(sink.should_abort());
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn suppressed_warnings_are_dropped_entirely() {
        let mut files = FileTable::new();
        let l = loc(&mut files);
        let mut sink = DiagnosticSink::new(true);
        sink.warning(l, "ignored");
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn render_includes_aborting_footer_only_when_fatal() {
        let mut files = FileTable::new();
        let l = loc(&mut files);
        let mut sink = DiagnosticSink::new(false);
        sink.error(l, "oops");
        assert!(!sink.render_all(&files).contains("Aborting"));
        sink.fatal(l, "boom");
        assert!(sink.render_all(&files).contains("Aborting because of previous error(s)."));
    }
}
