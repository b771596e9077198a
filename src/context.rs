//! Compiler configuration and the per-translation-unit context (spec.md §5,
//! §6).
//!
//! `Config` bundles every CLI-derived option; `TranslationUnit` bundles the
//! namespaces, intern table, type table, and diagnostics that are
//! "process-scoped, reset at TU boundaries" per spec.md §5. `reset`
//! rebuilds all of it from scratch rather than trying to clear fields in
//! place, since nothing needs to survive a TU boundary.

use crate::diagnostics::DiagnosticSink;
use crate::directives::SearchPaths;
use crate::intern::StringInterner;
use crate::ir::{Definition, LabelAllocator};
use crate::location::FileTable;
use crate::symtab::SymbolTable;
use crate::types::{Dialect, TypeTable, WcharWidth};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Preprocess,
    Assembly,
    Object,
    Executable,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepMode {
    None,
    /// `-M`: like `-MM` but also lists system headers.
    All,
    /// `-MM`: user headers only.
    UserOnly,
}

#[derive(Debug, Clone)]
pub struct CodegenFlags {
    pub pic: bool,
    pub common: bool,
    pub sse: bool,
}

impl Default for CodegenFlags {
    fn default() -> Self {
        CodegenFlags { pic: true, common: true, sse: true }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dialect: Dialect,
    pub search: SearchPaths,
    pub defines: Vec<(String, Option<String>)>,
    pub forced_includes: Vec<PathBuf>,
    pub opt_level: u8,
    pub emit_debug: bool,
    pub warnings_suppressed: bool,
    pub verbose: bool,
    pub dep_mode: DepMode,
    pub dep_output: Option<PathBuf>,
    pub dep_target_name: Option<String>,
    pub dep_phony_headers: bool,
    pub wchar_width: WcharWidth,
    pub codegen: CodegenFlags,
    pub output_kind: OutputKind,
    pub output_path: Option<PathBuf>,
    pub enable_trigraphs: bool,
    pub nostdinc: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dialect: Dialect::C99,
            search: SearchPaths::default(),
            defines: Vec::new(),
            forced_includes: Vec::new(),
            opt_level: 0,
            emit_debug: false,
            warnings_suppressed: false,
            verbose: false,
            dep_mode: DepMode::None,
            dep_output: None,
            dep_target_name: None,
            dep_phony_headers: false,
            wchar_width: WcharWidth::Default,
            codegen: CodegenFlags::default(),
            output_kind: OutputKind::Executable,
            output_path: None,
            enable_trigraphs: false,
            nostdinc: false,
        }
    }
}

/// Everything that lives for exactly one translation unit. Constructed
/// fresh per TU by `reset` rather than mutated piecemeal, matching spec.md
/// §5's "explicitly re-initialized by a reset operation before each TU".
pub struct TranslationUnit {
    pub files: FileTable,
    pub interner: StringInterner,
    pub types: TypeTable,
    pub symbols: SymbolTable,
    pub diags: DiagnosticSink,
    pub labels: LabelAllocator,
    pub definitions: Vec<Definition>,
}

impl TranslationUnit {
    pub fn new(config: &Config) -> Self {
        TranslationUnit {
            files: FileTable::new(),
            interner: StringInterner::new(),
            types: TypeTable::new(config.dialect, config.wchar_width),
            symbols: SymbolTable::new(),
            diags: DiagnosticSink::new(config.warnings_suppressed),
            labels: LabelAllocator::new(),
            definitions: Vec::new(),
        }
    }

    pub fn reset(&mut self, config: &Config) {
        *self = TranslationUnit::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_produces_an_empty_fresh_context() {
        let config = Config::default();
        let mut tu = TranslationUnit::new(&config);
        let sym = tu.interner.intern("leftover");
        tu.symbols.ordinary.add(
            sym,
            tu.types.int_ty,
            crate::symtab::SymKind::Auto,
            crate::symtab::Linkage::None,
            crate::symtab::StorageClass::Auto,
            crate::location::SourceLocation::synthetic(crate::location::FileId(0)),
        );
        assert!(!tu.symbols.ordinary.all().is_empty());
        tu.reset(&config);
        assert!(tu.symbols.ordinary.all().is_empty());
        assert!(tu.interner.is_empty());
    }

    #[test]
    fn default_config_targets_c99_and_executable_output() {
        let config = Config::default();
        assert_eq!(config.dialect, Dialect::C99);
        assert_eq!(config.output_kind, OutputKind::Executable);
    }
}
