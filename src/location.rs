//! Source locations.
//!
//! A location is a (file, line, column) triple. Files are identified by a
//! small interned handle rather than a path, so locations stay `Copy` and
//! cheap to carry on every token and IR operand.

use std::fmt;
use std::path::{Path, PathBuf};

/// Handle for a source file known to the current translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// Registry mapping [`FileId`] handles to their paths.
///
/// Append-only for the lifetime of a translation unit: a file pushed twice
/// (e.g. re-included without `#pragma once`) gets a fresh id each time so
/// diagnostics can still distinguish which inclusion produced a token.
#[derive(Debug, Default)]
pub struct FileTable {
    paths: Vec<PathBuf>,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable { paths: Vec::new() }
    }

    pub fn intern(&mut self, path: &Path) -> FileId {
        let id = FileId(self.paths.len() as u32);
        self.paths.push(path.to_path_buf());
        id
    }

    pub fn path(&self, id: FileId) -> &Path {
        &self.paths[id.0 as usize]
    }
}

/// A (file, line, column) triple, attached to every token and diagnostic.
///
/// Lines and columns are 1-indexed, matching the `<file>:<line>:<col>:`
/// diagnostic format from spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        debug_assert!(line >= 1, "source lines are 1-indexed");
        SourceLocation { file, line, column }
    }

    /// Used for synthesized tokens (builtin macros, injected defines) that
    /// have no real position in any file.
    pub fn synthetic(file: FileId) -> Self {
        SourceLocation { file, line: 1, column: 1 }
    }

    pub fn with_line(self, line: u32) -> Self {
        SourceLocation { line, ..self }
    }
}

pub struct DisplayLocation<'a> {
    loc: SourceLocation,
    files: &'a FileTable,
}

impl fmt::Display for DisplayLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.files.path(self.loc.file).display(),
            self.loc.line,
            self.loc.column
        )
    }
}

impl SourceLocation {
    pub fn display<'a>(self, files: &'a FileTable) -> DisplayLocation<'a> {
        DisplayLocation { loc: self, files }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_files_yields_distinct_ids() {
        let mut files = FileTable::new();
        let a = files.intern(Path::new("a.c"));
        let b = files.intern(Path::new("b.h"));
        assert_ne!(a, b);
        assert_eq!(files.path(a), Path::new("a.c"));
        assert_eq!(files.path(b), Path::new("b.h"));
    }

    #[test]
    fn reincluding_a_file_gets_a_fresh_id() {
        let mut files = FileTable::new();
        let first = files.intern(Path::new("b.h"));
        let second = files.intern(Path::new("b.h"));
        assert_ne!(first, second);
    }

    #[test]
    fn display_formats_as_file_line_col() {
        let mut files = FileTable::new();
        let f = files.intern(Path::new("foo.c"));
        let loc = SourceLocation::new(f, 10, 3);
        assert_eq!(format!("{}", loc.display(&files)), "foo.c:10:3");
    }
}
