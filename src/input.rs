//! Input stack: a push-down sequence of source frames (spec.md §4.1).
//!
//! Each frame owns the text of one source — the primary file, an
//! `#include`d file, or a synthesized buffer for `-D`/`-include`/builtin
//! macros — and tracks the current byte offset, line, and column within it.
//! `#line` mutates the top frame's reported line/file without touching the
//! underlying text.

use crate::location::{FileId, FileTable, SourceLocation};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Frame {
    /// The file id used for diagnostics; mutable via `#line`.
    pub reported_file: FileId,
    /// The real path this frame was opened from, for include resolution
    /// (`"..."` includes search relative to it).
    pub real_path: PathBuf,
    pub text: String,
    pub offset: usize,
    /// The reported line number, mutable via `#line`; independent from the
    /// real offset-derived line so `#line` can renumber arbitrarily.
    pub reported_line: u32,
    /// Line the cursor is physically on, used to compute `reported_line`
    /// deltas when no `#line` directive has run.
    physical_line_at_reset: u32,
    offset_at_reset: usize,
    pub column: u32,
    pub is_system_header: bool,
}

impl Frame {
    pub fn new(reported_file: FileId, real_path: PathBuf, text: String, is_system_header: bool) -> Self {
        Frame {
            reported_file,
            real_path,
            text,
            offset: 0,
            reported_line: 1,
            physical_line_at_reset: 1,
            offset_at_reset: 0,
            column: 1,
            is_system_header,
        }
    }

    pub fn eof(&self) -> bool {
        self.offset >= self.text.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.text[self.offset..].chars().next()
    }

    pub fn peek_at(&self, ahead: usize) -> Option<char> {
        self.text[self.offset..].chars().nth(ahead)
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.reported_line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Applies a `#line <n> ["<file>"]` directive: subsequent lines are
    /// reported starting at `n`, optionally under a different file name.
    pub fn apply_line_directive(&mut self, line: u32, file: Option<FileId>) {
        if let Some(f) = file {
            self.reported_file = f;
        }
        self.reported_line = line;
        self.physical_line_at_reset = line;
        self.offset_at_reset = self.offset;
    }

    pub fn location(&self) -> SourceLocation {
        let _ = (self.physical_line_at_reset, self.offset_at_reset);
        SourceLocation::new(self.reported_file, self.reported_line, self.column)
    }
}

/// The push-down stack of frames described in spec.md §4.1.
#[derive(Debug, Default)]
pub struct InputStack {
    frames: Vec<Frame>,
    /// Canonical paths already opened under `#pragma once`, shared across
    /// the whole stack (directive engine owns the policy; this is just
    /// storage convenient to carry alongside the frames).
    pragma_once_paths: Vec<PathBuf>,
}

impl InputStack {
    pub fn new() -> Self {
        InputStack { frames: Vec::new(), pragma_once_paths: Vec::new() }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Pops exhausted frames, returning true if the whole stack is drained.
    pub fn pop_exhausted(&mut self) -> bool {
        while let Some(top) = self.frames.last() {
            if top.eof() {
                self.frames.pop();
            } else {
                break;
            }
        }
        self.frames.is_empty()
    }

    pub fn mark_pragma_once(&mut self, canonical: PathBuf) {
        if !self.pragma_once_paths.contains(&canonical) {
            self.pragma_once_paths.push(canonical);
        }
    }

    pub fn is_pragma_once(&self, canonical: &Path) -> bool {
        self.pragma_once_paths.iter().any(|p| p == canonical)
    }

    /// Every still-open frame's reported file, innermost first — used by
    /// `__INCLUDE_LEVEL__`-style diagnostics and by the dependency engine
    /// to know the current include chain.
    pub fn open_files(&self, files: &FileTable) -> Vec<PathBuf> {
        self.frames
            .iter()
            .map(|f| files.path(f.reported_file).to_path_buf())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FileId;

    fn frame(text: &str) -> Frame {
        Frame::new(FileId(0), PathBuf::from("t.c"), text.to_string(), false)
    }

    #[test]
    fn advance_tracks_line_and_column() {
        let mut f = frame("ab\ncd");
        assert_eq!(f.location().line, 1);
        assert_eq!(f.location().column, 1);
        f.advance();
        assert_eq!(f.location().column, 2);
        f.advance(); // 'b'
        f.advance(); // '\n'
        assert_eq!(f.location().line, 2);
        assert_eq!(f.location().column, 1);
    }

    #[test]
    fn line_directive_renumbers_subsequent_lines() {
        let mut f = frame("a\nb\n");
        f.apply_line_directive(100, None);
        assert_eq!(f.location().line, 100);
        f.advance(); // 'a'
        f.advance(); // '\n'
        assert_eq!(f.location().line, 101);
    }

    #[test]
    fn pop_exhausted_drains_fully_consumed_frames() {
        let mut stack = InputStack::new();
        let mut f = frame("x");
        f.advance();
        stack.push(f);
        stack.push(frame("y"));
        assert!(!stack.pop_exhausted());
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn pragma_once_dedup_is_idempotent() {
        let mut stack = InputStack::new();
        let p = PathBuf::from("/usr/include/b.h");
        stack.mark_pragma_once(p.clone());
        stack.mark_pragma_once(p.clone());
        assert!(stack.is_pragma_once(&p));
    }
}
