//! String interning.
//!
//! Identifiers, string literal bodies, and macro names are all interned into
//! a single per-translation-unit table so equality becomes a handle
//! comparison instead of a byte comparison. Handles are stable for the life
//! of the TU; the table is bulk-released at TU reset (spec.md §5).

use std::collections::HashMap;
use std::fmt;

/// A handle into a [`StringInterner`]. Cheap to copy, compares in O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct StringInterner {
    strings: Vec<Box<str>>,
    lookup: HashMap<Box<str>, Symbol>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            strings: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Interns `text`, returning the existing handle if it was already
    /// present.
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.lookup.get(text) {
            return sym;
        }
        let sym = Symbol(self.strings.len() as u32);
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, sym);
        sym
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_text_yields_the_same_handle() {
        let mut table = StringInterner::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_text_yields_distinct_handles() {
        let mut table = StringInterner::new();
        let a = table.intern("foo");
        let b = table.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_round_trips() {
        let mut table = StringInterner::new();
        let sym = table.intern("hello");
        assert_eq!(table.resolve(sym), "hello");
    }
}
