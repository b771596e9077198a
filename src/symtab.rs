//! Symbol table: three namespaces (ordinary identifiers, labels, tags),
//! each with a scope stack over an append-only master list (spec.md §3
//! "Namespace", §4.5).

use crate::diagnostics::DiagnosticSink;
use crate::intern::Symbol;
use crate::location::SourceLocation;
use crate::types::TypeId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Label,
    Tag,
    Typedef,
    EnumConstant,
    Parameter,
    Auto,
    Static,
    Extern,
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    None,
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    None,
    Auto,
    Register,
    Static,
    Extern,
    Typedef,
}

/// Where the backend has placed this symbol; unset until the backend
/// assigns one. The compiler core never interprets these, only carries
/// them (spec.md §1: backend is an external sink).
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSlot {
    StackOffset(i64),
    Label(String),
    Register(u8),
}

#[derive(Debug, Clone)]
pub struct Sym {
    pub name: Symbol,
    pub ty: TypeId,
    pub kind: SymKind,
    pub linkage: Linkage,
    pub storage: StorageClass,
    pub scope_depth: u32,
    pub backend_slot: Option<BackendSlot>,
    pub defined: bool,
    pub referenced: bool,
    pub inlined: bool,
    /// File-scope object declared without an initializer; promoted to a
    /// zero-initialized definition at TU end unless a real definition
    /// appears first (spec.md §4.5, GLOSSARY "Tentative definition").
    pub tentative: bool,
    pub decl_location: SourceLocation,
}

/// One of the three namespaces. Symbol ids are stable for the life of the
/// namespace: the master list only ever grows, so `lookup` results stay
/// valid across further scope pushes (spec.md §8 invariant: "repeated
/// lookups with no intervening scope changes return the same pointer").
#[derive(Debug, Default)]
pub struct Namespace {
    symbols: Vec<Sym>,
    scopes: Vec<HashMap<Symbol, SymId>>,
    free_temporaries: HashMap<TypeId, Vec<SymId>>,
}

impl Namespace {
    pub fn new() -> Self {
        Namespace { symbols: Vec::new(), scopes: vec![HashMap::new()], free_temporaries: HashMap::new() }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> u32 {
        (self.scopes.len() - 1) as u32
    }

    pub fn lookup(&self, name: Symbol) -> Option<SymId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(&name) {
                return Some(id);
            }
        }
        None
    }

    pub fn lookup_current_scope(&self, name: Symbol) -> Option<SymId> {
        self.scopes.last().and_then(|s| s.get(&name)).copied()
    }

    fn push_symbol(&mut self, sym: Sym) -> SymId {
        let id = SymId(self.symbols.len() as u32);
        self.symbols.push(sym);
        self.scopes.last_mut().unwrap().insert(sym_name(&self.symbols[id.0 as usize]), id);
        id
    }

    /// Plain insertion used by the label and tag namespaces, which have no
    /// tentative-definition merging rule.
    pub fn add(
        &mut self,
        name: Symbol,
        ty: TypeId,
        kind: SymKind,
        linkage: Linkage,
        storage: StorageClass,
        loc: SourceLocation,
    ) -> SymId {
        let depth = self.depth();
        self.push_symbol(Sym {
            name,
            ty,
            kind,
            linkage,
            storage,
            scope_depth: depth,
            backend_slot: None,
            defined: true,
            referenced: false,
            inlined: false,
            tentative: false,
            decl_location: loc,
        })
    }

    /// Ordinary-namespace object declaration, applying the tentative ->
    /// definition merge and redefinition-error rules of spec.md §4.5 / §8
    /// scenario 4.
    pub fn declare_object(
        &mut self,
        name: Symbol,
        ty: TypeId,
        has_initializer: bool,
        storage: StorageClass,
        linkage: Linkage,
        loc: SourceLocation,
        diags: &mut DiagnosticSink,
    ) -> SymId {
        if let Some(existing_id) = self.lookup_current_scope(name) {
            let existing = &mut self.symbols[existing_id.0 as usize];
            match (existing.tentative, existing.defined, has_initializer) {
                (_, true, true) => {
                    diags.error(loc, "redefinition of object with an initializer");
                }
                (true, _, true) => {
                    existing.defined = true;
                    existing.tentative = false;
                }
                _ => {}
            }
            existing.referenced = existing.referenced;
            return existing_id;
        }
        let depth = self.depth();
        self.push_symbol(Sym {
            name,
            ty,
            kind: storage_to_kind(storage),
            linkage,
            storage,
            scope_depth: depth,
            backend_slot: None,
            defined: has_initializer,
            referenced: false,
            inlined: false,
            tentative: !has_initializer && storage != StorageClass::Extern,
            decl_location: loc,
        })
    }

    pub fn get(&self, id: SymId) -> &Sym {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymId) -> &mut Sym {
        &mut self.symbols[id.0 as usize]
    }

    pub fn mark_referenced(&mut self, id: SymId) {
        self.symbols[id.0 as usize].referenced = true;
    }

    /// Every symbol ever declared, in declaration order; used to walk
    /// file scope after parsing (`yield_declaration`).
    pub fn all(&self) -> &[Sym] {
        &self.symbols
    }

    /// Allocates a fresh compiler temporary in the current (function)
    /// scope, reusing a released one of the same type if available
    /// (spec.md §4.5: "released back to a per-function free-list").
    pub fn alloc_temporary(&mut self, ty: TypeId, name_hint: Symbol, loc: SourceLocation) -> SymId {
        if let Some(id) = self.free_temporaries.get_mut(&ty).and_then(|v| v.pop()) {
            return id;
        }
        let depth = self.depth();
        self.push_symbol(Sym {
            name: name_hint,
            ty,
            kind: SymKind::Temporary,
            linkage: Linkage::None,
            storage: StorageClass::None,
            scope_depth: depth,
            backend_slot: None,
            defined: true,
            referenced: false,
            inlined: false,
            tentative: false,
            decl_location: loc,
        })
    }

    pub fn free_temporary(&mut self, id: SymId) {
        let ty = self.symbols[id.0 as usize].ty;
        self.free_temporaries.entry(ty).or_default().push(id);
    }

    /// Walks file scope (depth 0) after parsing, surfacing tentative
    /// definitions and referenced-but-undefined externals for the backend
    /// to resolve or reject (spec.md §4.5).
    pub fn yield_declarations(&self) -> Vec<SymId> {
        (0..self.symbols.len())
            .map(|i| SymId(i as u32))
            .filter(|id| {
                let s = &self.symbols[id.0 as usize];
                s.scope_depth == 0 && (s.tentative || (s.referenced && !s.defined))
            })
            .collect()
    }
}

fn storage_to_kind(storage: StorageClass) -> SymKind {
    match storage {
        StorageClass::Static => SymKind::Static,
        StorageClass::Extern => SymKind::Extern,
        StorageClass::Register | StorageClass::Auto | StorageClass::None => SymKind::Auto,
        StorageClass::Typedef => SymKind::Typedef,
    }
}

fn sym_name(sym: &Sym) -> Symbol {
    sym.name
}

/// Bundles the three C namespaces maintained by this compiler (member
/// namespaces live inside their aggregate's type, per the GLOSSARY).
pub struct SymbolTable {
    pub ordinary: Namespace,
    pub labels: Namespace,
    pub tags: Namespace,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { ordinary: Namespace::new(), labels: Namespace::new(), tags: Namespace::new() }
    }

    pub fn push_function_scope(&mut self) {
        self.ordinary.push_scope();
        self.labels.push_scope();
        self.tags.push_scope();
    }

    pub fn pop_function_scope(&mut self) {
        self.ordinary.pop_scope();
        self.labels.pop_scope();
        self.tags.pop_scope();
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::StringInterner;
    use crate::location::FileId;
    use crate::types::{Dialect, TypeTable, WcharWidth};

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }

    #[test]
    fn lookup_returns_innermost_scoped_symbol_and_is_stable() {
        let mut interner = StringInterner::new();
        let types = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let mut ns = Namespace::new();
        let name = interner.intern("x");
        let outer = ns.add(name, types.int_ty, SymKind::Auto, Linkage::None, StorageClass::Auto, loc());
        ns.push_scope();
        let inner = ns.add(name, types.int_ty, SymKind::Auto, Linkage::None, StorageClass::Auto, loc());
        assert_eq!(ns.lookup(name), Some(inner));
        assert_eq!(ns.lookup(name), Some(inner));
        ns.pop_scope();
        assert_eq!(ns.lookup(name), Some(outer));
    }

    #[test]
    fn tentative_definition_promotes_to_definition() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let types = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let mut ns = Namespace::new();
        let name = interner.intern("a");
        let id1 = ns.declare_object(name, types.int_ty, false, StorageClass::None, Linkage::External, loc(), &mut diags);
        assert!(ns.get(id1).tentative);
        let id2 = ns.declare_object(name, types.int_ty, true, StorageClass::None, Linkage::External, loc(), &mut diags);
        assert_eq!(id1, id2);
        assert!(!ns.get(id2).tentative);
        assert!(ns.get(id2).defined);
        assert_eq!(diags.error_count(), 0);
    }

    #[test]
    fn redefinition_with_two_initializers_is_an_error() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let types = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let mut ns = Namespace::new();
        let name = interner.intern("a");
        ns.declare_object(name, types.int_ty, true, StorageClass::None, Linkage::External, loc(), &mut diags);
        ns.declare_object(name, types.int_ty, true, StorageClass::None, Linkage::External, loc(), &mut diags);
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn temporaries_are_recycled_from_the_free_list() {
        let types = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let mut interner = StringInterner::new();
        let hint = interner.intern("t");
        let mut ns = Namespace::new();
        let t1 = ns.alloc_temporary(types.int_ty, hint, loc());
        ns.free_temporary(t1);
        let t2 = ns.alloc_temporary(types.int_ty, hint, loc());
        assert_eq!(t1, t2);
    }

    #[test]
    fn yield_declarations_surfaces_tentative_file_scope_objects() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let types = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let mut ns = Namespace::new();
        let name = interner.intern("g");
        ns.declare_object(name, types.int_ty, false, StorageClass::None, Linkage::External, loc(), &mut diags);
        let pending = ns.yield_declarations();
        assert_eq!(pending.len(), 1);
    }
}
