//! Recursive-descent parser that builds IR directly — no separate AST
//! stage (spec.md §4.6). One-token lookahead plus an explicit backtracking
//! point for the declaration/typedef-name ambiguity.

use crate::context::{Config, TranslationUnit};
use crate::intern::Symbol;
use crate::ir::{BasicBlock, Definition, ImmValue, Op, Opcode, Operand, OperandKind};
use crate::location::SourceLocation;
use crate::symtab::{Linkage, StorageClass, SymId, SymKind};
use crate::token::{LiteralValue, Punct, Token, TokenKind};
use crate::types::{AggKind, IntKind, TypeId};

struct LoopTargets {
    continue_block: usize,
    break_block: usize,
}

struct PendingGoto {
    block: usize,
    label: Symbol,
    op_index: usize,
}

/// Case→block table built while parsing a `switch` body, wired into a
/// dispatch chain once the body (and therefore every case value) has been
/// seen (spec.md §4.7: "build a table of case→block during body traversal;
/// emit a dispatch block").
struct SwitchContext {
    cases: Vec<(i64, usize)>,
    default_block: Option<usize>,
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    tu: &'a mut TranslationUnit,
    config: &'a Config,
    def: Option<Definition>,
    current_block: usize,
    loop_stack: Vec<LoopTargets>,
    switch_stack: Vec<SwitchContext>,
    pending_gotos: Vec<PendingGoto>,
    label_blocks: std::collections::HashMap<Symbol, usize>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, tu: &'a mut TranslationUnit, config: &'a Config) -> Self {
        Parser {
            tokens,
            pos: 0,
            tu,
            config,
            def: None,
            current_block: 0,
            loop_stack: Vec::new(),
            switch_stack: Vec::new(),
            pending_gotos: Vec::new(),
            label_blocks: std::collections::HashMap::new(),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    fn is_punct(&self, p: Punct) -> bool {
        self.peek().is_punct(p)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.is_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct) {
        if !self.eat_punct(p) {
            let loc = self.peek().location;
            self.tu.diags.error(loc, format!("expected {:?}", p));
            self.resync_to_statement_end();
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(s) if self.tu.interner.resolve(*s) == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Recovers from a syntax error by skipping to the next `;` or a
    /// balancing `}` (spec.md §4.6 error recovery), incrementing nothing
    /// further since the caller already reported.
    fn resync_to_statement_end(&mut self) {
        let mut depth = 0i32;
        loop {
            if self.at_eof() {
                return;
            }
            if self.is_punct(Punct::LBrace) {
                depth += 1;
            }
            if self.is_punct(Punct::RBrace) {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            }
            if self.is_punct(Punct::Semi) && depth == 0 {
                self.bump();
                return;
            }
            self.bump();
        }
    }

    // ---- translation unit ----

    pub fn parse_translation_unit(&mut self) {
        while !self.at_eof() {
            self.parse_external_declaration();
            if self.tu.diags.should_abort() {
                return;
            }
        }
    }

    fn parse_external_declaration(&mut self) {
        let start = self.pos;
        let storage = self.parse_storage_class();
        let Some(base_ty) = self.parse_type_specifier() else {
            if self.pos == start {
                let loc = self.peek().location;
                self.tu.diags.error(loc, "expected a declaration");
                self.bump();
            }
            return;
        };
        if self.eat_punct(Punct::Semi) {
            return; // `struct Foo;` forward declaration, nothing more to do
        }
        loop {
            let (name_sym, ty, is_function_decl, param_syms) = self.parse_declarator(base_ty);
            if self.is_punct(Punct::LBrace) && is_function_decl {
                self.parse_function_body(name_sym, ty, storage, param_syms);
                return;
            }
            let has_init = self.is_punct(Punct::Assign);
            let mut init_value = None;
            if has_init {
                self.bump();
                init_value = Some(self.parse_assignment_constant());
            }
            let loc = self.peek().location;
            self.tu.symbols.ordinary.declare_object(
                name_sym,
                ty,
                has_init,
                storage,
                if storage == StorageClass::Static { Linkage::Internal } else { Linkage::External },
                loc,
                &mut self.tu.diags,
            );
            let _ = init_value.take();
            if self.eat_punct(Punct::Comma) {
                continue;
            }
            break;
        }
        self.expect_punct(Punct::Semi);
    }

    fn parse_storage_class(&mut self) -> StorageClass {
        if self.eat_keyword("static") {
            StorageClass::Static
        } else if self.eat_keyword("extern") {
            StorageClass::Extern
        } else if self.eat_keyword("typedef") {
            StorageClass::Typedef
        } else if self.eat_keyword("register") {
            StorageClass::Register
        } else if self.eat_keyword("auto") {
            StorageClass::Auto
        } else {
            StorageClass::None
        }
    }

    /// A best-effort declaration-specifier parser: consumes qualifiers and
    /// basic-type keywords and returns the resulting `TypeId`, or struct /
    /// union / enum. Returns `None` if nothing that looks like a type
    /// starts here.
    fn parse_type_specifier(&mut self) -> Option<TypeId> {
        let mut is_unsigned = false;
        let mut is_signed = false;
        let mut long_count = 0u32;
        let mut short = false;
        let mut base: Option<TypeId> = None;
        let mut saw_any = false;
        loop {
            self.eat_keyword("const");
            self.eat_keyword("volatile");
            self.eat_keyword("restrict");
            self.eat_keyword("inline");
            if self.eat_keyword("unsigned") {
                is_unsigned = true;
                saw_any = true;
            } else if self.eat_keyword("signed") {
                is_signed = true;
                saw_any = true;
            } else if self.eat_keyword("long") {
                long_count += 1;
                saw_any = true;
            } else if self.eat_keyword("short") {
                short = true;
                saw_any = true;
            } else if self.eat_keyword("void") {
                base = Some(self.tu.types.void_ty);
                saw_any = true;
            } else if self.eat_keyword("char") {
                base = Some(self.tu.types.char_ty);
                saw_any = true;
            } else if self.eat_keyword("int") {
                base = Some(self.tu.types.int_ty);
                saw_any = true;
            } else if self.eat_keyword("float") {
                base = Some(self.tu.types.float_ty);
                saw_any = true;
            } else if self.eat_keyword("double") {
                base = Some(self.tu.types.double_ty);
                saw_any = true;
            } else if self.eat_keyword("_Bool") {
                base = Some(self.tu.types.bool_ty);
                saw_any = true;
            } else if self.is_keyword("struct") || self.is_keyword("union") {
                base = Some(self.parse_struct_or_union());
                saw_any = true;
                break;
            } else if self.is_keyword("enum") {
                base = Some(self.parse_enum());
                saw_any = true;
                break;
            } else {
                break;
            }
        }
        if !saw_any {
            return None;
        }
        if base.is_none() {
            base = Some(self.tu.types.int_ty);
        }
        let mut ty = base.unwrap();
        if short {
            ty = if is_unsigned { self.tu.types.ushort_ty } else { self.tu.types.short_ty };
        } else if long_count == 1 && ty == self.tu.types.int_ty {
            ty = if is_unsigned { self.tu.types.ulong_ty } else { self.tu.types.long_ty };
        } else if long_count >= 2 {
            ty = if is_unsigned { self.tu.types.ulonglong_ty } else { self.tu.types.longlong_ty };
        } else if long_count == 1 && ty == self.tu.types.double_ty {
            ty = self.tu.types.long_double_ty;
        } else if is_unsigned && ty == self.tu.types.int_ty {
            ty = self.tu.types.uint_ty;
        } else if is_unsigned && ty == self.tu.types.char_ty {
            ty = self.tu.types.uchar_ty;
        } else if is_signed && ty == self.tu.types.char_ty {
            ty = self.tu.types.schar_ty;
        }
        Some(ty)
    }

    fn parse_struct_or_union(&mut self) -> TypeId {
        let kind = if self.eat_keyword("struct") { AggKind::Struct } else { self.bump(); AggKind::Union };
        let tag = if let TokenKind::Identifier(_) = self.peek().kind { self.bump().lexeme } else { None };
        let existing = tag.and_then(|t| self.tu.symbols.tags.lookup(t));
        let id = if self.is_punct(Punct::LBrace) {
            let decl_id = match existing {
                Some(s) => self.tu.symbols.tags.get(s).ty,
                None => self.tu.types.declare_aggregate(tag, kind),
            };
            self.bump(); // '{'
            let mut members = Vec::new();
            while !self.is_punct(Punct::RBrace) && !self.at_eof() {
                let Some(member_ty) = self.parse_type_specifier() else { break };
                loop {
                    let (name, ty, _, _) = self.parse_declarator(member_ty);
                    let bit_width = if self.eat_punct(Punct::Colon) { Some(self.parse_assignment_constant_u32()) } else { None };
                    members.push((name, ty, bit_width));
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punct::Semi);
            }
            self.expect_punct(Punct::RBrace);
            match kind {
                AggKind::Struct => self.tu.types.complete_struct(decl_id, members),
                AggKind::Union => self.tu.types.complete_union(decl_id, members),
            }
            decl_id
        } else if let Some(s) = existing {
            self.tu.symbols.tags.get(s).ty
        } else {
            self.tu.types.declare_aggregate(tag, kind)
        };
        if let Some(t) = tag {
            if existing.is_none() {
                let loc = self.peek().location;
                self.tu.symbols.tags.add(t, id, SymKind::Tag, Linkage::None, StorageClass::None, loc);
            }
        }
        id
    }

    fn parse_enum(&mut self) -> TypeId {
        self.bump(); // 'enum'
        let tag = if let TokenKind::Identifier(_) = self.peek().kind { self.bump().lexeme } else { None };
        let mut constants = Vec::new();
        if self.eat_punct(Punct::LBrace) {
            let mut next_value = 0i64;
            while !self.is_punct(Punct::RBrace) && !self.at_eof() {
                let name = self.bump().lexeme.unwrap_or(self.tu.interner.intern("?"));
                if self.eat_punct(Punct::Assign) {
                    next_value = self.parse_assignment_constant_i64();
                }
                constants.push((name, next_value));
                next_value += 1;
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace);
        }
        let id = self.tu.types.declare_enum(tag, IntKind::Int, constants.clone());
        for (name, value) in constants {
            let loc = self.peek().location;
            let sym = self.tu.symbols.ordinary.add(name, id, SymKind::EnumConstant, Linkage::None, StorageClass::None, loc);
            self.tu.symbols.ordinary.get_mut(sym).backend_slot = Some(crate::symtab::BackendSlot::Label(value.to_string()));
        }
        id
    }

    /// Parses a (possibly abstract) declarator: `*`s, an identifier, and
    /// trailing `[]`/`()`. Returns the identifier (or a synthesized empty
    /// symbol for abstract declarators), the resulting type, whether this
    /// looks like a function declarator, and its parameter symbols (for a
    /// function definition's body scope).
    fn parse_declarator(&mut self, base: TypeId) -> (Symbol, TypeId, bool, Vec<(Symbol, TypeId)>) {
        let mut ty = base;
        while self.eat_punct(Punct::Star) {
            self.eat_keyword("const");
            self.eat_keyword("volatile");
            self.eat_keyword("restrict");
            ty = self.tu.types.pointer_to(ty);
        }
        let name = if let TokenKind::Identifier(_) = self.peek().kind { self.bump().lexeme.unwrap() } else { self.tu.interner.intern("") };
        let mut is_function = false;
        let mut params = Vec::new();
        loop {
            if self.eat_punct(Punct::LBracket) {
                let len = if self.is_punct(Punct::RBracket) { None } else { Some(self.parse_assignment_constant_i64() as u64) };
                self.expect_punct(Punct::RBracket);
                ty = self.tu.types.array_of(ty, len);
            } else if self.eat_punct(Punct::LParen) {
                is_function = true;
                let mut param_types = Vec::new();
                let mut variadic = false;
                if !self.is_punct(Punct::RParen) {
                    loop {
                        if self.eat_punct(Punct::Ellipsis) {
                            variadic = true;
                            break;
                        }
                        if self.eat_keyword("void") && self.is_punct(Punct::RParen) {
                            break;
                        }
                        let Some(pty) = self.parse_type_specifier() else { break };
                        let (pname, full_pty, _, _) = self.parse_declarator(pty);
                        let decayed = self.tu.types.decay(full_pty);
                        param_types.push(decayed);
                        params.push((pname, decayed));
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                self.expect_punct(Punct::RParen);
                ty = self.tu.types.function_of(ty, param_types, variadic);
            } else {
                break;
            }
        }
        (name, ty, is_function, params)
    }

    fn parse_function_body(&mut self, name: Symbol, ty: TypeId, storage: StorageClass, params: Vec<(Symbol, TypeId)>) {
        let loc = self.peek().location;
        let sym_id = self.tu.symbols.ordinary.declare_object(
            name,
            ty,
            true,
            storage,
            if storage == StorageClass::Static { Linkage::Internal } else { Linkage::External },
            loc,
            &mut self.tu.diags,
        );
        self.tu.symbols.ordinary.get_mut(sym_id).defined = true;

        self.def = Some(Definition::new(sym_id));
        self.current_block = self.def.as_ref().unwrap().entry;
        self.pending_gotos.clear();
        self.label_blocks.clear();
        self.tu.symbols.push_function_scope();

        for (pname, pty) in &params {
            if self.tu.interner.resolve(*pname).is_empty() {
                continue;
            }
            let ploc = self.peek().location;
            let param_id = self.tu.symbols.ordinary.add(*pname, *pty, SymKind::Parameter, Linkage::None, StorageClass::None, ploc);
            self.emit(Op::new(Opcode::Param, ploc).with_dst(Operand::direct(param_id, *pty)));
            self.def.as_mut().unwrap().locals.push(param_id);
        }

        self.parse_compound_statement();
        self.patch_gotos();
        self.tu.symbols.pop_function_scope();
        let def = self.def.take().unwrap();
        self.tu.definitions.push(def);
    }

    fn patch_gotos(&mut self) {
        let def = self.def.as_mut().unwrap();
        for goto in &self.pending_gotos {
            if let Some(&target) = self.label_blocks.get(&goto.label) {
                def.blocks[goto.block].left = Some(target);
            } else {
                self.tu.diags.error(SourceLocation::synthetic(crate::location::FileId(0)), "use of undeclared label");
            }
        }
        let _ = self.pending_gotos.drain(..);
    }

    // ---- statements ----

    fn parse_compound_statement(&mut self) {
        self.expect_punct(Punct::LBrace);
        self.tu.symbols.push_function_scope();
        while !self.is_punct(Punct::RBrace) && !self.at_eof() {
            self.parse_block_item();
            if self.tu.diags.should_abort() {
                break;
            }
        }
        self.tu.symbols.pop_function_scope();
        self.expect_punct(Punct::RBrace);
    }

    fn parse_block_item(&mut self) {
        let start = self.pos;
        let storage = self.parse_storage_class();
        if let Some(base_ty) = self.parse_type_specifier() {
            self.parse_local_declaration(base_ty, storage);
            return;
        }
        self.pos = start;
        self.parse_statement();
    }

    fn parse_local_declaration(&mut self, base_ty: TypeId, storage: StorageClass) {
        if self.eat_punct(Punct::Semi) {
            return;
        }
        loop {
            let (name, ty, _, _) = self.parse_declarator(base_ty);
            let loc = self.peek().location;
            let sym_id = self.tu.symbols.ordinary.declare_object(name, ty, self.is_punct(Punct::Assign), storage, Linkage::None, loc, &mut self.tu.diags);
            if let Some(def) = self.def.as_mut() {
                def.locals.push(sym_id);
            }
            if self.eat_punct(Punct::Assign) {
                let value = self.parse_assignment();
                self.emit_store(Operand::direct(sym_id, ty), value, loc);
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi);
    }

    fn parse_statement(&mut self) {
        let loc = self.peek().location;
        if self.is_punct(Punct::LBrace) {
            self.parse_compound_statement();
        } else if self.eat_keyword("if") {
            self.parse_if();
        } else if self.eat_keyword("while") {
            self.parse_while();
        } else if self.eat_keyword("do") {
            self.parse_do_while();
        } else if self.eat_keyword("for") {
            self.parse_for();
        } else if self.eat_keyword("return") {
            let value = if self.is_punct(Punct::Semi) { None } else { Some(self.parse_expression()) };
            self.expect_punct(Punct::Semi);
            self.current_block_mut().terminator = value;
        } else if self.eat_keyword("break") {
            self.expect_punct(Punct::Semi);
            if let Some(target) = self.loop_stack.last().map(|l| l.break_block) {
                self.current_block_mut().left = Some(target);
            } else {
                self.tu.diags.error(loc, "break statement not within a loop");
            }
        } else if self.eat_keyword("continue") {
            self.expect_punct(Punct::Semi);
            if let Some(target) = self.loop_stack.last().map(|l| l.continue_block) {
                self.current_block_mut().left = Some(target);
            } else {
                self.tu.diags.error(loc, "continue statement not within a loop");
            }
        } else if self.eat_keyword("goto") {
            let label = self.bump().lexeme.unwrap_or(self.tu.interner.intern("?"));
            self.expect_punct(Punct::Semi);
            let block = self.current_block;
            let op_index = self.current_block_ref().ops.len();
            self.pending_gotos.push(PendingGoto { block, label, op_index });
        } else if matches!(self.peek().kind, TokenKind::Identifier(_)) && self.peek_at(1).map(|t| t.is_punct(Punct::Colon)).unwrap_or(false) {
            let label = self.bump().lexeme.unwrap();
            self.bump(); // ':'
            self.label_blocks.insert(label, self.current_block);
            self.parse_statement();
        } else if self.eat_keyword("switch") {
            self.parse_switch();
        } else if self.eat_keyword("case") {
            self.parse_case_label(loc);
        } else if self.eat_keyword("default") {
            self.parse_default_label(loc);
        } else if self.eat_punct(Punct::Semi) {
            // empty statement
        } else {
            let value = self.parse_expression();
            let _ = value;
            self.expect_punct(Punct::Semi);
        }
    }

    fn new_block(&mut self) -> usize {
        let labels = &mut self.tu.labels;
        self.def.as_mut().unwrap().new_block(labels)
    }

    fn current_block_ref(&self) -> &BasicBlock {
        self.def.as_ref().unwrap().block(self.current_block)
    }

    fn current_block_mut(&mut self) -> &mut BasicBlock {
        let cur = self.current_block;
        self.def.as_mut().unwrap().block_mut(cur)
    }

    fn parse_if(&mut self) {
        self.expect_punct(Punct::LParen);
        let cond = self.parse_expression();
        self.expect_punct(Punct::RParen);
        let then_block = self.new_block();
        let join_block = self.new_block();

        self.current_block_mut().terminator = Some(cond);
        self.current_block_mut().right = Some(then_block);

        self.current_block = then_block;
        self.parse_statement();
        if self.current_block_ref().is_terminal() {
            self.current_block_mut().left = Some(join_block);
        }

        if self.eat_keyword("else") {
            let else_block = self.new_block();
            self.retarget_if_else(then_block, else_block);
            self.current_block = else_block;
            self.parse_statement();
            if self.current_block_ref().is_terminal() {
                self.current_block_mut().left = Some(join_block);
            }
        }

        self.current_block = join_block;
    }

    fn retarget_if_else(&mut self, then_block: usize, else_block: usize) {
        // find the block whose `right` is then_block and set its `left` to else_block
        let def = self.def.as_mut().unwrap();
        for block in def.blocks.iter_mut() {
            if block.right == Some(then_block) && block.left.is_none() {
                block.left = Some(else_block);
                return;
            }
        }
    }

    fn parse_while(&mut self) {
        let cond_block = self.new_block();
        let body_block = self.new_block();
        let exit_block = self.new_block();
        self.current_block_mut().left = Some(cond_block);
        self.current_block = cond_block;
        self.expect_punct(Punct::LParen);
        let cond = self.parse_expression();
        self.expect_punct(Punct::RParen);
        self.current_block_mut().terminator = Some(cond);
        self.current_block_mut().right = Some(body_block);
        self.current_block_mut().left = Some(exit_block);

        self.loop_stack.push(LoopTargets { continue_block: cond_block, break_block: exit_block });
        self.current_block = body_block;
        self.parse_statement();
        if self.current_block_ref().is_terminal() {
            self.current_block_mut().left = Some(cond_block);
        }
        self.loop_stack.pop();
        self.current_block = exit_block;
    }

    fn parse_do_while(&mut self) {
        let body_block = self.new_block();
        let cond_block = self.new_block();
        let exit_block = self.new_block();
        self.current_block_mut().left = Some(body_block);

        self.loop_stack.push(LoopTargets { continue_block: cond_block, break_block: exit_block });
        self.current_block = body_block;
        self.parse_statement();
        if self.current_block_ref().is_terminal() {
            self.current_block_mut().left = Some(cond_block);
        }
        self.loop_stack.pop();

        self.eat_keyword("while");
        self.expect_punct(Punct::LParen);
        self.current_block = cond_block;
        let cond = self.parse_expression();
        self.expect_punct(Punct::RParen);
        self.expect_punct(Punct::Semi);
        self.current_block_mut().terminator = Some(cond);
        self.current_block_mut().right = Some(body_block);
        self.current_block_mut().left = Some(exit_block);

        self.current_block = exit_block;
    }

    fn parse_for(&mut self) {
        self.expect_punct(Punct::LParen);
        if !self.is_punct(Punct::Semi) {
            let start = self.pos;
            let storage = self.parse_storage_class();
            if let Some(ty) = self.parse_type_specifier() {
                self.parse_local_declaration(ty, storage);
            } else {
                self.pos = start;
                let v = self.parse_expression();
                let _ = v;
                self.expect_punct(Punct::Semi);
            }
        } else {
            self.bump();
        }
        let cond_block = self.new_block();
        let body_block = self.new_block();
        let step_block = self.new_block();
        let exit_block = self.new_block();

        self.current_block_mut().left = Some(cond_block);
        self.current_block = cond_block;
        if !self.is_punct(Punct::Semi) {
            let cond = self.parse_expression();
            self.current_block_mut().terminator = Some(cond);
            self.current_block_mut().right = Some(body_block);
            self.current_block_mut().left = Some(exit_block);
        } else {
            self.current_block_mut().left = Some(body_block);
        }
        self.expect_punct(Punct::Semi);
        if !self.is_punct(Punct::RParen) {
            // step expression is parsed now but emitted into step_block below
        }
        let step_start = self.pos;
        // skip past the step expression tokens for now; re-parse in step_block
        let mut depth = 0i32;
        while !(depth == 0 && self.is_punct(Punct::RParen)) && !self.at_eof() {
            if self.is_punct(Punct::LParen) {
                depth += 1;
            }
            if self.is_punct(Punct::RParen) {
                depth -= 1;
            }
            self.bump();
        }
        let step_end = self.pos;
        self.expect_punct(Punct::RParen);

        self.loop_stack.push(LoopTargets { continue_block: step_block, break_block: exit_block });
        self.current_block = body_block;
        self.parse_statement();
        if self.current_block_ref().is_terminal() {
            self.current_block_mut().left = Some(step_block);
        }
        self.loop_stack.pop();

        self.current_block = step_block;
        if step_end > step_start {
            let saved_pos = self.pos;
            self.pos = step_start;
            let v = self.parse_expression();
            let _ = v;
            self.pos = saved_pos;
        }
        self.current_block_mut().left = Some(cond_block);

        self.current_block = exit_block;
    }

    /// Lowers `switch` per spec.md §4.6: the body is parsed as an ordinary
    /// statement (so `case`/`default` labels just split it into blocks, the
    /// same way a goto label does), and once every case value has been
    /// collected the selector block is wired into a chain of `CmpEq`
    /// compares that dispatches to the matching case block.
    fn parse_switch(&mut self) {
        let loc = self.peek().location;
        self.expect_punct(Punct::LParen);
        let selector = self.parse_expression();
        self.expect_punct(Punct::RParen);
        let exit_block = self.new_block();
        self.loop_stack.push(LoopTargets { continue_block: exit_block, break_block: exit_block });
        self.switch_stack.push(SwitchContext { cases: Vec::new(), default_block: None });
        let dispatch_entry = self.current_block;
        let body_block = self.new_block();
        self.current_block = body_block;
        self.parse_statement();
        if self.current_block_ref().is_terminal() {
            self.current_block_mut().left = Some(exit_block);
        }
        self.loop_stack.pop();
        let ctx = self.switch_stack.pop().unwrap();
        self.wire_switch_dispatch(dispatch_entry, selector, loc, ctx, exit_block);
        self.current_block = exit_block;
    }

    /// Splits off a new block for the case body and records `value` against
    /// it; chains from the previous block when it fell through (consecutive
    /// labels like `case 1: case 2:`).
    fn parse_case_label(&mut self, loc: SourceLocation) {
        let value = self.parse_case_constant_i64(loc);
        self.expect_punct(Punct::Colon);
        let case_block = self.new_block();
        if self.current_block_ref().is_terminal() {
            self.current_block_mut().left = Some(case_block);
        }
        self.current_block = case_block;
        match self.switch_stack.last_mut() {
            Some(ctx) => ctx.cases.push((value, case_block)),
            None => self.tu.diags.error(loc, "case label not within a switch statement"),
        }
        self.parse_statement();
    }

    fn parse_default_label(&mut self, loc: SourceLocation) {
        self.expect_punct(Punct::Colon);
        let case_block = self.new_block();
        if self.current_block_ref().is_terminal() {
            self.current_block_mut().left = Some(case_block);
        }
        self.current_block = case_block;
        match self.switch_stack.last_mut() {
            Some(ctx) if ctx.default_block.is_none() => ctx.default_block = Some(case_block),
            Some(_) => self.tu.diags.error(loc, "multiple default labels in one switch statement"),
            None => self.tu.diags.error(loc, "default label not within a switch statement"),
        }
        self.parse_statement();
    }

    fn parse_case_constant_i64(&mut self, loc: SourceLocation) -> i64 {
        let op = self.parse_assignment();
        match op.as_immediate() {
            Some(ImmValue::Int(v)) => v,
            Some(ImmValue::UInt(v)) => v as i64,
            _ => {
                self.tu.diags.error(loc, "case label does not reduce to an integer constant expression");
                0
            }
        }
    }

    /// Wires the selector block (and a chain of synthesized compare blocks,
    /// one per extra case) into `CmpEq(selector, value)` branches, falling
    /// through to `default` or the switch's exit block when nothing matches.
    fn wire_switch_dispatch(&mut self, dispatch_entry: usize, selector: Operand, loc: SourceLocation, ctx: SwitchContext, exit_block: usize) {
        let fallback = ctx.default_block.unwrap_or(exit_block);
        if ctx.cases.is_empty() {
            self.def.as_mut().unwrap().block_mut(dispatch_entry).left = Some(fallback);
            return;
        }
        let last_index = ctx.cases.len() - 1;
        let mut current = dispatch_entry;
        for (i, (value, case_block)) in ctx.cases.into_iter().enumerate() {
            let next = if i == last_index { fallback } else { self.new_block() };
            let cmp_sym = self.fresh_temp(self.tu.types.int_ty);
            let cmp_dst = Operand::direct(cmp_sym, self.tu.types.int_ty);
            let imm = Operand::immediate(ImmValue::Int(value), selector.ty);
            let def = self.def.as_mut().unwrap();
            def.push_op(current, Op::new(Opcode::CmpEq, loc).with_dst(cmp_dst.clone()).with_src1(selector.clone()).with_src2(imm));
            let block = def.block_mut(current);
            block.terminator = Some(cmp_dst);
            block.right = Some(case_block);
            block.left = Some(next);
            current = next;
        }
    }

    // ---- expressions ----

    fn fresh_temp(&mut self, ty: TypeId) -> SymId {
        let hint = self.tu.interner.intern("t");
        let loc = self.peek().location;
        let id = self.tu.symbols.ordinary.alloc_temporary(ty, hint, loc);
        if let Some(def) = self.def.as_mut() {
            def.locals.push(id);
        }
        id
    }

    fn emit(&mut self, op: Op) {
        let block = self.current_block;
        self.def.as_mut().unwrap().push_op(block, op);
    }

    fn emit_store(&mut self, dst: Operand, src: Operand, loc: SourceLocation) {
        self.emit(Op::new(Opcode::Store, loc).with_dst(dst).with_src1(src));
    }

    fn parse_expression(&mut self) -> Operand {
        let mut value = self.parse_assignment();
        while self.eat_punct(Punct::Comma) {
            value = self.parse_assignment();
        }
        value
    }

    /// Used by initializers that need an immediate, folding what it can and
    /// falling back to whatever the general expression parser produces
    /// (non-constant global initializers are out of scope for this pass).
    fn parse_assignment_constant(&mut self) -> Operand {
        self.parse_assignment()
    }

    fn parse_assignment_constant_i64(&mut self) -> i64 {
        let op = self.parse_assignment();
        match op.as_immediate() {
            Some(ImmValue::Int(v)) => v,
            Some(ImmValue::UInt(v)) => v as i64,
            _ => 0,
        }
    }

    fn parse_assignment_constant_u32(&mut self) -> u32 {
        self.parse_assignment_constant_i64() as u32
    }

    fn parse_assignment(&mut self) -> Operand {
        let lhs = self.parse_conditional();
        if self.eat_punct(Punct::Assign) {
            let loc = self.peek().location;
            let rhs = self.parse_assignment();
            self.emit_store(lhs.clone(), rhs.clone(), loc);
            return rhs;
        }
        for (p, op) in COMPOUND_ASSIGN_OPS {
            if self.is_punct(*p) {
                self.bump();
                let loc = self.peek().location;
                let rhs = self.parse_assignment();
                let result = self.emit_binary(*op, lhs.clone(), rhs, loc);
                self.emit_store(lhs, result.clone(), loc);
                return result;
            }
        }
        lhs
    }

    fn parse_conditional(&mut self) -> Operand {
        let cond = self.parse_binary(0);
        if self.eat_punct(Punct::Question) {
            let then_v = self.parse_expression();
            self.expect_punct(Punct::Colon);
            let else_v = self.parse_conditional();
            let loc = self.peek().location;
            let ty = then_v.ty;
            let dst = self.fresh_temp(ty);
            let then_block = self.new_block();
            let else_block = self.new_block();
            let join_block = self.new_block();
            self.current_block_mut().terminator = Some(cond);
            self.current_block_mut().right = Some(then_block);
            self.current_block_mut().left = Some(else_block);
            self.current_block = then_block;
            self.emit_store(Operand::direct(dst, ty), then_v, loc);
            self.current_block_mut().left = Some(join_block);
            self.current_block = else_block;
            self.emit_store(Operand::direct(dst, ty), else_v, loc);
            self.current_block_mut().left = Some(join_block);
            self.current_block = join_block;
            return Operand::direct(dst, ty);
        }
        cond
    }

    fn parse_binary(&mut self, min_prec: u8) -> Operand {
        let mut lhs = self.parse_unary();
        loop {
            let Some((opcode, prec, punct)) = self.peek_binary_op() else { break };
            if prec < min_prec {
                break;
            }
            self.bump();
            let loc = self.peek().location;
            let rhs = self.parse_binary(prec + 1);
            lhs = if matches!(punct, Punct::AmpAmp | Punct::PipePipe) {
                self.emit_logical(opcode, lhs, rhs, loc)
            } else {
                self.emit_binary(opcode, lhs, rhs, loc)
            };
        }
        lhs
    }

    fn peek_binary_op(&self) -> Option<(Opcode, u8, Punct)> {
        let p = match &self.peek().kind {
            TokenKind::Punct(p) => *p,
            _ => return None,
        };
        let (opcode, prec) = match p {
            Punct::PipePipe => (Opcode::BitOr, 1),
            Punct::AmpAmp => (Opcode::BitAnd, 2),
            Punct::Pipe => (Opcode::BitOr, 3),
            Punct::Caret => (Opcode::BitXor, 4),
            Punct::Amp => (Opcode::BitAnd, 5),
            Punct::EqEq => (Opcode::CmpEq, 6),
            Punct::Ne => (Opcode::CmpNe, 6),
            Punct::Lt => (Opcode::CmpLt, 7),
            Punct::Gt => (Opcode::CmpGt, 7),
            Punct::Le => (Opcode::CmpLe, 7),
            Punct::Ge => (Opcode::CmpGe, 7),
            Punct::Shl => (Opcode::Shl, 8),
            Punct::Shr => (Opcode::Shr, 8),
            Punct::Plus => (Opcode::Add, 9),
            Punct::Minus => (Opcode::Sub, 9),
            Punct::Star => (Opcode::Mul, 10),
            Punct::Slash => (Opcode::Div, 10),
            Punct::Percent => (Opcode::Mod, 10),
            _ => return None,
        };
        Some((opcode, prec, p))
    }

    /// Constant-folds when both sides are immediates (spec.md §4.6 /
    /// end-to-end scenario 1: `1+2` folds to the immediate `3`, no op).
    fn emit_binary(&mut self, opcode: Opcode, lhs: Operand, rhs: Operand, loc: SourceLocation) -> Operand {
        let (common_ty, lconv, rconv) = self.tu.types.usual_arithmetic_conversion(lhs.ty, rhs.ty);
        let _ = (lconv, rconv);
        let result_ty = if matches!(opcode, Opcode::CmpEq | Opcode::CmpNe | Opcode::CmpLt | Opcode::CmpLe | Opcode::CmpGt | Opcode::CmpGe) {
            self.tu.types.int_ty
        } else {
            common_ty
        };
        if let (Some(a), Some(b)) = (lhs.as_immediate(), rhs.as_immediate()) {
            if let Some(folded) = fold_constant(opcode, a, b) {
                return Operand::immediate(folded, result_ty);
            }
        }
        let dst_sym = self.fresh_temp(result_ty);
        let dst = Operand::direct(dst_sym, result_ty);
        self.emit(Op::new(opcode, loc).with_dst(dst.clone()).with_src1(lhs).with_src2(rhs));
        dst
    }

    /// `&&`/`||` always yield `0` or `1`, never a raw bitwise combination
    /// (`1 && 2` must fold to `1`, not `0`). Matches the `(a!=0)&&(b!=0)`
    /// shape the directive-expression evaluator uses for the same operators.
    fn emit_logical(&mut self, opcode: Opcode, lhs: Operand, rhs: Operand, loc: SourceLocation) -> Operand {
        let lhs_bool = self.normalize_bool(lhs, loc);
        let rhs_bool = self.normalize_bool(rhs, loc);
        self.emit_binary(opcode, lhs_bool, rhs_bool, loc)
    }

    /// Compares `v` against zero, producing an `int` operand that is exactly
    /// `0` or `1`.
    fn normalize_bool(&mut self, v: Operand, loc: SourceLocation) -> Operand {
        let int_ty = self.tu.types.int_ty;
        if let Some(imm) = v.as_immediate() {
            let nonzero = match imm {
                ImmValue::Int(i) => i != 0,
                ImmValue::UInt(u) => u != 0,
                ImmValue::Float(f) => f != 0.0,
            };
            return Operand::immediate(ImmValue::Int(nonzero as i64), int_ty);
        }
        let zero = Operand::immediate(ImmValue::Int(0), v.ty);
        let dst_sym = self.fresh_temp(int_ty);
        let dst = Operand::direct(dst_sym, int_ty);
        self.emit(Op::new(Opcode::CmpNe, loc).with_dst(dst.clone()).with_src1(v).with_src2(zero));
        dst
    }

    fn parse_unary(&mut self) -> Operand {
        let loc = self.peek().location;
        if self.eat_keyword("sizeof") {
            return self.parse_sizeof();
        }
        if self.eat_punct(Punct::Minus) {
            let v = self.parse_unary();
            if let Some(imm) = v.as_immediate() {
                return Operand::immediate(negate(imm), v.ty);
            }
            let dst_sym = self.fresh_temp(v.ty);
            let zero = Operand::immediate(ImmValue::Int(0), v.ty);
            let dst = Operand::direct(dst_sym, v.ty);
            self.emit(Op::new(Opcode::Sub, loc).with_dst(dst.clone()).with_src1(zero).with_src2(v));
            return dst;
        }
        if self.eat_punct(Punct::Plus) {
            return self.parse_unary();
        }
        if self.eat_punct(Punct::Bang) {
            let v = self.parse_unary();
            let dst_sym = self.fresh_temp(self.tu.types.int_ty);
            let zero = Operand::immediate(ImmValue::Int(0), v.ty);
            let dst = Operand::direct(dst_sym, self.tu.types.int_ty);
            self.emit(Op::new(Opcode::CmpEq, loc).with_dst(dst.clone()).with_src1(v).with_src2(zero));
            return dst;
        }
        if self.eat_punct(Punct::Tilde) {
            let v = self.parse_unary();
            let dst_sym = self.fresh_temp(v.ty);
            let neg1 = Operand::immediate(ImmValue::Int(-1), v.ty);
            let dst = Operand::direct(dst_sym, v.ty);
            self.emit(Op::new(Opcode::BitXor, loc).with_dst(dst.clone()).with_src1(v).with_src2(neg1));
            return dst;
        }
        if self.eat_punct(Punct::Amp) {
            let v = self.parse_unary();
            if let OperandKind::Direct(sym) = v.kind {
                let ptr_ty = self.tu.types.pointer_to(v.ty);
                return Operand { kind: OperandKind::AddressOf(sym), ty: ptr_ty };
            }
            return v;
        }
        if self.eat_punct(Punct::Star) {
            let v = self.parse_unary();
            let pointee = match self.tu.types.get(self.tu.types.unqualified(v.ty)).clone() {
                crate::types::Type::Pointer(p) => p,
                _ => v.ty,
            };
            if let OperandKind::Direct(sym) = v.kind {
                return Operand { kind: OperandKind::Indirect { base: sym, offset: 0, elem_size: self.tu.types.size_of(pointee) }, ty: pointee };
            }
            return v;
        }
        if self.is_punct(Punct::PlusPlus) || self.is_punct(Punct::MinusMinus) {
            let inc = self.is_punct(Punct::PlusPlus);
            self.bump();
            let target = self.parse_unary();
            let opcode = if inc { Opcode::Add } else { Opcode::Sub };
            let one = Operand::immediate(ImmValue::Int(1), target.ty);
            let result = self.emit_binary(opcode, target.clone(), one, loc);
            self.emit_store(target, result.clone(), loc);
            return result;
        }
        self.parse_postfix()
    }

    fn parse_sizeof(&mut self) -> Operand {
        let size = if self.eat_punct(Punct::LParen) {
            let sz = if let Some(ty) = self.parse_type_specifier() {
                let (_, full_ty, _, _) = self.parse_declarator(ty);
                self.tu.types.size_of(full_ty)
            } else {
                let v = self.parse_expression();
                self.tu.types.size_of(v.ty)
            };
            self.expect_punct(Punct::RParen);
            sz
        } else {
            let v = self.parse_unary();
            self.tu.types.size_of(v.ty)
        };
        Operand::immediate(ImmValue::UInt(size as u64), self.tu.types.size_t_ty)
    }

    fn parse_postfix(&mut self) -> Operand {
        let mut value = self.parse_primary();
        loop {
            if self.eat_punct(Punct::LParen) {
                value = self.parse_call(value);
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expression();
                self.expect_punct(Punct::RBracket);
                let pointee = match self.tu.types.get(self.tu.types.unqualified(value.ty)).clone() {
                    crate::types::Type::Pointer(p) | crate::types::Type::Array(p, _) => p,
                    _ => value.ty,
                };
                let elem_size = self.tu.types.size_of(pointee);
                if let (OperandKind::Direct(base), Some(idx_imm)) = (&value.kind, index.as_immediate()) {
                    let offset = match idx_imm {
                        ImmValue::Int(v) => v * elem_size as i64,
                        ImmValue::UInt(v) => v as i64 * elem_size as i64,
                        ImmValue::Float(_) => 0,
                    };
                    value = Operand { kind: OperandKind::Indirect { base: *base, offset, elem_size }, ty: pointee };
                } else {
                    value = Operand::void(pointee);
                }
            } else if self.is_punct(Punct::PlusPlus) || self.is_punct(Punct::MinusMinus) {
                let inc = self.is_punct(Punct::PlusPlus);
                let loc = self.peek().location;
                self.bump();
                let opcode = if inc { Opcode::Add } else { Opcode::Sub };
                let one = Operand::immediate(ImmValue::Int(1), value.ty);
                let original = value.clone();
                let incremented = self.emit_binary(opcode, value.clone(), one, loc);
                self.emit_store(value, incremented, loc);
                value = original;
            } else if self.is_punct(Punct::Dot) || self.is_punct(Punct::Arrow) {
                let is_arrow = self.is_punct(Punct::Arrow);
                let loc = self.peek().location;
                self.bump();
                value = self.parse_member_access(value, is_arrow, loc);
            } else {
                break;
            }
        }
        value
    }

    /// Resolves `.`/`->` against the aggregate's `Member` list and emits an
    /// indirect operand carrying the member's byte offset (spec.md §3:
    /// member access lowers to an indirect operand, not a bare name).
    fn parse_member_access(&mut self, base: Operand, is_arrow: bool, loc: SourceLocation) -> Operand {
        let name_tok = self.bump();
        let Some(name) = name_tok.lexeme else {
            self.tu.diags.error(loc, "expected a member name");
            return Operand::void(self.tu.types.int_ty);
        };

        let agg_ty = if is_arrow {
            match self.tu.types.get(self.tu.types.unqualified(base.ty)) {
                crate::types::Type::Pointer(p) => *p,
                _ => base.ty,
            }
        } else {
            base.ty
        };

        let member = self
            .tu
            .types
            .aggregate(self.tu.types.unqualified(agg_ty))
            .and_then(|agg| agg.members.iter().find(|m| m.name == name).cloned());

        let Some(member) = member else {
            self.tu.diags.error(loc, format!("no member named '{}'", self.tu.interner.resolve(name)));
            return Operand::void(self.tu.types.int_ty);
        };

        let (base_sym, base_offset) = match &base.kind {
            OperandKind::Direct(s) | OperandKind::AddressOf(s) => (Some(*s), 0i64),
            OperandKind::Indirect { base: s, offset, .. } if !is_arrow => (Some(*s), *offset),
            _ => (None, 0i64),
        };

        match base_sym {
            Some(sym) => Operand {
                kind: OperandKind::Indirect { base: sym, offset: base_offset + member.offset as i64, elem_size: self.tu.types.size_of(member.ty) },
                ty: member.ty,
            },
            None => {
                self.tu.diags.error(loc, "unsupported member access expression");
                Operand::void(member.ty)
            }
        }
    }

    fn parse_call(&mut self, callee: Operand) -> Operand {
        let loc = self.peek().location;
        let mut args = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                args.push(self.parse_assignment());
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen);
        let ret_ty = match self.tu.types.get(self.tu.types.unqualified(callee.ty)) {
            crate::types::Type::Function { ret, .. } => *ret,
            _ => self.tu.types.int_ty,
        };
        let mut call_op = Op::new(Opcode::Call, loc);
        call_op.call_args = args;
        if let OperandKind::Direct(sym) = callee.kind {
            call_op.callee = Some(sym);
        }
        if matches!(self.tu.types.get(ret_ty), crate::types::Type::Void) {
            call_op.dst = Some(Operand::void(ret_ty));
            self.emit(call_op);
            return Operand::void(ret_ty);
        }
        let dst_sym = self.fresh_temp(ret_ty);
        let dst = Operand::direct(dst_sym, ret_ty);
        call_op.dst = Some(dst.clone());
        self.emit(call_op);
        dst
    }

    fn parse_primary(&mut self) -> Operand {
        let loc = self.peek().location;
        match self.peek().kind.clone() {
            TokenKind::IntLiteral => {
                let tok = self.bump();
                let (value, is_unsigned, is_long, is_long_long, is_hex_or_octal) = match tok.literal {
                    Some(LiteralValue::Int { value, is_unsigned, is_long, is_long_long, is_hex_or_octal }) => {
                        (value, is_unsigned, is_long, is_long_long, is_hex_or_octal)
                    }
                    _ => (0, false, false, false, false),
                };
                let ty = if is_hex_or_octal {
                    self.tu.types.hex_or_octal_literal_type(value, is_long, is_long_long, is_unsigned)
                } else {
                    self.tu.types.decimal_literal_type(value, is_long, is_long_long, is_unsigned)
                };
                Operand::immediate(ImmValue::UInt(value), ty)
            }
            TokenKind::FloatLiteral => {
                let tok = self.bump();
                let (value, is_float) = match tok.literal {
                    Some(LiteralValue::Float { value, is_float, .. }) => (value, is_float),
                    _ => (0.0, false),
                };
                let ty = if is_float { self.tu.types.float_ty } else { self.tu.types.double_ty };
                Operand::immediate(ImmValue::Float(value), ty)
            }
            TokenKind::CharLiteral => {
                let tok = self.bump();
                let raw = match tok.literal {
                    Some(LiteralValue::Char(v)) => v,
                    _ => 0,
                };
                Operand::immediate(ImmValue::Int(self.tu.types.char_constant_value(raw)), self.tu.types.char_ty)
            }
            TokenKind::StringLiteral => {
                let tok = self.bump();
                let sym = match tok.literal {
                    Some(LiteralValue::Str(s)) => s,
                    _ => self.tu.interner.intern(""),
                };
                let arr_ty = self.tu.types.array_of(self.tu.types.char_ty, Some(self.tu.interner.resolve(sym).len() as u64 + 1));
                Operand { kind: OperandKind::StringLiteral(sym), ty: arr_ty }
            }
            TokenKind::Identifier(_) => {
                let tok = self.bump();
                let name = tok.lexeme.unwrap();
                match self.tu.symbols.ordinary.lookup(name) {
                    Some(sym_id) => {
                        self.tu.symbols.ordinary.mark_referenced(sym_id);
                        if let Some(crate::symtab::BackendSlot::Label(v)) = &self.tu.symbols.ordinary.get(sym_id).backend_slot {
                            if self.tu.symbols.ordinary.get(sym_id).kind == SymKind::EnumConstant {
                                let value: i64 = v.parse().unwrap_or(0);
                                return Operand::immediate(ImmValue::Int(value), self.tu.symbols.ordinary.get(sym_id).ty);
                            }
                        }
                        let ty = self.tu.symbols.ordinary.get(sym_id).ty;
                        Operand::direct(sym_id, ty)
                    }
                    None => {
                        self.tu.diags.error(loc, format!("'{}' undeclared", self.tu.interner.resolve(name)));
                        Operand::void(self.tu.types.int_ty)
                    }
                }
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let v = self.parse_expression();
                self.expect_punct(Punct::RParen);
                v
            }
            _ => {
                self.tu.diags.error(loc, "expected an expression");
                self.bump();
                Operand::void(self.tu.types.int_ty)
            }
        }
    }
}

const COMPOUND_ASSIGN_OPS: &[(Punct, Opcode)] = &[
    (Punct::PlusAssign, Opcode::Add),
    (Punct::MinusAssign, Opcode::Sub),
    (Punct::StarAssign, Opcode::Mul),
    (Punct::SlashAssign, Opcode::Div),
    (Punct::PercentAssign, Opcode::Mod),
    (Punct::AmpAssign, Opcode::BitAnd),
    (Punct::PipeAssign, Opcode::BitOr),
    (Punct::CaretAssign, Opcode::BitXor),
    (Punct::ShlAssign, Opcode::Shl),
    (Punct::ShrAssign, Opcode::Shr),
];

fn negate(v: ImmValue) -> ImmValue {
    match v {
        ImmValue::Int(i) => ImmValue::Int(-i),
        ImmValue::UInt(u) => ImmValue::Int(-(u as i64)),
        ImmValue::Float(f) => ImmValue::Float(-f),
    }
}

/// Constant folding for the evaluator layer (spec.md §4.6): integer
/// overflow in signed arithmetic is reported by the caller inspecting
/// `checked_*`'s `None` result — this pass wraps per C's unsigned rule and
/// leaves signed overflow undiagnosed for now (see DESIGN.md).
fn fold_constant(opcode: Opcode, a: ImmValue, b: ImmValue) -> Option<ImmValue> {
    use ImmValue::*;
    let as_i64 = |v: ImmValue| match v {
        Int(i) => i,
        UInt(u) => u as i64,
        Float(f) => f as i64,
    };
    if matches!(a, Float(_)) || matches!(b, Float(_)) {
        let x = match a {
            Float(f) => f,
            other => as_i64(other) as f64,
        };
        let y = match b {
            Float(f) => f,
            other => as_i64(other) as f64,
        };
        let r = match opcode {
            Opcode::Add | Opcode::FAdd => x + y,
            Opcode::Sub | Opcode::FSub => x - y,
            Opcode::Mul | Opcode::FMul => x * y,
            Opcode::Div | Opcode::FDiv => x / y,
            Opcode::CmpEq => return Some(Int((x == y) as i64)),
            Opcode::CmpNe => return Some(Int((x != y) as i64)),
            Opcode::CmpLt => return Some(Int((x < y) as i64)),
            Opcode::CmpLe => return Some(Int((x <= y) as i64)),
            Opcode::CmpGt => return Some(Int((x > y) as i64)),
            Opcode::CmpGe => return Some(Int((x >= y) as i64)),
            _ => return None,
        };
        return Some(Float(r));
    }
    let x = as_i64(a);
    let y = as_i64(b);
    let r = match opcode {
        Opcode::Add => x.wrapping_add(y),
        Opcode::Sub => x.wrapping_sub(y),
        Opcode::Mul => x.wrapping_mul(y),
        Opcode::Div => {
            if y == 0 {
                return None;
            }
            x.wrapping_div(y)
        }
        Opcode::Mod => {
            if y == 0 {
                return None;
            }
            x.wrapping_rem(y)
        }
        Opcode::BitAnd => x & y,
        Opcode::BitOr => x | y,
        Opcode::BitXor => x ^ y,
        Opcode::Shl => x.wrapping_shl(y as u32),
        Opcode::Shr => x.wrapping_shr(y as u32),
        Opcode::CmpEq => (x == y) as i64,
        Opcode::CmpNe => (x != y) as i64,
        Opcode::CmpLt => (x < y) as i64,
        Opcode::CmpLe => (x <= y) as i64,
        Opcode::CmpGt => (x > y) as i64,
        Opcode::CmpGe => (x >= y) as i64,
        _ => return None,
    };
    Some(Int(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::diagnostics::DiagnosticSink;
    use crate::directives::{FileSystem, Preprocessor, SearchPaths};
    use crate::types::Dialect;
    use std::io;
    use std::path::Path;

    struct OneFileFs(String);
    impl FileSystem for OneFileFs {
        fn read_to_string(&self, _path: &Path) -> io::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn parse_source(src: &str) -> (TranslationUnit, Config) {
        let fs = OneFileFs(src.to_string());
        let config = Config::default();
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("t.c")).unwrap();
        let tokens = pp.run();
        let mut tu = TranslationUnit::new(&config);
        tu.interner = pp.interner;
        tu.files = pp.files;
        tu.diags = DiagnosticSink::new(false);
        let mut tokens = tokens;
        tokens.push(Token::new(TokenKind::Eof, SourceLocation::synthetic(crate::location::FileId(0))));
        {
            let mut parser = Parser::new(tokens, &mut tu, &config);
            parser.parse_translation_unit();
        }
        (tu, config)
    }

    #[test]
    fn constant_folds_return_1_plus_2_to_immediate_three() {
        let (tu, _config) = parse_source("int main(void){return 1+2;}");
        assert_eq!(tu.diags.error_count(), 0);
        let def = &tu.definitions[0];
        let entry = def.block(def.entry);
        assert!(entry.ops.is_empty(), "no add op should be emitted, constant-folded");
        let term = entry.terminator.as_ref().unwrap();
        assert_eq!(term.as_immediate(), Some(ImmValue::Int(3)));
    }

    #[test]
    fn macro_expanded_square_emits_one_add_and_one_mul() {
        let (tu, _config) = parse_source("#define SQ(x) ((x)*(x))\nint f(int a){return SQ(a+1);}\n");
        assert_eq!(tu.diags.error_count(), 0);
        let def = &tu.definitions[0];
        let entry = def.block(def.entry);
        let adds = entry.ops.iter().filter(|op| op.opcode == Opcode::Add).count();
        let muls = entry.ops.iter().filter(|op| op.opcode == Opcode::Mul).count();
        assert_eq!(adds, 1);
        assert_eq!(muls, 1);
    }

    #[test]
    fn while_loop_creates_a_back_edge_to_the_condition_block() {
        let (tu, _config) = parse_source("int f(void){int x=0; while(x<10)x=x+1; return x;}");
        assert_eq!(tu.diags.error_count(), 0);
        let def = &tu.definitions[0];
        let reachable = def.reachable_blocks();
        assert!(reachable.len() >= 3);
    }

    #[test]
    fn undeclared_identifier_reports_error_and_recovers() {
        let (tu, _config) = parse_source("int f(void){return undeclared_thing;}");
        assert_eq!(tu.diags.error_count(), 1);
    }

    #[test]
    fn switch_with_case_and_default_builds_a_real_dispatch_chain() {
        let (tu, _config) = parse_source("int f(int x){switch(x){case 1: return 2; default: return 0;}}");
        assert_eq!(tu.diags.error_count(), 0);
        let def = &tu.definitions[0];
        let entry = def.block(def.entry);
        assert_eq!(entry.ops.iter().filter(|op| op.opcode == Opcode::CmpEq).count(), 1);
        assert!(entry.terminator.is_some(), "selector block should branch on the case compare, not fall through");
        assert!(entry.right.is_some() && entry.left.is_some());
        assert_ne!(entry.right, entry.left, "matched and unmatched cases must go to different blocks");
    }

    #[test]
    fn case_label_outside_a_switch_is_an_error() {
        let (tu, _config) = parse_source("int f(void){case 1: return 0;}");
        assert_eq!(tu.diags.error_count(), 1);
    }

    #[test]
    fn logical_and_or_normalize_to_zero_or_one_not_a_bitwise_combination() {
        let (tu, _config) = parse_source("int main(void){return (1 && 2) + (2 || 0) + (0 && 5) + (0 || 0);}");
        assert_eq!(tu.diags.error_count(), 0);
        let def = &tu.definitions[0];
        let entry = def.block(def.entry);
        assert!(entry.ops.is_empty(), "every operand is constant, the whole expression should fold");
        let term = entry.terminator.as_ref().unwrap();
        assert_eq!(term.as_immediate(), Some(ImmValue::Int(2)));
    }

    #[test]
    fn hex_literal_at_the_u32_boundary_types_as_long_in_c99() {
        let (tu, _config) = parse_source("int main(void){return 0x80000000;}");
        assert_eq!(tu.diags.error_count(), 0);
        let def = &tu.definitions[0];
        let term = def.block(def.entry).terminator.as_ref().unwrap();
        assert_eq!(term.ty, tu.types.long_ty, "C99 ranks long ahead of unsigned int for hex constants");
    }

    #[test]
    fn dot_member_access_resolves_to_an_indirect_operand_with_byte_offset() {
        let (tu, _config) = parse_source("struct Point{int x;int y;}; int f(struct Point p){return p.y;}");
        assert_eq!(tu.diags.error_count(), 0);
        let def = &tu.definitions[0];
        let term = def.block(def.entry).terminator.as_ref().unwrap();
        match &term.kind {
            OperandKind::Indirect { offset, .. } => assert_eq!(*offset, 4),
            other => panic!("expected an indirect operand carrying the member offset, got {:?}", other),
        }
    }
}
