//! Preprocessor directive engine (spec.md §4.3).
//!
//! Consumes start-of-line `#` tokens and drives the input stack and macro
//! table. `#include` resolution follows spec.md exactly: `"..."` form
//! searches the including file's directory first, then the configured
//! search path in order; `<...>` form searches only the configured path.
//! `#pragma once` de-duplicates a file across further includes by canonical
//! path. A condition stack tracks each `#if` region with the tri-state
//! {taken, skipping-until-elif, done} described in spec.md §4.3.

use crate::diagnostics::DiagnosticSink;
use crate::input::{Frame, InputStack};
use crate::intern::{StringInterner, Symbol};
use crate::lexer::Lexer;
use crate::location::{FileId, FileTable, SourceLocation};
use crate::macros::{Expander, MacroKind, MacroTable, RepElem};
use crate::token::{LiteralValue, Punct, Token, TokenKind};
use crate::types::Dialect;
use std::io;
use std::path::{Path, PathBuf};

/// Abstraction over file reads so the directive engine is testable without
/// touching disk.
pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

pub struct RealFs;

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

#[derive(Debug, Default, Clone)]
pub struct SearchPaths {
    pub quote_dirs: Vec<PathBuf>,
    pub system_dirs: Vec<PathBuf>,
}

struct CondFrame {
    /// Whether any branch of this `#if`..`#endif` chain has been taken yet.
    any_taken: bool,
    /// Whether the current branch (as of the last `#if`/`#elif`/`#else`) is
    /// being emitted.
    active: bool,
    /// Whether the *enclosing* context allows emission at all; once false,
    /// every branch in this chain stays inactive regardless of its
    /// condition (spec.md §4.3: "While skipping, tokens are discarded but
    /// directives are still parsed so that nested conditionals balance").
    parent_allows: bool,
    /// True once an `#else` has been seen, so a second `#else` or any
    /// further `#elif` is an error.
    saw_else: bool,
}

pub struct Preprocessor<'fs> {
    pub files: FileTable,
    pub stack: InputStack,
    pub interner: StringInterner,
    pub macros: MacroTable,
    pub diags: DiagnosticSink,
    pub search: SearchPaths,
    pub dependencies: Vec<PathBuf>,
    pub dialect: Dialect,
    fs: &'fs dyn FileSystem,
    cond_stack: Vec<CondFrame>,
    at_line_start: bool,
    enable_trigraphs: bool,
}

impl<'fs> Preprocessor<'fs> {
    pub fn new(dialect: Dialect, search: SearchPaths, fs: &'fs dyn FileSystem) -> Self {
        let mut pp = Preprocessor {
            files: FileTable::new(),
            stack: InputStack::new(),
            interner: StringInterner::new(),
            macros: MacroTable::new(),
            diags: DiagnosticSink::new(false),
            search,
            dependencies: Vec::new(),
            dialect,
            fs,
            cond_stack: Vec::new(),
            at_line_start: true,
            enable_trigraphs: false,
        };
        pp.define_builtins();
        pp
    }

    fn define_builtins(&mut self) {
        let loc = SourceLocation::synthetic(FileId(0));
        let define_obj = |pp: &mut Self, name: &str, text: &str| {
            let sym = pp.interner.intern(name);
            let lexeme = pp.interner.intern(text);
            let tok = Token::new(TokenKind::IntLiteral, loc)
                .with_lexeme(lexeme)
                .with_literal(LiteralValue::Int { value: text.parse().unwrap_or(0), is_unsigned: false, is_long: false, is_long_long: false, is_hex_or_octal: false });
            pp.macros.define(sym, MacroKind::ObjectLike, vec![RepElem::Tok(tok.clone())], vec![tok], loc, &mut pp.diags);
        };
        define_obj(self, "__STDC__", "1");
        let version = match self.dialect {
            Dialect::C89 => None,
            Dialect::C99 => Some("199901L"),
            Dialect::C11 => Some("201112L"),
        };
        if let Some(v) = version {
            define_obj(self, "__STDC_VERSION__", v);
        }
    }

    pub fn push_main_file(&mut self, path: &Path) -> Result<(), String> {
        let text = self.fs.read_to_string(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
        let id = self.files.intern(path);
        self.dependencies.push(path.to_path_buf());
        self.stack.push(Frame::new(id, path.to_path_buf(), text, false));
        Ok(())
    }

    fn is_emitting(&self) -> bool {
        self.cond_stack.iter().all(|f| f.active)
    }

    /// Reads the next token straight from the lexer, popping exhausted
    /// frames (returning to the includer) as needed. Returns `Eof` only
    /// once the whole stack is drained.
    fn raw_token(&mut self) -> Token {
        loop {
            if self.stack.is_empty() {
                return Token::new(TokenKind::Eof, SourceLocation::synthetic(FileId(0)));
            }
            let mut lexer = Lexer::new(&mut self.stack, &mut self.interner, &mut self.diags, self.enable_trigraphs, &mut self.at_line_start);
            let tok = lexer.next_token();
            if tok.is_eof() {
                self.stack.pop();
                self.at_line_start = true;
                continue;
            }
            return tok;
        }
    }

    /// Reads raw (unexpanded) tokens until (and consuming) the terminating
    /// newline or end of input — one directive's argument tokens.
    fn collect_line(&mut self) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let tok = self.raw_token();
            match tok.kind {
                TokenKind::Newline | TokenKind::Eof => break,
                _ => out.push(tok),
            }
        }
        out
    }

    /// Runs the whole translation unit to completion, returning the
    /// macro-expanded token stream (spec.md §4.3: "drives ... emits a clean
    /// token stream").
    pub fn run(&mut self) -> Vec<Token> {
        let mut raw_clean = Vec::new();
        loop {
            let tok = self.raw_token();
            if tok.is_eof() {
                break;
            }
            if let TokenKind::Newline = tok.kind {
                continue;
            }
            if tok.starts_line && tok.is_punct(Punct::Hash) {
                self.handle_directive(tok.location);
                continue;
            }
            if !self.is_emitting() {
                continue;
            }
            if let Some(builtin) = self.expand_builtin_identifier(&tok) {
                raw_clean.push(builtin);
            } else {
                raw_clean.push(tok);
            }
        }
        if !self.cond_stack.is_empty() {
            self.diags.error(SourceLocation::synthetic(FileId(0)), "unterminated #if");
        }
        let mut expander = Expander { macros: &self.macros, interner: &mut self.interner, diags: &mut self.diags };
        expander.expand_tokens(&raw_clean)
    }

    /// `__FILE__`/`__LINE__` depend on the call site, so they're substituted
    /// here (where we still know the exact location) rather than living in
    /// the macro table as ordinary static replacement lists.
    fn expand_builtin_identifier(&mut self, tok: &Token) -> Option<Token> {
        if !tok.is_identifier() {
            return None;
        }
        let name = self.interner.resolve(tok.lexeme?).to_string();
        match name.as_str() {
            "__LINE__" => {
                let text = tok.location.line.to_string();
                let sym = self.interner.intern(&text);
                Some(
                    Token::new(TokenKind::IntLiteral, tok.location)
                        .with_lexeme(sym)
                        .with_literal(LiteralValue::Int { value: tok.location.line as u64, is_unsigned: false, is_long: false, is_long_long: false, is_hex_or_octal: false }),
                )
            }
            "__FILE__" => {
                let path = self.files.path(tok.location.file).display().to_string();
                let sym = self.interner.intern(&path);
                Some(Token::new(TokenKind::StringLiteral, tok.location).with_lexeme(sym).with_literal(LiteralValue::Str(sym)))
            }
            _ => None,
        }
    }

    fn handle_directive(&mut self, hash_loc: SourceLocation) {
        let line = self.collect_line();
        let Some(first) = line.first() else { return };
        let name = match first.lexeme {
            Some(s) => self.interner.resolve(s).to_string(),
            None => {
                // A stray '#' followed by nothing meaningful — a null
                // directive, legal and a no-op.
                return;
            }
        };

        let emitting = self.is_emitting();

        // Only conditional-control directives are honored while skipping;
        // everything else is discarded unread so malformed content (or
        // stray '#' tokens) inside a skipped region never causes an error
        // (spec.md §8: "#if 0 ... #elif 1 ... selects the #elif branch even
        // when the #if contains unbalanced #").
        match name.as_str() {
            "if" => self.do_if(&line[1..], emitting),
            "ifdef" => self.do_ifdef(&line[1..], emitting, false),
            "ifndef" => self.do_ifdef(&line[1..], emitting, true),
            "elif" => self.do_elif(&line[1..], hash_loc),
            "else" => self.do_else(hash_loc),
            "endif" => self.do_endif(hash_loc),
            _ if !emitting => {}
            "include" => self.do_include(&line[1..], hash_loc),
            "define" => self.do_define(&line[1..], hash_loc),
            "undef" => self.do_undef(&line[1..]),
            "line" => self.do_line(&line[1..], hash_loc),
            "pragma" => self.do_pragma(&line[1..]),
            "error" => {
                let msg: String = line[1..].iter().map(|t| format!(" {}", self.spell(t))).collect();
                self.diags.fatal(hash_loc, format!("#error{}", msg));
            }
            _ => {
                self.diags.warning(hash_loc, format!("unknown directive #{}", name));
            }
        }
    }

    fn spell(&self, tok: &Token) -> String {
        tok.lexeme.map(|s| self.interner.resolve(s).to_string()).unwrap_or_default()
    }

    fn do_if(&mut self, cond_tokens: &[Token], parent_allows: bool) {
        let value = if parent_allows { self.eval_constant_expr(cond_tokens) != 0 } else { false };
        self.cond_stack.push(CondFrame { any_taken: value, active: parent_allows && value, parent_allows, saw_else: false });
    }

    fn do_ifdef(&mut self, tokens: &[Token], parent_allows: bool, negate: bool) {
        let defined = tokens.first().and_then(|t| t.lexeme).is_some_and(|s| self.macros.is_defined(s));
        let value = if negate { !defined } else { defined };
        let active = parent_allows && value;
        self.cond_stack.push(CondFrame { any_taken: value, active, parent_allows, saw_else: false });
    }

    fn do_elif(&mut self, cond_tokens: &[Token], loc: SourceLocation) {
        let Some(frame) = self.cond_stack.last_mut() else {
            self.diags.error(loc, "#elif without #if");
            return;
        };
        if frame.saw_else {
            self.diags.error(loc, "#elif after #else");
            return;
        }
        if !frame.parent_allows || frame.any_taken {
            frame.active = false;
            return;
        }
        let parent_allows = frame.parent_allows;
        let value = if parent_allows { self.eval_constant_expr(cond_tokens) != 0 } else { false };
        let frame = self.cond_stack.last_mut().unwrap();
        frame.active = value;
        frame.any_taken |= value;
    }

    fn do_else(&mut self, loc: SourceLocation) {
        let Some(frame) = self.cond_stack.last_mut() else {
            self.diags.error(loc, "#else without #if");
            return;
        };
        if frame.saw_else {
            self.diags.error(loc, "#else after #else");
            return;
        }
        frame.saw_else = true;
        frame.active = frame.parent_allows && !frame.any_taken;
        frame.any_taken = true;
    }

    fn do_endif(&mut self, loc: SourceLocation) {
        if self.cond_stack.pop().is_none() {
            self.diags.error(loc, "#endif without #if");
        }
    }

    fn do_define(&mut self, tokens: &[Token], loc: SourceLocation) {
        let Some(name_tok) = tokens.first() else {
            self.diags.error(loc, "macro name missing");
            return;
        };
        let Some(name) = name_tok.lexeme else { return };
        let rest = &tokens[1..];
        if !rest.is_empty() && rest[0].is_punct(Punct::LParen) && !rest[0].preceded_by_whitespace {
            self.define_function_like(name, &rest[1..], loc);
        } else {
            let replacement: Vec<RepElem> = rest.iter().cloned().map(RepElem::Tok).collect();
            self.macros.define(name, MacroKind::ObjectLike, replacement, rest.to_vec(), loc, &mut self.diags);
        }
    }

    fn define_function_like(&mut self, name: Symbol, after_lparen: &[Token], loc: SourceLocation) {
        let mut params = Vec::new();
        let mut variadic = false;
        let mut i = 0usize;
        while i < after_lparen.len() {
            let t = &after_lparen[i];
            if t.is_punct(Punct::RParen) {
                i += 1;
                break;
            }
            if t.is_punct(Punct::Comma) {
                i += 1;
                continue;
            }
            if t.is_punct(Punct::Ellipsis) {
                variadic = true;
                i += 1;
                continue;
            }
            if let Some(sym) = t.lexeme {
                if t.is_identifier() {
                    params.push(sym);
                }
            }
            i += 1;
        }
        let body = &after_lparen[i..];
        let param_index = |s: Symbol| params.iter().position(|&p| p == s);
        let mut replacement = Vec::new();
        let mut j = 0usize;
        while j < body.len() {
            let t = &body[j];
            if t.is_punct(Punct::Hash) {
                if let Some(next) = body.get(j + 1) {
                    if let Some(idx) = next.lexeme.and_then(param_index) {
                        replacement.push(RepElem::Stringize(idx));
                        j += 2;
                        continue;
                    }
                }
                self.diags.error(loc, "'#' is not followed by a macro parameter");
                j += 1;
                continue;
            }
            if t.is_identifier() {
                if let Some(idx) = t.lexeme.and_then(param_index) {
                    replacement.push(RepElem::Param(idx));
                    j += 1;
                    continue;
                }
            }
            replacement.push(RepElem::Tok(t.clone()));
            j += 1;
        }
        self.macros.define(
            name,
            MacroKind::FunctionLike { params, variadic },
            replacement,
            body.to_vec(),
            loc,
            &mut self.diags,
        );
    }

    fn do_undef(&mut self, tokens: &[Token]) {
        if let Some(sym) = tokens.first().and_then(|t| t.lexeme) {
            self.macros.undef(sym);
        }
    }

    fn do_line(&mut self, tokens: &[Token], loc: SourceLocation) {
        let Some(first) = tokens.first() else {
            self.diags.error(loc, "#line requires a line number");
            return;
        };
        let Some(LiteralValue::Int { value, .. }) = &first.literal else {
            self.diags.error(loc, "#line requires a digit-sequence");
            return;
        };
        let file = tokens.get(1).and_then(|t| match &t.literal {
            Some(LiteralValue::Str(s)) => Some(self.files.intern(Path::new(self.interner.resolve(*s)))),
            _ => None,
        });
        if let Some(top) = self.stack.top_mut() {
            top.apply_line_directive(*value as u32, file);
        }
    }

    fn do_pragma(&mut self, tokens: &[Token]) {
        if let Some(first) = tokens.first() {
            if first.lexeme.map(|s| self.interner.resolve(s) == "once") == Some(true) {
                if let Some(frame) = self.stack.top() {
                    let canonical = self.fs.canonicalize(&frame.real_path);
                    self.stack.mark_pragma_once(canonical);
                }
            }
            // Other pragmas are accepted and ignored; -w silences even the
            // note we'd otherwise be tempted to emit.
        }
    }

    fn do_include(&mut self, tokens: &[Token], loc: SourceLocation) {
        let expanded;
        let tokens = if tokens.first().map(|t| matches!(t.literal, Some(LiteralValue::Str(_)))).unwrap_or(false)
            || tokens.first().map(|t| t.is_punct(Punct::Lt)).unwrap_or(false)
        {
            tokens
        } else {
            let mut expander = Expander { macros: &self.macros, interner: &mut self.interner, diags: &mut self.diags };
            expanded = expander.expand_tokens(tokens);
            &expanded[..]
        };

        let (target, angled) = match tokens.first() {
            Some(t) => match &t.literal {
                Some(LiteralValue::Str(s)) => (self.interner.resolve(*s).to_string(), false),
                _ if t.is_punct(Punct::Lt) => {
                    let mut name = String::new();
                    for tt in &tokens[1..] {
                        if tt.is_punct(Punct::Gt) {
                            break;
                        }
                        name.push_str(&self.spell(tt));
                    }
                    (name, true)
                }
                _ => {
                    self.diags.error(loc, "#include expects \"FILENAME\" or <FILENAME>");
                    return;
                }
            },
            None => {
                self.diags.error(loc, "#include expects \"FILENAME\" or <FILENAME>");
                return;
            }
        };

        let resolved = self.resolve_include(&target, angled);
        let Some((path, is_system)) = resolved else {
            self.diags.fatal(loc, format!("{}: No such file or directory", target));
            return;
        };

        let canonical = self.fs.canonicalize(&path);
        if self.stack.is_pragma_once(&canonical) {
            return;
        }
        let text = match self.fs.read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                self.diags.fatal(loc, format!("{}: {}", path.display(), e));
                return;
            }
        };
        if !self.dependencies.iter().any(|p| p == &path) {
            self.dependencies.push(path.clone());
        }
        let id = self.files.intern(&path);
        self.stack.push(Frame::new(id, path, text, is_system));
        self.at_line_start = true;
    }

    fn resolve_include(&self, name: &str, angled: bool) -> Option<(PathBuf, bool)> {
        if !angled {
            if let Some(top) = self.stack.top() {
                if let Some(dir) = top.real_path.parent() {
                    let candidate = dir.join(name);
                    if candidate.is_file() || self.fs.read_to_string(&candidate).is_ok() {
                        return Some((candidate, top.is_system_header));
                    }
                }
            }
            for dir in &self.search.quote_dirs {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some((candidate, false));
                }
            }
        }
        for dir in &self.search.quote_dirs {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some((candidate, false));
            }
        }
        for dir in &self.search.system_dirs {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some((candidate, true));
            }
        }
        None
    }

    /// Evaluates a `#if`/`#elif` constant expression: `defined` is resolved
    /// first, the rest is macro-expanded, then parsed as an integer
    /// constant expression (spec.md §4.3, §8 boundary case on `#elif`).
    fn eval_constant_expr(&mut self, tokens: &[Token]) -> i64 {
        let resolved = self.resolve_defined(tokens);
        let mut expander = Expander { macros: &self.macros, interner: &mut self.interner, diags: &mut self.diags };
        let expanded = expander.expand_tokens(&resolved);
        // Undefined identifiers (other than keywords) evaluate to 0 per the
        // standard; true/false aren't keywords in this dialect so we don't
        // special-case them.
        let values: Vec<i64> = expanded
            .iter()
            .map(|t| match &t.literal {
                Some(LiteralValue::Int { value, .. }) => *value as i64,
                Some(LiteralValue::Char(v)) => *v,
                _ if t.is_identifier() => 0,
                _ => i64::MIN, // sentinel: not a literal, handled by the operator parser below
            })
            .collect();
        let mut parser = CondExprParser { toks: &expanded, vals: &values, pos: 0 };
        parser.parse_expr()
    }

    fn resolve_defined(&mut self, tokens: &[Token]) -> Vec<Token> {
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < tokens.len() {
            let t = &tokens[i];
            if t.lexeme.map(|s| self.interner.resolve(s) == "defined") == Some(true) {
                let (name_tok, advance) = if tokens.get(i + 1).map(|t| t.is_punct(Punct::LParen)) == Some(true) {
                    (tokens.get(i + 2), 4)
                } else {
                    (tokens.get(i + 1), 2)
                };
                let defined = name_tok.and_then(|t| t.lexeme).is_some_and(|s| self.macros.is_defined(s));
                let sym = self.interner.intern(if defined { "1" } else { "0" });
                out.push(
                    Token::new(TokenKind::IntLiteral, t.location)
                        .with_lexeme(sym)
                        .with_literal(LiteralValue::Int { value: defined as u64, is_unsigned: false, is_long: false, is_long_long: false, is_hex_or_octal: false }),
                );
                i += advance;
            } else {
                out.push(t.clone());
                i += 1;
            }
        }
        out
    }
}

/// Minimal precedence-climbing parser for `#if` constant expressions.
struct CondExprParser<'a> {
    toks: &'a [Token],
    vals: &'a [i64],
    pos: usize,
}

impl<'a> CondExprParser<'a> {
    fn peek_punct(&self) -> Option<Punct> {
        match self.toks.get(self.pos).map(|t| &t.kind) {
            Some(TokenKind::Punct(p)) => Some(*p),
            _ => None,
        }
    }

    fn value(&mut self) -> i64 {
        if self.peek_punct() == Some(Punct::LParen) {
            self.pos += 1;
            let v = self.parse_expr();
            if self.peek_punct() == Some(Punct::RParen) {
                self.pos += 1;
            }
            return v;
        }
        if self.peek_punct() == Some(Punct::Bang) {
            self.pos += 1;
            return (self.value() == 0) as i64;
        }
        if self.peek_punct() == Some(Punct::Minus) {
            self.pos += 1;
            return -self.value();
        }
        if self.peek_punct() == Some(Punct::Tilde) {
            self.pos += 1;
            return !self.value();
        }
        let v = self.vals.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        v
    }

    fn binop(&mut self, next: fn(&mut Self) -> i64, ops: &[(Punct, fn(i64, i64) -> i64)]) -> i64 {
        let mut lhs = next(self);
        loop {
            let Some(p) = self.peek_punct() else { break };
            let Some(&(_, f)) = ops.iter().find(|(op, _)| *op == p) else { break };
            self.pos += 1;
            let rhs = next(self);
            lhs = f(lhs, rhs);
        }
        lhs
    }

    fn mul(&mut self) -> i64 {
        self.binop(Self::value, &[
            (Punct::Star, |a, b| a.wrapping_mul(b)),
            (Punct::Slash, |a, b| if b == 0 { 0 } else { a / b }),
            (Punct::Percent, |a, b| if b == 0 { 0 } else { a % b }),
        ])
    }

    fn add(&mut self) -> i64 {
        self.binop(Self::mul, &[(Punct::Plus, |a, b| a.wrapping_add(b)), (Punct::Minus, |a, b| a.wrapping_sub(b))])
    }

    fn shift(&mut self) -> i64 {
        self.binop(Self::add, &[(Punct::Shl, |a, b| a.wrapping_shl(b as u32)), (Punct::Shr, |a, b| a.wrapping_shr(b as u32))])
    }

    fn relational(&mut self) -> i64 {
        self.binop(Self::shift, &[
            (Punct::Lt, |a, b| (a < b) as i64),
            (Punct::Gt, |a, b| (a > b) as i64),
            (Punct::Le, |a, b| (a <= b) as i64),
            (Punct::Ge, |a, b| (a >= b) as i64),
        ])
    }

    fn equality(&mut self) -> i64 {
        self.binop(Self::relational, &[(Punct::EqEq, |a, b| (a == b) as i64), (Punct::Ne, |a, b| (a != b) as i64)])
    }

    fn bitand(&mut self) -> i64 {
        self.binop(Self::equality, &[(Punct::Amp, |a, b| a & b)])
    }

    fn bitxor(&mut self) -> i64 {
        self.binop(Self::bitand, &[(Punct::Caret, |a, b| a ^ b)])
    }

    fn bitor(&mut self) -> i64 {
        self.binop(Self::bitxor, &[(Punct::Pipe, |a, b| a | b)])
    }

    fn logand(&mut self) -> i64 {
        self.binop(Self::bitor, &[(Punct::AmpAmp, |a, b| ((a != 0) && (b != 0)) as i64)])
    }

    fn logor(&mut self) -> i64 {
        self.binop(Self::logand, &[(Punct::PipePipe, |a, b| ((a != 0) || (b != 0)) as i64)])
    }

    fn parse_expr(&mut self) -> i64 {
        let cond = self.logor();
        if self.peek_punct() == Some(Punct::Question) {
            self.pos += 1;
            let then_v = self.parse_expr();
            if self.peek_punct() == Some(Punct::Colon) {
                self.pos += 1;
            }
            let else_v = self.parse_expr();
            if cond != 0 { then_v } else { else_v }
        } else {
            cond
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeFs {
        files: RefCell<HashMap<PathBuf, String>>,
    }

    impl FakeFs {
        fn new(files: &[(&str, &str)]) -> Self {
            let mut map = HashMap::new();
            for (name, content) in files {
                map.insert(PathBuf::from(name), content.to_string());
            }
            FakeFs { files: RefCell::new(map) }
        }
    }

    impl FileSystem for FakeFs {
        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn tokens_text(pp: &Preprocessor, tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match &t.literal {
                Some(LiteralValue::Str(s)) => pp.interner.resolve(*s).to_string(),
                Some(LiteralValue::Int { value, .. }) => value.to_string(),
                _ => t.lexeme.map(|s| pp.interner.resolve(s).to_string()).unwrap_or_default(),
            })
            .collect()
    }

    #[test]
    fn object_like_macro_expands_through_pipeline() {
        let fs = FakeFs::new(&[("a.c", "#define FOO 42\nint x = FOO;\n")]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("a.c")).unwrap();
        let out = pp.run();
        let text = tokens_text(&pp, &out);
        assert!(text.contains(&"42".to_string()));
        assert_eq!(pp.diags.error_count(), 0);
    }

    #[test]
    fn function_like_sq_macro_expands_nested_argument() {
        let fs = FakeFs::new(&[("a.c", "#define SQ(x) ((x)*(x))\nint f(int a){return SQ(a+1);}\n")]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("a.c")).unwrap();
        let out = pp.run();
        let text = tokens_text(&pp, &out).join(" ");
        assert!(text.contains("a + 1") || text.replace(' ', "").contains("a+1"));
    }

    #[test]
    fn pragma_once_includes_file_exactly_once() {
        let fs = FakeFs::new(&[
            ("main.c", "#include \"b.h\"\n#include \"b.h\"\nint x;\n"),
            ("b.h", "#pragma once\nint from_b;\n"),
        ]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("main.c")).unwrap();
        let out = pp.run();
        let count = out.iter().filter(|t| t.lexeme.map(|s| pp.interner.resolve(s) == "from_b") == Some(true)).count();
        assert_eq!(count, 1);
        assert_eq!(pp.dependencies.iter().filter(|p| p.ends_with("b.h")).count(), 1);
    }

    #[test]
    fn if_zero_elif_one_selects_elif_branch_even_with_unbalanced_hash() {
        let src = "#if 0\n# this # is # not # balanced\nshould_not_appear;\n#elif 1\nshould_appear;\n#endif\n";
        let fs = FakeFs::new(&[("a.c", src)]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("a.c")).unwrap();
        let out = pp.run();
        let text = tokens_text(&pp, &out).join(" ");
        assert!(text.contains("should_appear"));
        assert!(!text.contains("should_not_appear"));
        assert_eq!(pp.diags.error_count(), 0);
    }

    #[test]
    fn ifdef_and_ifndef_are_recognized() {
        let src = "#define X\n#ifdef X\na;\n#endif\n#ifndef X\nb;\n#else\nc;\n#endif\n";
        let fs = FakeFs::new(&[("a.c", src)]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("a.c")).unwrap();
        let out = pp.run();
        let text = tokens_text(&pp, &out).join(" ");
        assert!(text.contains('a'));
        assert!(text.contains('c'));
        assert!(!text.contains('b'));
    }

    #[test]
    fn error_directive_is_fatal() {
        let fs = FakeFs::new(&[("a.c", "#error boom\n")]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("a.c")).unwrap();
        pp.run();
        assert!(pp.diags.should_abort());
    }

    #[test]
    fn line_directive_renumbers_diagnostics() {
        let fs = FakeFs::new(&[("a.c", "#line 200 \"synth.c\"\n#error here\n")]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("a.c")).unwrap();
        pp.run();
        let rendered = pp.diags.render_all(&pp.files);
        assert!(rendered.contains("synth.c:200"));
    }

    #[test]
    fn defined_operator_in_if_expression() {
        let src = "#define A\n#if defined(A) && !defined(B)\nyes;\n#endif\n";
        let fs = FakeFs::new(&[("a.c", src)]);
        let mut pp = Preprocessor::new(Dialect::C99, SearchPaths::default(), &fs);
        pp.push_main_file(Path::new("a.c")).unwrap();
        let out = pp.run();
        let text = tokens_text(&pp, &out).join(" ");
        assert!(text.contains("yes"));
    }
}
