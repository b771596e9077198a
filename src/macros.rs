//! Macro table and expander: object-like and function-like macros, `#`/`##`,
//! and hideset-based re-expansion control (spec.md §4.2, §9).

use crate::diagnostics::DiagnosticSink;
use crate::intern::{StringInterner, Symbol};
use crate::location::SourceLocation;
use crate::token::{Punct, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub enum RepElem {
    Tok(Token),
    Param(usize),
    /// `#<param>` — stringize.
    Stringize(usize),
}

#[derive(Debug, Clone)]
pub enum MacroKind {
    ObjectLike,
    FunctionLike { params: Vec<Symbol>, variadic: bool },
}

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: Symbol,
    pub kind: MacroKind,
    pub replacement: Vec<RepElem>,
    /// Raw replacement tokens, kept only to compare token-equivalence on
    /// redefinition (spec.md §4.2).
    raw_tokens: Vec<Token>,
}

fn tokens_equivalent(a: &[Token], b: &[Token]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).all(|(x, y)| x.kind == y.kind && x.lexeme == y.lexeme && x.literal == y.literal)
}

#[derive(Debug, Default)]
pub struct MacroTable {
    macros: std::collections::HashMap<Symbol, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable { macros: Default::default() }
    }

    pub fn is_defined(&self, name: Symbol) -> bool {
        self.macros.contains_key(&name)
    }

    pub fn get(&self, name: Symbol) -> Option<&MacroDef> {
        self.macros.get(&name)
    }

    pub fn undef(&mut self, name: Symbol) {
        self.macros.remove(&name);
    }

    /// Defines a macro, reporting a warning (not an error) on an
    /// incompatible redefinition — including one that differs only in
    /// whitespace, per the Open Question decision recorded in DESIGN.md.
    pub fn define(
        &mut self,
        name: Symbol,
        kind: MacroKind,
        replacement: Vec<RepElem>,
        raw_tokens: Vec<Token>,
        loc: SourceLocation,
        diags: &mut DiagnosticSink,
    ) {
        if let Some(existing) = self.macros.get(&name) {
            if !tokens_equivalent(&existing.raw_tokens, &raw_tokens) {
                diags.warning(loc, "macro redefined");
            }
        }
        self.macros.insert(name, MacroDef { name, kind, replacement, raw_tokens });
    }
}

/// Expands a single scanned token (and, for function-like macros, consumes
/// further tokens from `rest` to find the argument list) fully, appending
/// the result to `out`. `rest` is a cursor over not-yet-expanded tokens
/// available for argument collection; `pull` fetches more tokens lazily
/// when a function-like macro's `(` hasn't been seen yet.
pub struct Expander<'a> {
    pub macros: &'a MacroTable,
    pub interner: &'a mut StringInterner,
    pub diags: &'a mut DiagnosticSink,
}

impl<'a> Expander<'a> {
    /// Expands a flat list of tokens (already collected for one logical
    /// line or argument) to a fixed point, honoring hidesets.
    pub fn expand_tokens(&mut self, input: &[Token]) -> Vec<Token> {
        let mut cursor = 0usize;
        let mut out = Vec::new();
        self.expand_into(input, &mut cursor, &mut out, None);
        out
    }

    fn expand_into(&mut self, input: &[Token], cursor: &mut usize, out: &mut Vec<Token>, stop_before_rparen_depth: Option<i32>) {
        let _ = stop_before_rparen_depth;
        while *cursor < input.len() {
            let tok = input[*cursor].clone();
            if !tok.is_identifier() {
                out.push(tok);
                *cursor += 1;
                continue;
            }
            let name = match tok.lexeme {
                Some(s) => s,
                None => {
                    out.push(tok);
                    *cursor += 1;
                    continue;
                }
            };
            if tok.hideset.contains(&name) || !self.macros.is_defined(name) {
                out.push(tok);
                *cursor += 1;
                continue;
            }
            let def = self.macros.get(name).unwrap().clone_shallow();
            match def.kind {
                MacroKind::ObjectLike => {
                    *cursor += 1;
                    let mut hideset = tok.hideset.clone();
                    hideset.push(name);
                    let expanded = self.substitute(&def, &[], &hideset, tok.location);
                    // Re-scan the expansion for further macro calls.
                    let mut sub_cursor = 0usize;
                    self.expand_into(&expanded, &mut sub_cursor, out, None);
                }
                MacroKind::FunctionLike { ref params, variadic } => {
                    let save = *cursor;
                    *cursor += 1;
                    self.skip_ws_marker(input, cursor);
                    if *cursor >= input.len() || !input[*cursor].is_punct(Punct::LParen) {
                        // Not a call: emit the identifier as-is.
                        *cursor = save;
                        out.push(tok);
                        *cursor += 1;
                        continue;
                    }
                    *cursor += 1; // consume '('
                    let args = self.collect_arguments(input, cursor, params.len(), variadic);
                    let closing_hideset_tok_pos = (*cursor).saturating_sub(1);
                    let closing_hideset = input.get(closing_hideset_tok_pos).map(|t| t.hideset.clone()).unwrap_or_default();
                    let mut hideset: Vec<Symbol> = tok
                        .hideset
                        .iter()
                        .copied()
                        .filter(|h| closing_hideset.contains(h))
                        .collect();
                    hideset.push(name);
                    let expanded_args: Vec<Vec<Token>> = args.iter().map(|a| self.expand_tokens(a)).collect();
                    let expanded = self.substitute_fn(&def, &args, &expanded_args, &hideset, tok.location);
                    let mut sub_cursor = 0usize;
                    self.expand_into(&expanded, &mut sub_cursor, out, None);
                }
            }
        }
    }

    fn skip_ws_marker(&self, _input: &[Token], _cursor: &mut usize) {}

    fn collect_arguments(&mut self, input: &[Token], cursor: &mut usize, _expected: usize, _variadic: bool) -> Vec<Vec<Token>> {
        let mut args = Vec::new();
        let mut current = Vec::new();
        let mut depth = 0i32;
        loop {
            if *cursor >= input.len() {
                break;
            }
            let t = &input[*cursor];
            if t.is_punct(Punct::LParen) {
                depth += 1;
                current.push(t.clone());
                *cursor += 1;
            } else if t.is_punct(Punct::RParen) {
                if depth == 0 {
                    *cursor += 1;
                    break;
                }
                depth -= 1;
                current.push(t.clone());
                *cursor += 1;
            } else if t.is_punct(Punct::Comma) && depth == 0 {
                args.push(std::mem::take(&mut current));
                *cursor += 1;
            } else {
                current.push(t.clone());
                *cursor += 1;
            }
        }
        if !current.is_empty() || !args.is_empty() {
            args.push(current);
        }
        args
    }

    fn stringize(&mut self, arg: &[Token]) -> Token {
        let mut s = String::new();
        for (i, t) in arg.iter().enumerate() {
            if i > 0 && t.preceded_by_whitespace {
                s.push(' ');
            }
            s.push_str(&spelling(t, self.interner));
        }
        let sym = self.interner.intern(&s);
        Token::new(TokenKind::StringLiteral, arg.first().map(|t| t.location).unwrap_or(SourceLocation::synthetic(crate::location::FileId(0))))
            .with_lexeme(sym)
            .with_literal(crate::token::LiteralValue::Str(sym))
    }

    fn paste(&mut self, a: &Token, b: &Token) -> Token {
        let text = format!("{}{}", spelling(a, self.interner), spelling(b, self.interner));
        // Re-tokenize the pasted spelling as a single identifier/number;
        // anything that doesn't scan as one valid token is an error
        // (spec.md §4.2).
        if text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            let sym = self.interner.intern(&text);
            if text.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                Token::new(TokenKind::IntLiteral, a.location).with_lexeme(sym)
            } else {
                Token::new(TokenKind::Identifier(sym), a.location).with_lexeme(sym)
            }
        } else {
            let msg = format!(
                "pasting \"{}\" and \"{}\" does not give a valid token",
                spelling(a, self.interner),
                spelling(b, self.interner)
            );
            self.diags.error(a.location, msg);
            a.clone()
        }
    }

    fn substitute(&mut self, def: &MacroDef, args: &[Vec<Token>], hideset: &[Symbol], loc: SourceLocation) -> Vec<Token> {
        self.substitute_fn(def, args, args, hideset, loc)
    }

    fn substitute_fn(
        &mut self,
        def: &MacroDef,
        raw_args: &[Vec<Token>],
        expanded_args: &[Vec<Token>],
        hideset: &[Symbol],
        loc: SourceLocation,
    ) -> Vec<Token> {
        let mut out: Vec<Token> = Vec::new();
        let n = def.replacement.len();
        let mut i = 0usize;
        while i < n {
            match &def.replacement[i] {
                RepElem::Stringize(idx) => {
                    let arg = raw_args.get(*idx).cloned().unwrap_or_default();
                    out.push(self.stringize(&arg));
                    i += 1;
                }
                RepElem::Param(idx) => {
                    // `## param` or `param ##` uses the raw (unexpanded)
                    // argument; otherwise the pre-expanded one.
                    let adjacent_paste = (i > 0 && matches!(&def.replacement[i - 1], RepElem::Tok(t) if t.is_punct(Punct::HashHash)))
                        || (i + 1 < n && matches!(&def.replacement[i + 1], RepElem::Tok(t) if t.is_punct(Punct::HashHash)));
                    let arg = if adjacent_paste {
                        raw_args.get(*idx).cloned().unwrap_or_default()
                    } else {
                        expanded_args.get(*idx).cloned().unwrap_or_default()
                    };
                    out.extend(arg);
                    i += 1;
                }
                RepElem::Tok(t) if t.is_punct(Punct::HashHash) => {
                    // Paste previous emitted token with the next replacement
                    // element's first token.
                    let next = match def.replacement.get(i + 1) {
                        Some(RepElem::Param(idx)) => raw_args.get(*idx).cloned().unwrap_or_default(),
                        Some(RepElem::Tok(t)) => vec![t.clone()],
                        Some(RepElem::Stringize(idx)) => {
                            let arg = raw_args.get(*idx).cloned().unwrap_or_default();
                            vec![self.stringize(&arg)]
                        }
                        None => Vec::new(),
                    };
                    if let Some(prev) = out.pop() {
                        if let Some((first, rest)) = next.split_first() {
                            let pasted = self.paste(&prev, first);
                            out.push(pasted);
                            out.extend(rest.iter().cloned());
                        } else {
                            out.push(prev);
                        }
                    } else {
                        out.extend(next);
                    }
                    i += 2;
                }
                RepElem::Tok(t) => {
                    out.push(t.clone());
                    i += 1;
                }
            }
        }
        for tok in &mut out {
            for h in hideset {
                if !tok.hideset.contains(h) {
                    tok.hideset.push(*h);
                }
            }
            tok.location = loc;
        }
        out
    }

}

impl MacroDef {
    fn clone_shallow(&self) -> MacroDef {
        self.clone()
    }
}

fn spelling(tok: &Token, interner: &StringInterner) -> String {
    match &tok.literal {
        Some(crate::token::LiteralValue::Str(s)) if tok.kind == TokenKind::StringLiteral => {
            format!("\"{}\"", interner.resolve(*s))
        }
        _ => match tok.lexeme {
            Some(sym) => interner.resolve(sym).to_string(),
            None => punct_spelling(&tok.kind).to_string(),
        },
    }
}

fn punct_spelling(kind: &TokenKind) -> &'static str {
    use Punct::*;
    match kind {
        TokenKind::Punct(p) => match p {
            LParen => "(", RParen => ")", LBrace => "{", RBrace => "}",
            LBracket => "[", RBracket => "]", Semi => ";", Comma => ",",
            Colon => ":", Question => "?", Dot => ".", Arrow => "->",
            Ellipsis => "...", Assign => "=", Plus => "+", Minus => "-",
            Star => "*", Slash => "/", Percent => "%", Amp => "&", Pipe => "|",
            Caret => "^", Tilde => "~", Bang => "!", Lt => "<", Gt => ">",
            Le => "<=", Ge => ">=", EqEq => "==", Ne => "!=", AmpAmp => "&&",
            PipePipe => "||", Shl => "<<", Shr => ">>", PlusPlus => "++",
            MinusMinus => "--", PlusAssign => "+=", MinusAssign => "-=",
            StarAssign => "*=", SlashAssign => "/=", PercentAssign => "%=",
            AmpAssign => "&=", PipeAssign => "|=", CaretAssign => "^=",
            ShlAssign => "<<=", ShrAssign => ">>=", Hash => "#", HashHash => "##",
        },
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FileId;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }

    fn ident(interner: &mut StringInterner, name: &str) -> Token {
        let sym = interner.intern(name);
        Token::new(TokenKind::Identifier(sym), loc()).with_lexeme(sym)
    }

    fn punct(p: Punct) -> Token {
        Token::new(TokenKind::Punct(p), loc())
    }

    fn int(interner: &mut StringInterner, n: u64) -> Token {
        let sym = interner.intern(&n.to_string());
        Token::new(TokenKind::IntLiteral, loc())
            .with_lexeme(sym)
            .with_literal(crate::token::LiteralValue::Int { value: n, is_unsigned: false, is_long: false, is_long_long: false, is_hex_or_octal: false })
    }

    #[test]
    fn object_like_macro_expands_and_hides_itself() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut table = MacroTable::new();
        let name = interner.intern("FOO");
        let one = int(&mut interner, 1);
        table.define(name, MacroKind::ObjectLike, vec![RepElem::Tok(one.clone())], vec![one], loc(), &mut diags);

        let input = vec![ident(&mut interner, "FOO")];
        let mut expander = Expander { macros: &table, interner: &mut interner, diags: &mut diags };
        let out = expander.expand_tokens(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, TokenKind::IntLiteral);
    }

    #[test]
    fn self_referential_macro_does_not_infinitely_expand() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut table = MacroTable::new();
        let name = interner.intern("X");
        let self_tok = ident(&mut interner, "X");
        table.define(name, MacroKind::ObjectLike, vec![RepElem::Tok(self_tok.clone())], vec![self_tok], loc(), &mut diags);

        let input = vec![ident(&mut interner, "X")];
        let mut expander = Expander { macros: &table, interner: &mut interner, diags: &mut diags };
        let out = expander.expand_tokens(&input);
        assert_eq!(out.len(), 1);
        assert!(out[0].hideset.contains(&name));
    }

    #[test]
    fn function_like_macro_sq_expands_argument_twice() {
        // #define SQ(x) ((x)*(x))  applied to SQ(a+1)
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut table = MacroTable::new();
        let name = interner.intern("SQ");
        let x_param = interner.intern("x");
        let replacement = vec![
            RepElem::Tok(punct(Punct::LParen)),
            RepElem::Tok(punct(Punct::LParen)),
            RepElem::Param(0),
            RepElem::Tok(punct(Punct::RParen)),
            RepElem::Tok(punct(Punct::Star)),
            RepElem::Tok(punct(Punct::LParen)),
            RepElem::Param(0),
            RepElem::Tok(punct(Punct::RParen)),
            RepElem::Tok(punct(Punct::RParen)),
        ];
        table.define(
            name,
            MacroKind::FunctionLike { params: vec![x_param], variadic: false },
            replacement,
            vec![],
            loc(),
            &mut diags,
        );

        let a = ident(&mut interner, "a");
        let input = vec![
            ident(&mut interner, "SQ"),
            punct(Punct::LParen),
            a.clone(),
            punct(Punct::Plus),
            int(&mut interner, 1),
            punct(Punct::RParen),
        ];
        let mut expander = Expander { macros: &table, interner: &mut interner, diags: &mut diags };
        let out = expander.expand_tokens(&input);
        // ((a+1)*(a+1))
        assert_eq!(out.len(), 13);
        assert!(out[0].is_punct(Punct::LParen));
    }

    #[test]
    fn stringize_normalizes_whitespace_to_single_spaces() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut table = MacroTable::new();
        let name = interner.intern("STR");
        let x_param = interner.intern("x");
        table.define(
            name,
            MacroKind::FunctionLike { params: vec![x_param], variadic: false },
            vec![RepElem::Stringize(0)],
            vec![],
            loc(),
            &mut diags,
        );
        let mut b = ident(&mut interner, "b");
        b.preceded_by_whitespace = true;
        let input = vec![
            ident(&mut interner, "STR"),
            punct(Punct::LParen),
            ident(&mut interner, "a"),
            b,
            punct(Punct::RParen),
        ];
        let mut expander = Expander { macros: &table, interner: &mut interner, diags: &mut diags };
        let out = expander.expand_tokens(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, TokenKind::StringLiteral);
        if let Some(crate::token::LiteralValue::Str(s)) = out[0].literal {
            assert_eq!(interner.resolve(s), "a b");
        } else {
            panic!("expected string literal");
        }
    }

    #[test]
    fn redefinition_with_same_tokens_is_silent() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut table = MacroTable::new();
        let name = interner.intern("ONE");
        let one = int(&mut interner, 1);
        table.define(name, MacroKind::ObjectLike, vec![RepElem::Tok(one.clone())], vec![one.clone()], loc(), &mut diags);
        table.define(name, MacroKind::ObjectLike, vec![RepElem::Tok(one.clone())], vec![one], loc(), &mut diags);
        assert_eq!(diags.diagnostics().len(), 0);
    }

    #[test]
    fn incompatible_redefinition_warns_not_errors() {
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut table = MacroTable::new();
        let name = interner.intern("ONE");
        let one = int(&mut interner, 1);
        let two = int(&mut interner, 2);
        table.define(name, MacroKind::ObjectLike, vec![RepElem::Tok(one.clone())], vec![one], loc(), &mut diags);
        table.define(name, MacroKind::ObjectLike, vec![RepElem::Tok(two.clone())], vec![two], loc(), &mut diags);
        assert_eq!(diags.error_count(), 0);
        assert_eq!(diags.diagnostics().len(), 1);
    }
}
