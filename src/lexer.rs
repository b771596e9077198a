//! Tokenizer: byte stream (well, `char` stream) to classified lexemes
//! (spec.md §4.1).
//!
//! Operates on the current top [`Frame`] of an [`InputStack`]. It never
//! pushes or pops frames itself — that is the directive engine's job, since
//! only `#include` knows when to descend and only end-of-frame knows when to
//! return to the includer. What it does own: trigraph elision,
//! backslash-newline splicing, comment stripping, and classification of the
//! resulting lexemes per the C lexical grammar, including the
//! *starts-line*/*preceded-by-whitespace* flags the directive engine and
//! macro stringizer need.

use crate::diagnostics::DiagnosticSink;
use crate::input::{Frame, InputStack};
use crate::intern::StringInterner;
use crate::token::{LiteralValue, Punct, Token, TokenKind, KEYWORDS};

pub struct Lexer<'a> {
    pub stack: &'a mut InputStack,
    pub interner: &'a mut StringInterner,
    pub diags: &'a mut DiagnosticSink,
    pub enable_trigraphs: bool,
    at_line_start: &'a mut bool,
}

impl<'a> Lexer<'a> {
    /// The *start-of-line* flag is threaded through an external `&mut bool`
    /// rather than owned, so a caller that rebuilds a `Lexer` on every token
    /// (the directive engine, across `#include` pushes/pops) doesn't lose
    /// track of line boundaries between tokens.
    pub fn new(
        stack: &'a mut InputStack,
        interner: &'a mut StringInterner,
        diags: &'a mut DiagnosticSink,
        enable_trigraphs: bool,
        at_line_start: &'a mut bool,
    ) -> Self {
        Lexer { stack, interner, diags, enable_trigraphs, at_line_start }
    }

    /// Reads the next token from the current top frame. Returns `Eof` if the
    /// top frame is exhausted; does not pop the frame.
    pub fn next_token(&mut self) -> Token {
        let preceded_by_ws = self.skip_whitespace_and_comments();
        let frame = match self.stack.top_mut() {
            Some(f) => f,
            None => return Token::new(TokenKind::Eof, crate::location::SourceLocation::synthetic(crate::location::FileId(0))),
        };

        if frame.eof() {
            let loc = frame.location();
            return Token::new(TokenKind::Eof, loc).preceded_by_ws(preceded_by_ws);
        }

        let starts_line = *self.at_line_start;
        *self.at_line_start = false;

        let loc = self.stack.top().unwrap().location();
        let c = self.peek_spliced(0).unwrap();

        let tok = if c == '\n' {
            self.bump_spliced();
            *self.at_line_start = true;
            Token::new(TokenKind::Newline, loc)
        } else if c.is_ascii_digit() || (c == '.' && self.peek_spliced(1).is_some_and(|d| d.is_ascii_digit())) {
            self.lex_number(loc)
        } else if is_ident_start(c) {
            self.lex_identifier(loc)
        } else if c == '"' {
            self.lex_string(loc)
        } else if c == '\'' {
            self.lex_char(loc)
        } else {
            self.lex_punct(loc)
        };

        tok.starting_line(starts_line).preceded_by_ws(preceded_by_ws)
    }

    /// Peeks the `n`-th character ahead after collapsing trigraphs and
    /// backslash-newline splices, without consuming it.
    fn peek_spliced(&self, n: usize) -> Option<char> {
        let frame = self.stack.top()?;
        spliced_chars(frame, self.enable_trigraphs).nth(n)
    }

    fn bump_spliced(&mut self) -> Option<char> {
        let frame = self.stack.top_mut()?;
        advance_spliced(frame, self.enable_trigraphs)
    }

    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut saw_ws = false;
        loop {
            match self.peek_spliced(0) {
                Some(c) if c == ' ' || c == '\t' || c == '\r' || c == '\x0b' || c == '\x0c' => {
                    self.bump_spliced();
                    saw_ws = true;
                }
                Some('/') if self.peek_spliced(1) == Some('/') => {
                    while !matches!(self.peek_spliced(0), None | Some('\n')) {
                        self.bump_spliced();
                    }
                    saw_ws = true;
                }
                Some('/') if self.peek_spliced(1) == Some('*') => {
                    let loc = self.stack.top().unwrap().location();
                    self.bump_spliced();
                    self.bump_spliced();
                    let mut closed = false;
                    while let Some(c) = self.peek_spliced(0) {
                        if c == '*' && self.peek_spliced(1) == Some('/') {
                            self.bump_spliced();
                            self.bump_spliced();
                            closed = true;
                            break;
                        }
                        self.bump_spliced();
                    }
                    if !closed {
                        self.diags.fatal(loc, "unterminated comment");
                    }
                    saw_ws = true;
                }
                _ => break,
            }
        }
        saw_ws
    }

    fn lex_number(&mut self, loc: crate::location::SourceLocation) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek_spliced(0) {
            let is_exp_sign = matches!(c, '+' | '-')
                && matches!(text.chars().last(), Some('e') | Some('E') | Some('p') | Some('P'));
            if c.is_ascii_alphanumeric() || c == '.' || is_exp_sign {
                text.push(c);
                self.bump_spliced();
            } else {
                break;
            }
        }
        let is_float = text.contains('.')
            || ((text.contains('e') || text.contains('E')) && !text.starts_with("0x") && !text.starts_with("0X"))
            || text.ends_with('f')
            || text.ends_with('F');
        let sym = self.interner.intern(&text);
        if is_float {
            let numeric: String = text.chars().take_while(|c| !matches!(c, 'f' | 'F' | 'l' | 'L')).collect();
            let value: f64 = numeric.parse().unwrap_or(0.0);
            let is_f = text.ends_with('f') || text.ends_with('F');
            let is_ld = text.ends_with('l') || text.ends_with('L');
            Token::new(TokenKind::FloatLiteral, loc)
                .with_lexeme(sym)
                .with_literal(LiteralValue::Float { value, is_float: is_f, is_long_double: is_ld })
        } else {
            let (radix, digits) = if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                (16, rest)
            } else if text.starts_with('0') && text.len() > 1 {
                (8, &text[1..])
            } else {
                (10, text.as_str())
            };
            let digits_only: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
            let suffix = &digits[digits_only.len()..];
            let value = u64::from_str_radix(&digits_only, radix).unwrap_or(0);
            let lower = suffix.to_ascii_lowercase();
            let is_unsigned = lower.contains('u');
            let is_long_long = lower.matches('l').count() >= 2;
            let is_long = lower.matches('l').count() == 1 && !is_long_long;
            let is_hex_or_octal = radix != 10;
            Token::new(TokenKind::IntLiteral, loc)
                .with_lexeme(sym)
                .with_literal(LiteralValue::Int { value, is_unsigned, is_long, is_long_long, is_hex_or_octal })
        }
    }

    fn lex_identifier(&mut self, loc: crate::location::SourceLocation) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek_spliced(0) {
            if is_ident_continue(c) {
                text.push(c);
                self.bump_spliced();
            } else {
                break;
            }
        }
        let sym = self.interner.intern(&text);
        if KEYWORDS.contains(&text.as_str()) {
            Token::new(TokenKind::Keyword(sym), loc).with_lexeme(sym)
        } else {
            Token::new(TokenKind::Identifier(sym), loc).with_lexeme(sym)
        }
    }

    fn lex_string(&mut self, loc: crate::location::SourceLocation) -> Token {
        self.bump_spliced(); // opening quote
        let mut content = String::new();
        let mut closed = false;
        while let Some(c) = self.peek_spliced(0) {
            if c == '"' {
                self.bump_spliced();
                closed = true;
                break;
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                self.bump_spliced();
                match self.lex_escape() {
                    Some(v) => content.push(char::from_u32(v as u32).unwrap_or('\u{FFFD}')),
                    None => {
                        self.diags.warning(loc, "invalid escape sequence");
                    }
                }
            } else {
                content.push(c);
                self.bump_spliced();
            }
        }
        if !closed {
            self.diags.fatal(loc, "missing terminating \" character");
            return Token::new(TokenKind::Error, loc);
        }
        let sym = self.interner.intern(&content);
        Token::new(TokenKind::StringLiteral, loc)
            .with_lexeme(sym)
            .with_literal(LiteralValue::Str(sym))
    }

    fn lex_char(&mut self, loc: crate::location::SourceLocation) -> Token {
        self.bump_spliced(); // opening quote
        let value = match self.peek_spliced(0) {
            Some('\\') => {
                self.bump_spliced();
                self.lex_escape().unwrap_or(0)
            }
            Some(c) => {
                self.bump_spliced();
                c as i64
            }
            None => 0,
        };
        if self.peek_spliced(0) == Some('\'') {
            self.bump_spliced();
        } else {
            self.diags.fatal(loc, "missing terminating ' character");
            return Token::new(TokenKind::Error, loc);
        }
        Token::new(TokenKind::CharLiteral, loc).with_literal(LiteralValue::Char(value))
    }

    fn lex_escape(&mut self) -> Option<i64> {
        let c = self.peek_spliced(0)?;
        self.bump_spliced();
        Some(match c {
            'n' => b'\n' as i64,
            't' => b'\t' as i64,
            'r' => b'\r' as i64,
            '0' => 0,
            '\\' => b'\\' as i64,
            '\'' => b'\'' as i64,
            '"' => b'"' as i64,
            'a' => 7,
            'b' => 8,
            'f' => 12,
            'v' => 11,
            'x' => {
                let mut digits = String::new();
                while let Some(d) = self.peek_spliced(0) {
                    if d.is_ascii_hexdigit() {
                        digits.push(d);
                        self.bump_spliced();
                    } else {
                        break;
                    }
                }
                i64::from_str_radix(&digits, 16).unwrap_or(0) & 0xFF
            }
            other if other.is_digit(8) => {
                let mut digits = String::from(other);
                for _ in 0..2 {
                    if let Some(d) = self.peek_spliced(0) {
                        if d.is_digit(8) {
                            digits.push(d);
                            self.bump_spliced();
                            continue;
                        }
                    }
                    break;
                }
                i64::from_str_radix(&digits, 8).unwrap_or(0) & 0xFF
            }
            other => return Some(other as i64),
        })
    }

    fn lex_punct(&mut self, loc: crate::location::SourceLocation) -> Token {
        macro_rules! two {
            ($a:expr, $b:expr, $p:expr) => {
                if self.peek_spliced(0) == Some($a) && self.peek_spliced(1) == Some($b) {
                    self.bump_spliced();
                    self.bump_spliced();
                    return Token::new(TokenKind::Punct($p), loc);
                }
            };
        }
        // Three-character operators first.
        if self.peek_spliced(0) == Some('.') && self.peek_spliced(1) == Some('.') && self.peek_spliced(2) == Some('.') {
            self.bump_spliced();
            self.bump_spliced();
            self.bump_spliced();
            return Token::new(TokenKind::Punct(Punct::Ellipsis), loc);
        }
        if self.peek_spliced(0) == Some('<') && self.peek_spliced(1) == Some('<') && self.peek_spliced(2) == Some('=') {
            self.bump_spliced();
            self.bump_spliced();
            self.bump_spliced();
            return Token::new(TokenKind::Punct(Punct::ShlAssign), loc);
        }
        if self.peek_spliced(0) == Some('>') && self.peek_spliced(1) == Some('>') && self.peek_spliced(2) == Some('=') {
            self.bump_spliced();
            self.bump_spliced();
            self.bump_spliced();
            return Token::new(TokenKind::Punct(Punct::ShrAssign), loc);
        }
        two!('#', '#', Punct::HashHash);
        two!('-', '>', Punct::Arrow);
        two!('+', '+', Punct::PlusPlus);
        two!('-', '-', Punct::MinusMinus);
        two!('<', '<', Punct::Shl);
        two!('>', '>', Punct::Shr);
        two!('<', '=', Punct::Le);
        two!('>', '=', Punct::Ge);
        two!('=', '=', Punct::EqEq);
        two!('!', '=', Punct::Ne);
        two!('&', '&', Punct::AmpAmp);
        two!('|', '|', Punct::PipePipe);
        two!('+', '=', Punct::PlusAssign);
        two!('-', '=', Punct::MinusAssign);
        two!('*', '=', Punct::StarAssign);
        two!('/', '=', Punct::SlashAssign);
        two!('%', '=', Punct::PercentAssign);
        two!('&', '=', Punct::AmpAssign);
        two!('|', '=', Punct::PipeAssign);
        two!('^', '=', Punct::CaretAssign);

        let c = self.peek_spliced(0).unwrap();
        self.bump_spliced();
        let p = match c {
            '(' => Punct::LParen,
            ')' => Punct::RParen,
            '{' => Punct::LBrace,
            '}' => Punct::RBrace,
            '[' => Punct::LBracket,
            ']' => Punct::RBracket,
            ';' => Punct::Semi,
            ',' => Punct::Comma,
            ':' => Punct::Colon,
            '?' => Punct::Question,
            '.' => Punct::Dot,
            '=' => Punct::Assign,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '%' => Punct::Percent,
            '&' => Punct::Amp,
            '|' => Punct::Pipe,
            '^' => Punct::Caret,
            '~' => Punct::Tilde,
            '!' => Punct::Bang,
            '<' => Punct::Lt,
            '>' => Punct::Gt,
            '#' => Punct::Hash,
            other => {
                self.diags.error(loc, format!("invalid character '{}'", other));
                return Token::new(TokenKind::Error, loc);
            }
        };
        Token::new(TokenKind::Punct(p), loc)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

const TRIGRAPHS: &[(char, char)] = &[
    ('=', '#'), ('/', '\\'), ('\'', '^'), ('(', '['), (')', ']'), ('!', '|'), ('<', '{'), ('>', '}'), ('-', '~'),
];

fn trigraph_replacement(second: char) -> Option<char> {
    TRIGRAPHS.iter().find(|(s, _)| *s == second).map(|(_, r)| *r)
}

/// Iterator over a frame's remaining text with trigraphs elided and
/// backslash-newline continuations spliced out, without mutating the frame.
struct SplicedChars<'a> {
    rest: &'a str,
    enable_trigraphs: bool,
}

fn spliced_chars(frame: &Frame, enable_trigraphs: bool) -> SplicedChars<'_> {
    SplicedChars { rest: &frame.text[frame.offset..], enable_trigraphs }
}

impl<'a> Iterator for SplicedChars<'a> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            let mut chars = self.rest.chars();
            let c = chars.next()?;

            if self.enable_trigraphs && c == '?' {
                let mut look = self.rest.chars();
                look.next();
                if look.next() == Some('?') {
                    if let Some(third) = look.next() {
                        if let Some(repl) = trigraph_replacement(third) {
                            self.rest = look.as_str();
                            if repl == '\\' {
                                continue; // re-evaluate for possible splice
                            }
                            return Some(repl);
                        }
                    }
                }
            }

            if c == '\\' {
                let mut look = chars.clone();
                // skip trailing whitespace before newline is not standard C
                // but harmless leniency mirrors common preprocessors.
                if look.next() == Some('\n') {
                    self.rest = look.as_str();
                    continue;
                }
                if look.clone().next() == Some('\r') {
                    let mut look2 = look.clone();
                    look2.next();
                    if look2.next() == Some('\n') {
                        self.rest = look2.as_str();
                        continue;
                    }
                }
            }

            self.rest = chars.as_str();
            return Some(c);
        }
    }
}

fn advance_spliced(frame: &mut Frame, enable_trigraphs: bool) -> Option<char> {
    let before_len = frame.text[frame.offset..].len();
    let mut iter = spliced_chars(frame, enable_trigraphs);
    let c = iter.next()?;
    let consumed = before_len - iter.rest.len();
    let raw = &frame.text[frame.offset..frame.offset + consumed];
    for rc in raw.chars() {
        if rc == '\n' {
            frame.reported_line += 1;
            frame.column = 1;
        } else {
            frame.column += 1;
        }
    }
    frame.offset += consumed;
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Frame;
    use crate::location::FileId;
    use std::path::PathBuf;

    fn lex_all(src: &str) -> Vec<TokenKind> {
        let mut stack = InputStack::new();
        stack.push(Frame::new(FileId(0), PathBuf::from("t.c"), src.to_string(), false));
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut at_line_start = true;
        let mut lexer = Lexer::new(&mut stack, &mut interner, &mut diags, true, &mut at_line_start);
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token();
            if t.is_eof() {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn lexes_keyword_and_identifier() {
        let kinds = lex_all("int x;");
        assert!(matches!(kinds[0], TokenKind::Keyword(_)));
        assert!(matches!(kinds[1], TokenKind::Identifier(_)));
        assert!(matches!(kinds[2], TokenKind::Punct(Punct::Semi)));
    }

    #[test]
    fn skips_line_and_block_comments() {
        let kinds = lex_all("int /* c */ x; // trailing\n");
        assert!(matches!(kinds[0], TokenKind::Keyword(_)));
        assert!(matches!(kinds[1], TokenKind::Identifier(_)));
    }

    #[test]
    fn backslash_newline_splices_across_lines() {
        let kinds = lex_all("int \\\nx;");
        assert!(matches!(kinds[0], TokenKind::Keyword(_)));
        assert!(matches!(kinds[1], TokenKind::Identifier(_)));
    }

    #[test]
    fn hex_literal_0x80000000_parses_with_value() {
        let mut stack = InputStack::new();
        stack.push(Frame::new(FileId(0), PathBuf::from("t.c"), "0x80000000".to_string(), false));
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut at_line_start = true;
        let mut lexer = Lexer::new(&mut stack, &mut interner, &mut diags, true, &mut at_line_start);
        let tok = lexer.next_token();
        match tok.literal {
            Some(LiteralValue::Int { value, .. }) => assert_eq!(value, 0x8000_0000),
            other => panic!("expected int literal, got {:?}", other),
        }
    }

    #[test]
    fn char_constant_hex_ff_has_value_255() {
        let mut stack = InputStack::new();
        stack.push(Frame::new(FileId(0), PathBuf::from("t.c"), r"'\xff'".to_string(), false));
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut at_line_start = true;
        let mut lexer = Lexer::new(&mut stack, &mut interner, &mut diags, true, &mut at_line_start);
        let tok = lexer.next_token();
        assert_eq!(tok.literal, Some(LiteralValue::Char(255)));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let mut stack = InputStack::new();
        stack.push(Frame::new(FileId(0), PathBuf::from("t.c"), "\"abc".to_string(), false));
        let mut interner = StringInterner::new();
        let mut diags = DiagnosticSink::new(false);
        let mut at_line_start = true;
        let mut lexer = Lexer::new(&mut stack, &mut interner, &mut diags, true, &mut at_line_start);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert!(diags.should_abort());
    }

    #[test]
    fn newline_is_preserved_as_a_token() {
        let kinds = lex_all("x\ny");
        assert!(matches!(kinds[1], TokenKind::Newline));
    }

    #[test]
    fn trigraph_elision_produces_hash() {
        let kinds = lex_all("??=define");
        assert!(matches!(kinds[0], TokenKind::Punct(Punct::Hash)));
    }
}
