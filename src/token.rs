//! Tokens: the tagged values the tokenizer produces and the parser and
//! preprocessor consume (spec.md §3 "Token").

use crate::intern::Symbol;
use crate::location::SourceLocation;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Colon,
    Question,
    Dot,
    Arrow,
    Ellipsis,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    AmpAmp,
    PipePipe,
    Shl,
    Shr,
    PlusPlus,
    MinusMinus,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    Hash,
    HashHash,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int { value: u64, is_unsigned: bool, is_long: bool, is_long_long: bool, is_hex_or_octal: bool },
    Float { value: f64, is_float: bool, is_long_double: bool },
    Char(i64),
    Str(Symbol),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Symbol),
    Identifier(Symbol),
    IntLiteral,
    FloatLiteral,
    CharLiteral,
    StringLiteral,
    Punct(Punct),
    /// A newline, significant only to the directive engine; the parser
    /// never sees these because the directive engine consumes them
    /// (spec.md §4.1: "never discards line breaks until the directive
    /// engine has consumed them").
    Newline,
    /// Produced in place of a malformed lexeme so downstream stages can
    /// treat it as a no-op rather than cascading further diagnostics
    /// (spec.md §7 propagation policy).
    Error,
    Eof,
}

pub const KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do",
    "double", "else", "enum", "extern", "float", "for", "goto", "if",
    "inline", "int", "long", "register", "restrict", "return", "short",
    "signed", "sizeof", "static", "struct", "switch", "typedef", "union",
    "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: Option<Symbol>,
    pub literal: Option<LiteralValue>,
    pub location: SourceLocation,
    pub starts_line: bool,
    pub preceded_by_whitespace: bool,
    /// Macro names that must not re-expand this token (spec.md §4.2, §9
    /// "Hideset management"). Empty for tokens straight from the lexer;
    /// populated and unioned by the macro expander.
    pub hideset: Vec<Symbol>,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation) -> Self {
        Token {
            kind,
            lexeme: None,
            literal: None,
            location,
            starts_line: false,
            preceded_by_whitespace: false,
            hideset: Vec::new(),
        }
    }

    pub fn with_lexeme(mut self, lexeme: Symbol) -> Self {
        self.lexeme = Some(lexeme);
        self
    }

    pub fn with_literal(mut self, literal: LiteralValue) -> Self {
        self.literal = Some(literal);
        self
    }

    pub fn starting_line(mut self, starts_line: bool) -> Self {
        self.starts_line = starts_line;
        self
    }

    pub fn preceded_by_ws(mut self, preceded: bool) -> Self {
        self.preceded_by_whitespace = preceded;
        self
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier(_))
    }

    pub fn is_punct(&self, p: Punct) -> bool {
        matches!(self.kind, TokenKind::Punct(ref k) if *k == p)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(_) => write!(f, "keyword"),
            TokenKind::Identifier(_) => write!(f, "identifier"),
            TokenKind::IntLiteral => write!(f, "integer literal"),
            TokenKind::FloatLiteral => write!(f, "floating literal"),
            TokenKind::CharLiteral => write!(f, "character literal"),
            TokenKind::StringLiteral => write!(f, "string literal"),
            TokenKind::Punct(_) => write!(f, "punctuator"),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Error => write!(f, "<error>"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FileId, SourceLocation};

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }

    #[test]
    fn error_token_is_distinguishable() {
        let tok = Token::new(TokenKind::Error, loc());
        assert_eq!(tok.kind, TokenKind::Error);
    }

    #[test]
    fn builder_methods_set_flags() {
        let tok = Token::new(TokenKind::Eof, loc())
            .starting_line(true)
            .preceded_by_ws(true);
        assert!(tok.starts_line);
        assert!(tok.preceded_by_whitespace);
    }
}
