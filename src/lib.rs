//! `cvc`: a C89/C99/C11 front end and middle end (spec.md §1).
//!
//! The pipeline is preprocess (`directives`/`lexer`/`macros`) -> parse
//! directly to three-address IR (`parser`/`ir`) -> optimize (`optimizer`)
//! -> hand off to a [`backend::Backend`]. Each stage's types live in their
//! own module; this file only wires them together and exposes the
//! top-level entry points a driver (see `main.rs`) calls.

pub mod backend;
pub mod context;
pub mod depfile;
pub mod diagnostics;
pub mod directives;
pub mod input;
pub mod intern;
pub mod ir;
pub mod lexer;
pub mod location;
pub mod macros;
pub mod optimizer;
pub mod parser;
pub mod symtab;
pub mod token;
pub mod types;

use crate::backend::{Backend, BackendError, TextBackend};
use crate::context::{Config, DepMode, OutputKind, TranslationUnit};
use crate::directives::{FileSystem, Preprocessor, RealFs};
use crate::input::Frame;
use crate::location::{FileId, SourceLocation};
use crate::macros::{MacroKind, RepElem};
use crate::parser::Parser;
use crate::token::{LiteralValue, Punct, Token, TokenKind};
use std::path::Path;

/// Everything a successful compile produced: the finished `TranslationUnit`
/// (diagnostics, symbols, IR) plus whatever the requested `OutputKind`
/// rendered as text. `rendered` is `None` when the TU had errors (spec.md
/// §7: a non-zero error count suppresses backend emission).
pub struct CompileOutput {
    pub tu: TranslationUnit,
    pub rendered: Option<String>,
}

/// Runs one translation unit through the whole pipeline: preprocess, parse
/// to IR, optimize, then render via the bundled [`TextBackend`] according
/// to `config.output_kind`. Mirrors spec.md §5's "one TU, fully reset
/// before the next" model — call this once per input file.
pub fn compile_file(path: &Path, config: &Config) -> Result<CompileOutput, String> {
    let fs = RealFs;
    compile_with_fs(path, config, &fs, &TextBackend::new())
}

pub fn compile_with_fs(
    path: &Path,
    config: &Config,
    fs: &dyn FileSystem,
    backend: &dyn Backend,
) -> Result<CompileOutput, String> {
    tracing::debug!(input = %path.display(), dialect = ?config.dialect, "preprocessing translation unit");
    let mut pp = Preprocessor::new(config.dialect, config.search.clone(), fs);
    pp.push_main_file(path)?;
    for forced in config.forced_includes.iter().rev() {
        tracing::trace!(file = %forced.display(), "pushing forced include");
        push_forced_include(&mut pp, forced, fs)?;
    }
    for (name, value) in &config.defines {
        tracing::trace!(name, value, "defining command-line macro");
        define_command_line_macro(&mut pp, name, value.as_deref());
    }

    let tokens = pp.run();
    tracing::debug!(token_count = tokens.len(), "preprocessing complete");

    if config.output_kind == OutputKind::Preprocess {
        let rendered = render_preprocessed(&tokens, &pp.interner);
        let tu = finish_preprocess_only(config, pp);
        return Ok(CompileOutput { tu, rendered: Some(rendered) });
    }

    if config.dep_mode != DepMode::None {
        let rendered = depfile::render(config, path, &pp.dependencies);
        let tu = finish_preprocess_only(config, pp);
        return Ok(CompileOutput { tu, rendered: Some(rendered) });
    }

    let mut tu = TranslationUnit::new(config);
    tu.interner = pp.interner;
    tu.files = pp.files;
    tu.diags = pp.diags;

    let mut tokens = tokens;
    tokens.push(Token::new(TokenKind::Eof, SourceLocation::synthetic(FileId(0))));
    tracing::debug!("parsing token stream into IR");
    {
        let mut parser = Parser::new(tokens, &mut tu, config);
        parser.parse_translation_unit();
    }

    if !tu.diags.should_abort() {
        tracing::debug!(opt_level = config.opt_level, definitions = tu.definitions.len(), "running optimizer pipeline");
        for def in &mut tu.definitions {
            optimizer::optimize(def, config.opt_level);
        }
    } else {
        tracing::debug!(errors = tu.diags.error_count(), "skipping optimizer, parse reported errors");
    }

    if !tu.diags.should_emit_backend_output() {
        return Ok(CompileOutput { tu, rendered: None });
    }

    tracing::debug!(output_kind = ?config.output_kind, "emitting backend output");
    let rendered = match config.output_kind {
        OutputKind::Assembly => Some(backend.emit_assembly(&tu).map_err(|e| e.to_string())?),
        OutputKind::Dot => Some(backend.emit_dot(&tu).map_err(|e| e.to_string())?),
        OutputKind::Object | OutputKind::Executable => {
            return Err(BackendError::Unimplemented("object/executable emission").to_string());
        }
        OutputKind::Preprocess => unreachable!("handled above"),
    };

    Ok(CompileOutput { tu, rendered })
}

/// Rehomes a preprocessor's interner/files/diagnostics into a fresh
/// `TranslationUnit` without running the parser, for output kinds that
/// stop at the token stream (`-E`, `-M`/`-MM`).
fn finish_preprocess_only(config: &Config, pp: Preprocessor<'_>) -> TranslationUnit {
    let mut tu = TranslationUnit::new(config);
    tu.interner = pp.interner;
    tu.files = pp.files;
    tu.diags = pp.diags;
    tu
}

/// Pushes a `-include FILE` source onto the input stack ahead of the main
/// file, the same way `push_main_file` does, so it's processed (and its
/// macros visible) before the first line of the real source.
fn push_forced_include(pp: &mut Preprocessor<'_>, path: &Path, fs: &dyn FileSystem) -> Result<(), String> {
    let text = fs.read_to_string(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let id = pp.files.intern(path);
    pp.dependencies.push(path.to_path_buf());
    pp.stack.push(Frame::new(id, path.to_path_buf(), text, false));
    Ok(())
}

/// Defines a `-D NAME` or `-D NAME=VALUE` command-line macro. The value is
/// tokenized as a single literal or identifier, covering the common case;
/// a value needing full tokenization (e.g. containing operators) should be
/// put in a header and pulled in with `-include` instead.
fn define_command_line_macro(pp: &mut Preprocessor<'_>, name: &str, value: Option<&str>) {
    let loc = SourceLocation::synthetic(FileId(0));
    let name_sym = pp.interner.intern(name);
    let text = value.unwrap_or("1");
    let tok = if let Ok(v) = text.parse::<i64>() {
        let lexeme = pp.interner.intern(text);
        Token::new(TokenKind::IntLiteral, loc)
            .with_lexeme(lexeme)
            .with_literal(LiteralValue::Int { value: v as u64, is_unsigned: false, is_long: false, is_long_long: false, is_hex_or_octal: false })
    } else {
        let lexeme = pp.interner.intern(text);
        Token::new(TokenKind::Identifier(lexeme), loc).with_lexeme(lexeme)
    };
    pp.macros.define(name_sym, MacroKind::ObjectLike, vec![RepElem::Tok(tok.clone())], vec![tok], loc, &mut pp.diags);
}

/// Renders a macro-expanded token stream back to text for `-E`, inserting
/// a newline whenever the reported source line advances and otherwise
/// separating tokens with a single space (spec.md §6: "`-E` stops after
/// macro expansion and writes the resulting token stream").
fn render_preprocessed(tokens: &[Token], interner: &crate::intern::StringInterner) -> String {
    let mut out = String::new();
    let mut last_line: Option<u32> = None;
    for tok in tokens {
        if tok.is_eof() {
            break;
        }
        match last_line {
            Some(l) if l == tok.location.line => out.push(' '),
            Some(_) => out.push('\n'),
            None => {}
        }
        last_line = Some(tok.location.line);
        out.push_str(&spell(tok, interner));
    }
    out.push('\n');
    out
}

fn spell(tok: &Token, interner: &crate::intern::StringInterner) -> String {
    match &tok.kind {
        TokenKind::StringLiteral => match &tok.literal {
            Some(LiteralValue::Str(sym)) => format!("{:?}", interner.resolve(*sym)),
            _ => tok.lexeme.map(|s| interner.resolve(s).to_string()).unwrap_or_default(),
        },
        TokenKind::Punct(p) => punct_text(*p).to_string(),
        _ => tok.lexeme.map(|s| interner.resolve(s).to_string()).unwrap_or_default(),
    }
}

fn punct_text(p: Punct) -> &'static str {
    match p {
        Punct::LParen => "(",
        Punct::RParen => ")",
        Punct::LBrace => "{",
        Punct::RBrace => "}",
        Punct::LBracket => "[",
        Punct::RBracket => "]",
        Punct::Semi => ";",
        Punct::Comma => ",",
        Punct::Colon => ":",
        Punct::Question => "?",
        Punct::Dot => ".",
        Punct::Arrow => "->",
        Punct::Ellipsis => "...",
        Punct::Assign => "=",
        Punct::Plus => "+",
        Punct::Minus => "-",
        Punct::Star => "*",
        Punct::Slash => "/",
        Punct::Percent => "%",
        Punct::Amp => "&",
        Punct::Pipe => "|",
        Punct::Caret => "^",
        Punct::Tilde => "~",
        Punct::Bang => "!",
        Punct::Lt => "<",
        Punct::Gt => ">",
        Punct::Le => "<=",
        Punct::Ge => ">=",
        Punct::EqEq => "==",
        Punct::Ne => "!=",
        Punct::AmpAmp => "&&",
        Punct::PipePipe => "||",
        Punct::Shl => "<<",
        Punct::Shr => ">>",
        Punct::PlusPlus => "++",
        Punct::MinusMinus => "--",
        Punct::PlusAssign => "+=",
        Punct::MinusAssign => "-=",
        Punct::StarAssign => "*=",
        Punct::SlashAssign => "/=",
        Punct::PercentAssign => "%=",
        Punct::AmpAssign => "&=",
        Punct::PipeAssign => "|=",
        Punct::CaretAssign => "^=",
        Punct::ShlAssign => "<<=",
        Punct::ShrAssign => ">>=",
        Punct::Hash => "#",
        Punct::HashHash => "##",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct SingleFileFs(String);
    impl FileSystem for SingleFileFs {
        fn read_to_string(&self, _path: &Path) -> io::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn preprocess_only_output_contains_expanded_text_not_directives() {
        let fs = SingleFileFs("#define N 5\nint x = N;\n".to_string());
        let mut config = Config::default();
        config.output_kind = OutputKind::Preprocess;
        let out = compile_with_fs(Path::new("t.c"), &config, &fs, &TextBackend::new()).unwrap();
        let rendered = out.rendered.unwrap();
        assert!(rendered.contains('5'));
        assert!(!rendered.contains("#define"));
    }

    #[test]
    fn assembly_output_is_produced_for_a_trivial_function() {
        let fs = SingleFileFs("int main(void) { return 0; }".to_string());
        let mut config = Config::default();
        config.output_kind = OutputKind::Assembly;
        let out = compile_with_fs(Path::new("t.c"), &config, &fs, &TextBackend::new()).unwrap();
        assert_eq!(out.tu.diags.error_count(), 0);
        assert!(out.rendered.unwrap().contains("main:"));
    }

    #[test]
    fn errors_suppress_backend_output() {
        let fs = SingleFileFs("int main(void) { return undeclared_name; }".to_string());
        let mut config = Config::default();
        config.output_kind = OutputKind::Assembly;
        let out = compile_with_fs(Path::new("t.c"), &config, &fs, &TextBackend::new()).unwrap();
        assert!(out.tu.diags.error_count() > 0);
        assert!(out.rendered.is_none());
    }

    #[test]
    fn command_line_define_is_visible_to_the_source() {
        let fs = SingleFileFs("int x = FLAG;\n".to_string());
        let mut config = Config::default();
        config.output_kind = OutputKind::Preprocess;
        config.defines.push(("FLAG".to_string(), Some("7".to_string())));
        let out = compile_with_fs(Path::new("t.c"), &config, &fs, &TextBackend::new()).unwrap();
        assert!(out.rendered.unwrap().contains('7'));
    }
}
