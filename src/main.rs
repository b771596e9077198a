//! cvc CLI
//!
//! Command-line driver that turns gcc-style flags into a [`cvc::context::Config`]
//! and runs the compilation pipeline.

use clap::Parser as ClapParser;
use cvc::context::{CodegenFlags, Config, DepMode, OutputKind};
use cvc::directives::SearchPaths;
use cvc::types::{Dialect, WcharWidth};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "cvc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A C89/C99/C11 compiler front end and middle end", long_about = None)]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Write output to FILE instead of the default name
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Stop after preprocessing, writing the expanded token stream
    #[arg(short = 'E')]
    preprocess_only: bool,

    /// Stop after compiling, writing assembly rather than an object file
    #[arg(short = 'S')]
    assembly_only: bool,

    /// Compile to an object file without linking
    #[arg(short = 'c')]
    compile_only: bool,

    /// Write the control-flow graph as Graphviz dot instead of assembly
    #[arg(long = "emit-dot")]
    emit_dot: bool,

    /// Add DIR to the quoted (`"..."`) and angle-bracket (`<...>`) include search path
    #[arg(short = 'I', value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Add DIR to the system (`<...>`-only) include search path
    #[arg(long = "isystem", value_name = "DIR")]
    system_dirs: Vec<PathBuf>,

    /// Define NAME, optionally as NAME=VALUE
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Undefine NAME (overrides an earlier `-D`/builtin definition)
    #[arg(short = 'U', value_name = "NAME")]
    undefines: Vec<String>,

    /// Process FILE as if `#include "FILE"` appeared at the top of the source
    #[arg(long = "include", value_name = "FILE")]
    forced_includes: Vec<PathBuf>,

    /// Language dialect: c89, c99, or c11
    #[arg(long = "std", value_name = "DIALECT", default_value = "c99")]
    std: String,

    /// Optimization level (0-3)
    #[arg(short = 'O', value_name = "N", default_value_t = 0)]
    opt_level: u8,

    /// Suppress all warnings
    #[arg(short = 'w')]
    no_warnings: bool,

    /// Generate debug info
    #[arg(short = 'g')]
    debug_info: bool,

    /// Do not search the standard system include directories
    #[arg(long = "nostdinc")]
    nostdinc: bool,

    /// List user-header dependencies in Makefile-rule form (implies `-E`)
    #[arg(short = 'M')]
    dep_all: bool,

    /// Like `-M`, but omit system headers
    #[arg(long = "MM")]
    dep_user_only: bool,

    /// Write dependency output as a side effect of normal compilation
    #[arg(long = "MD")]
    dep_md: bool,

    /// Like `-MD`, but omit system headers
    #[arg(long = "MMD")]
    dep_mmd: bool,

    /// Write dependency output to FILE instead of stdout
    #[arg(long = "MF", value_name = "FILE")]
    dep_file: Option<PathBuf>,

    /// Use NAME as the dependency rule's target instead of the default
    #[arg(long = "MT", value_name = "NAME")]
    dep_target: Option<String>,

    /// Like `-MT`, but quote characters Make treats specially
    #[arg(long = "MQ", value_name = "NAME")]
    dep_target_quoted: Option<String>,

    /// Treat missing headers as generated files rather than errors
    #[arg(long = "MG")]
    dep_treat_missing_as_generated: bool,

    /// Add a phony no-prerequisite rule for each header
    #[arg(long = "MP")]
    dep_phony: bool,

    /// Print diagnostics and the final command line verbosely
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_dialect(s: &str) -> Result<Dialect, String> {
    match s {
        "c89" | "c90" | "gnu89" => Ok(Dialect::C89),
        "c99" | "gnu99" => Ok(Dialect::C99),
        "c11" | "gnu11" => Ok(Dialect::C11),
        other => Err(format!("unrecognized -std value '{}'", other)),
    }
}

fn parse_define(spec: &str) -> (String, Option<String>) {
    match spec.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (spec.to_string(), None),
    }
}

fn build_config(cli: &Cli) -> Result<Config, String> {
    let dialect = parse_dialect(&cli.std)?;

    let dep_all = cli.dep_all || cli.dep_md;
    let dep_user_only = cli.dep_user_only || cli.dep_mmd;
    let dep_mode = if dep_user_only {
        DepMode::UserOnly
    } else if dep_all {
        DepMode::All
    } else {
        DepMode::None
    };

    let output_kind = if cli.dep_all || cli.dep_user_only {
        OutputKind::Preprocess
    } else if cli.preprocess_only {
        OutputKind::Preprocess
    } else if cli.emit_dot {
        OutputKind::Dot
    } else if cli.assembly_only {
        OutputKind::Assembly
    } else if cli.compile_only {
        OutputKind::Object
    } else {
        OutputKind::Executable
    };

    let mut defines: Vec<(String, Option<String>)> = cli.defines.iter().map(|s| parse_define(s)).collect();
    for name in &cli.undefines {
        defines.retain(|(n, _)| n != name);
    }

    Ok(Config {
        dialect,
        search: SearchPaths { quote_dirs: cli.include_dirs.clone(), system_dirs: cli.system_dirs.clone() },
        defines,
        forced_includes: cli.forced_includes.clone(),
        opt_level: cli.opt_level.min(3),
        emit_debug: cli.debug_info,
        warnings_suppressed: cli.no_warnings,
        verbose: cli.verbose,
        dep_mode,
        dep_output: cli.dep_file.clone(),
        dep_target_name: cli.dep_target.clone().or_else(|| cli.dep_target_quoted.clone()),
        dep_phony_headers: cli.dep_phony,
        wchar_width: WcharWidth::Default,
        codegen: CodegenFlags::default(),
        output_kind,
        output_path: cli.output.clone(),
        enable_trigraphs: false,
        nostdinc: cli.nostdinc,
    })
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cvc: error: {}", e);
            process::exit(1);
        }
    };

    let output = match cvc::compile_file(&cli.input, &config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("cvc: error: {}", e);
            process::exit(1);
        }
    };

    let diag_text = output.tu.diags.render_all(&output.tu.files);
    if !diag_text.is_empty() {
        eprint!("{}", diag_text);
    }

    if output.tu.diags.error_count() > 0 {
        process::exit(1);
    }

    if let Some(rendered) = output.rendered {
        match &config.output_path {
            Some(path) => {
                if let Err(e) = std::fs::write(path, rendered) {
                    eprintln!("cvc: error: cannot write {}: {}", path.display(), e);
                    process::exit(1);
                }
            }
            None => print!("{}", rendered),
        }
    }
}
