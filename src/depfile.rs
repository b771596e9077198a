//! Makefile-fragment dependency writer for `-M`/`-MM`/`-MD`/`-MMD`/`-MF`/
//! `-MT`/`-MQ`/`-MG`/`-MP` (spec.md §6, §8 scenario 6).
//!
//! Takes the preprocessor's flat dependency list and renders it the way
//! `gcc -M` does: one `target: prerequisites` rule, continuation lines
//! joined with a trailing backslash, optionally followed by phony
//! no-prerequisite rules per header (`-MP`) so a deleted header doesn't
//! break an incremental build.

use crate::context::{Config, DepMode};
use std::path::{Path, PathBuf};

/// Decides whether `path` should appear in a `-MM`-style (user headers
/// only) listing, by checking it against the configured system search
/// directories. The preprocessor itself doesn't retain a per-dependency
/// system/user flag, so this re-derives it the same way include
/// resolution picked it in the first place.
fn is_system_header(path: &Path, search: &crate::directives::SearchPaths) -> bool {
    search.system_dirs.iter().any(|dir| path.starts_with(dir))
}

/// Renders the Makefile fragment for one translation unit's dependency
/// list. `main_input` is the source file passed on the command line;
/// `dependencies` is the preprocessor's recorded include list in the order
/// files were first opened (the main file is always first).
pub fn render(config: &Config, main_input: &Path, dependencies: &[PathBuf]) -> String {
    let default_target = default_target_name(main_input);
    let targets: Vec<String> = if let Some(t) = &config.dep_target_name {
        vec![t.clone()]
    } else {
        vec![default_target]
    };

    let prereqs: Vec<&PathBuf> = dependencies
        .iter()
        .filter(|p| config.dep_mode != DepMode::UserOnly || !is_system_header(p, &config.search))
        .collect();

    let mut out = String::new();
    for target in &targets {
        out.push_str(target);
        out.push(':');
        for p in &prereqs {
            out.push_str(" \\\n  ");
            out.push_str(&p.display().to_string());
        }
        out.push('\n');
    }

    if config.dep_phony_headers {
        out.push('\n');
        for p in prereqs.iter().skip(1) {
            out.push_str(&p.display().to_string());
            out.push_str(":\n");
        }
    }

    out
}

/// `foo.c` -> `foo.o`, matching the compiler's own default object name.
fn default_target_name(input: &Path) -> String {
    input.with_extension("o").display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::SearchPaths;

    fn base_config() -> Config {
        let mut config = Config::default();
        config.search = SearchPaths {
            quote_dirs: vec![],
            system_dirs: vec![PathBuf::from("/usr/include")],
        };
        config
    }

    #[test]
    fn default_target_replaces_extension_with_o() {
        assert_eq!(default_target_name(Path::new("foo.c")), "foo.o");
    }

    #[test]
    fn mm_mode_excludes_system_headers() {
        let mut config = base_config();
        config.dep_mode = DepMode::UserOnly;
        let deps = vec![
            PathBuf::from("foo.c"),
            PathBuf::from("foo.h"),
            PathBuf::from("/usr/include/stdio.h"),
        ];
        let rendered = render(&config, Path::new("foo.c"), &deps);
        assert!(rendered.contains("foo.h"));
        assert!(!rendered.contains("stdio.h"));
        assert!(rendered.starts_with("foo.o:"));
    }

    #[test]
    fn m_mode_includes_system_headers() {
        let mut config = base_config();
        config.dep_mode = DepMode::All;
        let deps = vec![PathBuf::from("foo.c"), PathBuf::from("/usr/include/stdio.h")];
        let rendered = render(&config, Path::new("foo.c"), &deps);
        assert!(rendered.contains("stdio.h"));
    }

    #[test]
    fn explicit_target_name_overrides_default() {
        let mut config = base_config();
        config.dep_target_name = Some("custom.o".to_string());
        let rendered = render(&config, Path::new("foo.c"), &[PathBuf::from("foo.c")]);
        assert!(rendered.starts_with("custom.o:"));
    }

    #[test]
    fn phony_rules_are_emitted_for_headers_when_requested() {
        let mut config = base_config();
        config.dep_phony_headers = true;
        let deps = vec![PathBuf::from("foo.c"), PathBuf::from("foo.h")];
        let rendered = render(&config, Path::new("foo.c"), &deps);
        assert!(rendered.contains("foo.h:\n"));
    }
}
