//! Embedded scripting language for `python`-tagged blocks.
//!
//! A small Python-like language: assignment, arithmetic, `if`/`while`/`for`,
//! functions, lists, dicts, f-strings, and a handful of builtins. Top-level
//! names live in a [`Bindings`] table owned by the caller, which is how state
//! carries over from one block to the next.

pub mod ast;
mod builtins;
pub mod error;
mod eval;
mod grammar;
mod layout;
mod methods;
mod ops;
mod parser;
pub mod value;

pub use builtins::Builtin;
pub use error::{ErrorKind, ScriptError, ScriptResult, TraceFrame};
pub use eval::{Bindings, Host, Interpreter};
pub use parser::parse_program;
pub use value::Value;

/// Parse and run `source` against `bindings`, appending printed text to `out`.
///
/// Parsing happens first, so a syntax error leaves `bindings` untouched.
/// Runtime errors stop at the failing statement; effects of earlier
/// statements remain.
pub fn run(
    source: &str,
    bindings: &mut Bindings,
    out: &mut String,
    host: &dyn Host,
) -> ScriptResult<()> {
    let program = parse_program(source)?;
    Interpreter::new(bindings, out, host).run(&program)
}

/// Strip the whitespace prefix shared by all non-blank lines.
pub fn dedent(code: &str) -> String {
    let prefix_len = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    if prefix_len == 0 {
        return code.to_string();
    }
    let first_prefix: String = code
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line[..prefix_len].to_string())
        .unwrap_or_default();
    code.split_inclusive('\n')
        .map(|line| {
            line.strip_prefix(first_prefix.as_str())
                .unwrap_or_else(|| line.trim_start_matches([' ', '\t']))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedent_removes_shared_indentation_only() {
        assert_eq!(dedent("    a = 1\n      b\n\n    c\n"), "a = 1\n  b\n\nc\n");
        assert_eq!(dedent("a\n  b"), "a\n  b");
    }

    #[test]
    fn syntax_errors_leave_bindings_untouched() {
        struct Offline;
        impl Host for Offline {
            fn scrape_web(&self, _url: &str) -> anyhow::Result<Value> {
                anyhow::bail!("offline")
            }
        }
        let mut bindings = Bindings::new();
        let mut out = String::new();
        let err = run("a = 1\nb = (", &mut bindings, &mut out, &Offline).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(bindings.is_empty());
    }
}
