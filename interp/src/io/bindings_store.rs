//! Binding table persistence as a versioned JSON envelope.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::config::write_atomic;
use crate::script::{Bindings, Value};

pub const BINDINGS_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    bindings: BTreeMap<&'a str, &'a Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    version: u32,
    bindings: Bindings,
}

/// Load bindings from `path`; a missing file is an empty table.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_bindings(path: &Path) -> Result<Bindings> {
    if !path.exists() {
        debug!("no bindings file, starting empty");
        return Ok(Bindings::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read bindings {}", path.display()))?;
    let envelope = parse_envelope(&contents)
        .with_context(|| format!("parse bindings {}", path.display()))?;
    if envelope.version != BINDINGS_VERSION {
        bail!(
            "unsupported bindings version {} in {} (expected {})",
            envelope.version,
            path.display(),
            BINDINGS_VERSION
        );
    }
    debug!(count = envelope.bindings.len(), "bindings restored");
    Ok(envelope.bindings)
}

/// Function bodies nest deeper than serde_json's default limit; the parser
/// caps how deep a stored tree can get.
fn parse_envelope(contents: &str) -> serde_json::Result<Envelope> {
    let mut deserializer = serde_json::Deserializer::from_str(contents);
    deserializer.disable_recursion_limit();
    let envelope = Envelope::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(envelope)
}

/// Atomically write every persistable binding to `path`.
///
/// Builtins and non-finite floats have no stable encoding and are skipped.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_bindings(path: &Path, bindings: &Bindings) -> Result<()> {
    let mut kept = BTreeMap::new();
    for (name, value) in bindings {
        if value.is_persistable() {
            kept.insert(name.as_str(), value);
        } else {
            debug!(name = %name, kind = value.type_name(), "skipping transient binding");
        }
    }
    let envelope = EnvelopeRef {
        version: BINDINGS_VERSION,
        bindings: kept,
    };
    let mut buf = serde_json::to_string_pretty(&envelope).context("serialize bindings")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Builtin;

    #[test]
    fn missing_file_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bindings = load_bindings(&temp.path().join("none.json")).expect("load");
        assert!(bindings.is_empty());
    }

    #[test]
    fn transient_values_are_dropped_on_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state/bindings.json");
        let mut bindings = Bindings::new();
        bindings.insert("n".into(), Value::Int(3));
        bindings.insert("xs".into(), Value::List(vec!["a".into(), Value::None]));
        bindings.insert("scrape_web".into(), Value::Builtin(Builtin::ScrapeWeb));
        write_bindings(&path, &bindings).expect("write");

        let loaded = load_bindings(&path).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("n"), Some(&Value::Int(3)));
        assert!(!loaded.contains_key("scrape_web"));
    }

    #[test]
    fn deeply_nested_functions_reload() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bindings.json");
        let mut src = String::from("def f(x):\n");
        for level in 1..16 {
            src.push_str(&"    ".repeat(level));
            src.push_str("if x:\n");
        }
        src.push_str(&"    ".repeat(16));
        src.push_str(&format!("return {}x{}\n", "[".repeat(25), "]".repeat(25)));
        let mut program = crate::script::parse_program(&src).expect("parse");
        let crate::script::ast::StmtKind::Def(def) = program.remove(0).kind else {
            panic!("expected def");
        };
        let mut bindings = Bindings::new();
        bindings.insert("f".into(), Value::Function(def));
        write_bindings(&path, &bindings).expect("write");

        assert_eq!(load_bindings(&path).expect("load"), bindings);
    }

    #[test]
    fn rejects_unknown_versions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bindings.json");
        fs::write(&path, r#"{"version": 9, "bindings": {}}"#).expect("write");
        let err = load_bindings(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported bindings version 9"));
    }
}
