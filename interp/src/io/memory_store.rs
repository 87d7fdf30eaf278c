//! Memory tree load/save with schema and invariant validation.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::invariants::validate_memory_invariants;
use crate::io::config::write_atomic;
use crate::memory::MemoryTree;

const MEMORY_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/memory/v1.schema.json"
));

static VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(MEMORY_SCHEMA).expect("memory schema is valid json");
    validator_for(&schema).expect("memory schema compiles")
});

/// Load and validate a memory tree; a missing file is a fresh tree.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_memory(path: &Path) -> Result<MemoryTree> {
    if !path.exists() {
        debug!("no memory file, starting with a bare root");
        return Ok(MemoryTree::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read memory {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse memory {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate memory {}", path.display()))?;
    let tree: MemoryTree = serde_json::from_value(value)
        .with_context(|| format!("deserialize memory {}", path.display()))?;
    let errors = validate_memory_invariants(&tree);
    if !errors.is_empty() {
        return Err(anyhow!(
            "memory invariants failed in {}: {}",
            path.display(),
            errors.join("; ")
        ));
    }
    debug!(nodes = tree.node_count(), "memory restored");
    Ok(tree)
}

/// Atomically write the memory tree as pretty JSON.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_memory(path: &Path, tree: &MemoryTree) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(tree).context("serialize memory")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn validate_schema(value: &Value) -> Result<()> {
    if VALIDATOR.is_valid(value) {
        return Ok(());
    }
    let messages = VALIDATOR
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(anyhow!("memory schema validation failed: {}", messages.join("; ")))
}
