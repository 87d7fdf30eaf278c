//! Interpreter configuration stored under `.interp/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = ".interp/config.toml";

/// Interpreter configuration (TOML).
///
/// Missing fields fall back to defaults, so an empty file is valid. Relative
/// paths are resolved against the process working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InterpConfig {
    /// Root directory for relative paths in file commands.
    pub workspace: PathBuf,

    /// Where the script session persists its bindings.
    pub bindings_path: PathBuf,

    /// Where the memory tree is persisted.
    pub memory_path: PathBuf,

    /// Plans are not nested deeper than this many levels below the root.
    pub max_plan_depth: usize,

    /// Fence tags routed to the script session.
    pub script_tags: Vec<String>,

    pub process: ProcessConfig,

    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessConfig {
    pub timeout_secs: u64,

    /// Bytes kept from each of stdout and stderr.
    pub output_limit_bytes: usize,

    /// Interpreter for shell blocks; the block body is piped to its stdin.
    pub shell: Vec<String>,

    pub applescript: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            bindings_path: PathBuf::from(".interp/bindings.json"),
            memory_path: PathBuf::from(".interp/memory.json"),
            max_plan_depth: 4,
            script_tags: vec!["python".to_string()],
            process: ProcessConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            output_limit_bytes: 100_000,
            shell: vec!["bash".to_string()],
            applescript: vec!["osascript".to_string()],
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: concat!("interp/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl InterpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_plan_depth == 0 {
            return Err(anyhow!("max_plan_depth must be > 0"));
        }
        if self.script_tags.is_empty() || self.script_tags.iter().any(|t| t.trim().is_empty()) {
            return Err(anyhow!("script_tags must be a non-empty array of tags"));
        }
        if self.process.timeout_secs == 0 {
            return Err(anyhow!("process.timeout_secs must be > 0"));
        }
        if self.process.output_limit_bytes == 0 {
            return Err(anyhow!("process.output_limit_bytes must be > 0"));
        }
        if self.process.shell.is_empty() || self.process.shell[0].trim().is_empty() {
            return Err(anyhow!("process.shell must be a non-empty array"));
        }
        if self.process.applescript.is_empty() || self.process.applescript[0].trim().is_empty() {
            return Err(anyhow!("process.applescript must be a non-empty array"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(anyhow!("fetch.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `InterpConfig::default()`.
pub fn load_config(path: &Path) -> Result<InterpConfig> {
    if !path.exists() {
        let cfg = InterpConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: InterpConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &InterpConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename over it.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, InterpConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/config.toml");
        let mut cfg = InterpConfig::default();
        cfg.max_plan_depth = 2;
        cfg.script_tags.push("py".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!temp.path().join("nested/config.toml.tmp").exists());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_plan_depth = 1\n[process]\ntimeout_secs = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_plan_depth, 1);
        assert_eq!(cfg.process.timeout_secs, 5);
        assert_eq!(cfg.process.shell, vec!["bash".to_string()]);
    }

    #[test]
    fn rejects_zero_depth() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_plan_depth = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_plan_depth"));
    }
}
