//! Test-only helpers: block builders, an offline fetcher, and temp workspaces.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::config::InterpConfig;
use crate::io::fetch::WebFetcher;

/// Wrap `body` in a fence tagged `tag`.
pub fn fenced(tag: &str, body: &str) -> String {
    format!("```{tag}\n{body}\n```\n")
}

/// Serves canned HTML by URL; unknown URLs fail like a network error.
#[derive(Debug, Clone, Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
}

impl FakeFetcher {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

impl WebFetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("GET {url}: no canned page"))
    }
}

/// Temporary directory holding a workspace and its persisted state.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp workspace")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Defaults with every path inside the temp dir and `sh` as the shell.
    pub fn config(&self) -> InterpConfig {
        let root = self.path();
        let mut config = InterpConfig {
            workspace: root.to_path_buf(),
            bindings_path: root.join(".interp/bindings.json"),
            memory_path: root.join(".interp/memory.json"),
            ..InterpConfig::default()
        };
        config.process.shell = vec!["sh".to_string()];
        config
    }
}
