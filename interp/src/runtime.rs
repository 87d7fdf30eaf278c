//! Wiring for CLI commands: config, persisted state, and the registry.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::handlers::{Dispatch, Registry, ScriptSession, SharedMemory, SharedSession};
use crate::io::config::{InterpConfig, write_config};
use crate::io::fetch::{HttpFetcher, WebFetcher};
use crate::io::memory_store::{load_memory, write_memory};
use crate::memory::MemoryTree;
use crate::script::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Overwrite existing config and memory files.
    pub force: bool,
}

/// Write a default config and an empty memory tree below `root` if missing.
///
/// Relative `config_path` and memory paths are resolved against `root`.
#[instrument(skip_all, fields(root = %root.display(), force = options.force))]
pub fn init_workspace(
    root: &Path,
    config_path: &Path,
    options: &InitOptions,
) -> Result<InterpConfig> {
    let config = InterpConfig::default();
    let config_path = root.join(config_path);
    if options.force || !config_path.exists() {
        write_config(&config_path, &config)?;
        info!(path = %config_path.display(), "wrote default config");
    }
    let memory_path = root.join(&config.memory_path);
    if options.force || !memory_path.exists() {
        write_memory(&memory_path, &MemoryTree::new()).context("write empty memory")?;
        info!(path = %memory_path.display(), "wrote empty memory");
    }
    Ok(config)
}

/// Live interpreter state for one process.
pub struct Runtime {
    session: SharedSession,
    memory: SharedMemory,
    memory_path: PathBuf,
    registry: Registry,
}

impl Runtime {
    /// Open with an HTTP fetcher built from `config.fetch`.
    pub fn open(config: &InterpConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.fetch)?;
        Self::with_fetcher(config, Box::new(fetcher))
    }

    pub fn with_fetcher(config: &InterpConfig, fetcher: Box<dyn WebFetcher>) -> Result<Self> {
        let session = ScriptSession::open(&config.bindings_path, fetcher, &config.script_tags)
            .context("open script session")?;
        let session = Rc::new(RefCell::new(session));
        let memory = Rc::new(RefCell::new(
            load_memory(&config.memory_path).context("open memory")?,
        ));
        let registry = Registry::standard(config, session.clone(), memory.clone())?;
        Ok(Self {
            session,
            memory,
            memory_path: config.memory_path.clone(),
            registry,
        })
    }

    pub fn dispatch(&mut self, text: &str) -> Dispatch {
        self.registry.dispatch(text)
    }

    pub fn prompt(&self) -> Result<String> {
        self.registry.prompt()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        Ok(self.session.borrow().get_variable(name)?)
    }

    /// Bind `name` to a value decoded from JSON.
    pub fn set_json(&self, name: &str, json: &str) -> Result<()> {
        let raw: serde_json::Value =
            serde_json::from_str(json).with_context(|| format!("parse value for {name}"))?;
        let value = Value::from_json(raw)?;
        self.session.borrow_mut().set_variable(name, value)
    }

    pub fn memory_outline(&self) -> String {
        self.memory.borrow().render_outline()
    }

    /// Next unfinished plan step as `<id> <first content line>`.
    pub fn next_todo(&self) -> Option<String> {
        let memory = self.memory.borrow();
        let id = memory.next_todo()?;
        let node = memory.node(id)?;
        Some(format!("{} {}", id.index(), node.content.lines().next().unwrap_or("")))
    }

    /// Mark node `index` done and save the tree.
    #[instrument(skip(self))]
    pub fn complete(&self, index: usize) -> Result<()> {
        let mut memory = self.memory.borrow_mut();
        let id = memory.lookup(index)?;
        memory.mark_success(id)?;
        info!(node = %id, "step completed");
        write_memory(&self.memory_path, &memory)
    }

    /// Context leading to node `index`, one `role/action: content` line per node.
    pub fn related(&self, index: usize) -> Result<String> {
        let memory = self.memory.borrow();
        let id = memory.lookup(index)?;
        let mut out = String::new();
        for node in memory.related_messages(id)? {
            out.push_str(&format!(
                "{}/{}: {}\n",
                node.role.label(),
                node.action,
                node.content
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::{DEFAULT_CONFIG_PATH, load_config};
    use crate::test_support::{FakeFetcher, TestWorkspace, fenced};

    #[test]
    fn init_writes_defaults_without_clobbering() {
        let ws = TestWorkspace::new().expect("workspace");
        let config_path = Path::new(DEFAULT_CONFIG_PATH);
        init_workspace(ws.path(), config_path, &InitOptions::default()).expect("init");
        assert!(ws.path().join(".interp/memory.json").exists());
        let absolute = ws.path().join(config_path);
        assert_eq!(
            load_config(&absolute).expect("config"),
            InterpConfig::default()
        );

        std::fs::write(&absolute, "max_plan_depth = 2\n").expect("edit");
        init_workspace(ws.path(), config_path, &InitOptions::default()).expect("init again");
        assert_eq!(load_config(&absolute).expect("config").max_plan_depth, 2);

        init_workspace(ws.path(), config_path, &InitOptions { force: true }).expect("force");
        assert_eq!(load_config(&absolute).expect("config").max_plan_depth, 4);
    }

    #[test]
    fn runtime_routes_blocks_and_exposes_state() {
        let ws = TestWorkspace::new().expect("workspace");
        let config = ws.config();
        let mut runtime =
            Runtime::with_fetcher(&config, Box::new(FakeFetcher::default())).expect("runtime");

        runtime.set_json("seed", "[1, 2, 3]").expect("set");
        let result = runtime.dispatch(&fenced("python", "total = sum(seed)\ntotal"));
        assert_eq!(result.handler, Some("script"));
        assert_eq!(result.output, "6\n");
        assert_eq!(runtime.get("total").expect("get"), Value::Int(6));
        assert!(runtime.get("missing").is_err());

        let plan = runtime.dispatch(&fenced("runplan", "1. a\n2. b"));
        assert_eq!(plan.handler, Some("plan"));
        assert_eq!(
            runtime.memory_outline(),
            "- [ ] system/plan: 1. a\n- [ ] system/plan: 2. b\n"
        );
    }

    #[test]
    fn plan_steps_are_walked_and_completed() {
        let ws = TestWorkspace::new().expect("workspace");
        let config = ws.config();
        let mut runtime =
            Runtime::with_fetcher(&config, Box::new(FakeFetcher::default())).expect("runtime");
        runtime.dispatch(&fenced("runplan", "1. a\n2. b"));

        assert_eq!(runtime.next_todo().as_deref(), Some("1 1. a"));
        assert_eq!(
            runtime.related(2).expect("related"),
            "system/plan: 1. a\nsystem/plan: 2. b\n"
        );
        runtime.complete(1).expect("complete");
        assert_eq!(runtime.next_todo().as_deref(), Some("2 2. b"));
        runtime.complete(2).expect("complete");
        assert_eq!(runtime.next_todo(), None);
        assert!(runtime.complete(9).is_err());
        assert!(runtime.related(9).is_err());

        let reopened =
            Runtime::with_fetcher(&config, Box::new(FakeFetcher::default())).expect("reopen");
        assert_eq!(
            reopened.memory_outline(),
            "- [x] system/plan: 1. a\n- [x] system/plan: 2. b\n"
        );
    }
}
