//! Plan outlines inserted into the memory tree.

use std::path::PathBuf;

use anyhow::Result;
use minijinja::context;
use tracing::{info, instrument, warn};

use crate::core::block::{BlockPattern, BlockTag};
use crate::core::plan::structure_plan;
use crate::handlers::{Handler, HandlerOutput, SharedMemory};
use crate::io::memory_store::write_memory;
use crate::io::prompt::{PromptKind, render_prompt};
use crate::memory::{PLAN_ACTION, Role};

pub const PLAN_TAG: &str = "runplan";

pub struct PlanHandler {
    memory: SharedMemory,
    max_depth: usize,
    store: Option<PathBuf>,
    pattern: BlockPattern,
}

impl PlanHandler {
    /// `store`, when set, receives the tree after every insertion.
    pub fn new(memory: SharedMemory, max_depth: usize, store: Option<PathBuf>) -> Self {
        Self {
            memory,
            max_depth,
            store,
            pattern: BlockPattern::fenced(BlockTag::Plan, &[PLAN_TAG])
                .expect("plan fence is a valid regex"),
        }
    }
}

impl Handler for PlanHandler {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.matches(text)
    }

    /// Insert one node per top-level outline line under the cursor.
    ///
    /// At the depth limit nothing is inserted and the output stays empty.
    #[instrument(skip_all, fields(max_depth = self.max_depth))]
    fn parse(&mut self, text: &str) -> Result<HandlerOutput> {
        let Some(block) = self.pattern.find(text)? else {
            return Ok(HandlerOutput::default());
        };
        let mut memory = self.memory.borrow_mut();
        let anchor = memory.anchor();
        let depth = memory.depth(anchor)?;
        if depth >= self.max_depth {
            warn!(depth, anchor = %anchor, "plan depth limit reached, ignoring plan");
            return Ok(HandlerOutput::default());
        }

        let items = structure_plan(&block.body);
        for item in &items {
            memory.add_node(Role::System, PLAN_ACTION, item.content());
        }
        info!(items = items.len(), anchor = %anchor, "plan inserted");
        if let Some(path) = &self.store {
            write_memory(path, &memory)?;
        }
        Ok(HandlerOutput::default())
    }

    fn prompt(&self) -> Result<String> {
        render_prompt(PromptKind::Plan, context! { max_depth => self.max_depth })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::io::memory_store::load_memory;
    use crate::memory::MemoryTree;
    use crate::test_support::fenced;

    const OUTLINE: &str = "1.xxx\n    1.1 xxx\n\n2.xxx\n\n";

    fn memory_with_input() -> SharedMemory {
        let mut tree = MemoryTree::new();
        let input = tree.add_node(Role::User, "input", "hello world");
        tree.set_current(input).expect("cursor");
        Rc::new(RefCell::new(tree))
    }

    #[test]
    fn inserts_one_node_per_top_level_line() {
        let memory = memory_with_input();
        let mut handler = PlanHandler::new(memory.clone(), 4, None);
        let out = handler.parse(&fenced(PLAN_TAG, OUTLINE)).expect("parse");
        assert_eq!(out, HandlerOutput::default());

        let tree = memory.borrow();
        assert_eq!(tree.node_count(), 4);
        let input = tree.current().expect("cursor");
        let children = &tree.node(input).expect("input node").children;
        let contents: Vec<&str> = children
            .iter()
            .map(|id| tree.node(*id).expect("child").content.as_str())
            .collect();
        assert_eq!(contents, vec!["1.xxx\n1.1 xxx", "2.xxx"]);
    }

    #[test]
    fn refuses_plans_at_max_depth() {
        let memory = memory_with_input();
        let mut handler = PlanHandler::new(memory.clone(), 1, None);
        let out = handler.parse(&fenced(PLAN_TAG, OUTLINE)).expect("parse");
        assert_eq!(out.output, "");
        assert!(!out.stop);
        assert_eq!(memory.borrow().node_count(), 2);
    }

    #[test]
    fn flushes_to_the_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memory.json");
        let memory = memory_with_input();
        let mut handler = PlanHandler::new(memory.clone(), 4, Some(path.clone()));
        handler.parse(&fenced(PLAN_TAG, OUTLINE)).expect("parse");
        let loaded = load_memory(&path).expect("load");
        assert_eq!(loaded, *memory.borrow());
    }

    #[test]
    fn unterminated_plan_is_an_error() {
        let mut handler = PlanHandler::new(memory_with_input(), 4, None);
        let err = handler.parse("```runplan\n1. step\n").unwrap_err();
        assert!(err.to_string().contains("has no end marker"));
    }
}
