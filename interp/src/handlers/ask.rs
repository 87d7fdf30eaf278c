//! Questions for the user; the loop pauses until they answer.

use anyhow::Result;

use crate::core::block::{BlockPattern, BlockTag};
use crate::handlers::{Handler, HandlerOutput};
use crate::io::prompt::{PromptKind, render_prompt};

pub struct AskHandler {
    pattern: BlockPattern,
}

impl AskHandler {
    pub fn new() -> Self {
        Self {
            pattern: BlockPattern::fenced(BlockTag::Ask, &["ask"])
                .expect("ask fence is a valid regex"),
        }
    }
}

impl Default for AskHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for AskHandler {
    fn name(&self) -> &'static str {
        "ask"
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.matches(text)
    }

    fn parse(&mut self, text: &str) -> Result<HandlerOutput> {
        let question = self
            .pattern
            .find(text)?
            .map(|block| block.body)
            .unwrap_or_default();
        Ok(HandlerOutput::pause(question))
    }

    fn prompt(&self) -> Result<String> {
        render_prompt(PromptKind::Ask, ())
    }
}
