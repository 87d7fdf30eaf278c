//! Shell and AppleScript blocks piped to an external interpreter.

use std::time::Duration;

use anyhow::{Context, Result};
use minijinja::context;
use tracing::instrument;

use crate::core::block::{BlockPattern, BlockTag};
use crate::handlers::{Handler, HandlerOutput};
use crate::io::config::ProcessConfig;
use crate::io::process::{ProcessRequest, run_piped};
use crate::io::prompt::{PromptKind, render_prompt};

pub const SHELL_TAGS: &[&str] = &["shell", "bash", "sh"];
pub const APPLESCRIPT_TAGS: &[&str] = &["applescript"];

pub struct ProcessHandler {
    name: &'static str,
    kind: PromptKind,
    tags: &'static [&'static str],
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    pattern: BlockPattern,
}

impl ProcessHandler {
    pub fn shell(config: &ProcessConfig) -> Result<Self> {
        Self::build(
            "shell",
            BlockTag::Shell,
            PromptKind::Shell,
            SHELL_TAGS,
            config.shell.clone(),
            config,
        )
    }

    pub fn applescript(config: &ProcessConfig) -> Result<Self> {
        Self::build(
            "applescript",
            BlockTag::AppleScript,
            PromptKind::AppleScript,
            APPLESCRIPT_TAGS,
            config.applescript.clone(),
            config,
        )
    }

    fn build(
        name: &'static str,
        tag: BlockTag,
        kind: PromptKind,
        tags: &'static [&'static str],
        argv: Vec<String>,
        config: &ProcessConfig,
    ) -> Result<Self> {
        let pattern =
            BlockPattern::fenced(tag, tags).with_context(|| format!("{name} block pattern"))?;
        Ok(Self {
            name,
            kind,
            tags,
            argv,
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            pattern,
        })
    }
}

impl Handler for ProcessHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.matches(text)
    }

    #[instrument(skip_all, fields(handler = self.name))]
    fn parse(&mut self, text: &str) -> Result<HandlerOutput> {
        let Some(block) = self.pattern.find(text)? else {
            return Ok(HandlerOutput::default());
        };
        let mut stdin = block.body;
        stdin.push('\n');
        let output = run_piped(&ProcessRequest {
            argv: &self.argv,
            stdin: &stdin,
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        })?;
        Ok(HandlerOutput::proceed(output.render()))
    }

    fn prompt(&self) -> Result<String> {
        let program = self.argv.join(" ");
        render_prompt(
            self.kind,
            context! {
                tags => self.tags,
                program => program,
                timeout_secs => self.timeout.as_secs(),
            },
        )
    }
}
