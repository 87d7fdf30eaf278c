//! Handler instructions rendered from minijinja templates.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

const SCRIPT_TEMPLATE: &str = include_str!("prompts/script.md");
const FILE_V1_TEMPLATE: &str = include_str!("prompts/file_v1.md");
const FILE_V2_TEMPLATE: &str = include_str!("prompts/file_v2.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const ASK_TEMPLATE: &str = include_str!("prompts/ask.md");
const SHELL_TEMPLATE: &str = include_str!("prompts/shell.md");
const APPLESCRIPT_TEMPLATE: &str = include_str!("prompts/applescript.md");

/// Which handler's instructions to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Script,
    FileV1,
    FileV2,
    Plan,
    Ask,
    Shell,
    AppleScript,
}

impl PromptKind {
    fn template_name(self) -> &'static str {
        match self {
            PromptKind::Script => "script",
            PromptKind::FileV1 => "file_v1",
            PromptKind::FileV2 => "file_v2",
            PromptKind::Plan => "plan",
            PromptKind::Ask => "ask",
            PromptKind::Shell => "shell",
            PromptKind::AppleScript => "applescript",
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("script", SCRIPT_TEMPLATE),
            ("file_v1", FILE_V1_TEMPLATE),
            ("file_v2", FILE_V2_TEMPLATE),
            ("plan", PLAN_TEMPLATE),
            ("ask", ASK_TEMPLATE),
            ("shell", SHELL_TEMPLATE),
            ("applescript", APPLESCRIPT_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("prompt templates should be valid");
        }
        Self { env }
    }

    fn render<S: Serialize>(&self, kind: PromptKind, ctx: S) -> Result<String> {
        let name = kind.template_name();
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))?;
        debug!(template = name, bytes = rendered.len(), "rendered prompt");
        Ok(rendered.trim().to_string())
    }
}

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

/// Render the instructions for `kind` with a serializable context.
pub fn render_prompt<S: Serialize>(kind: PromptKind, ctx: S) -> Result<String> {
    ENGINE.render(kind, ctx)
}

#[cfg(test)]
mod tests {
    use minijinja::context;

    use super::*;

    #[test]
    fn script_prompt_lists_alternate_tags_and_names() {
        let text = render_prompt(
            PromptKind::Script,
            context! { tags => vec!["python", "py"], names => vec!["a", "total"] },
        )
        .expect("render");
        assert!(text.contains("tagged `python` (also accepted: `py`)"));
        assert!(text.contains("Names already defined: `a`, `total`."));
    }

    #[test]
    fn script_prompt_without_names_has_no_name_line() {
        let text = render_prompt(
            PromptKind::Script,
            context! { tags => vec!["python"], names => Vec::<String>::new() },
        )
        .expect("render");
        assert!(!text.contains("Names already defined"));
        assert!(!text.contains("also accepted"));
    }

    #[test]
    fn plan_prompt_names_depth() {
        let text = render_prompt(PromptKind::Plan, context! { max_depth => 3 }).expect("render");
        assert!(text.contains("at most 3 levels"));
    }
}
