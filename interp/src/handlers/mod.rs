//! Handler protocol and the priority-ordered dispatcher.
//!
//! A handler recognizes one block type in generated text (`matches`) and acts
//! on the first occurrence (`parse`), returning text for the conversation and
//! a stop flag. The [`Registry`] tries handlers in a fixed order and the first
//! match wins; text no handler recognizes is plain prose.

pub mod ask;
pub mod file;
pub mod plan;
pub mod process;
pub mod script;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::io::config::InterpConfig;
use crate::memory::MemoryTree;

pub use ask::AskHandler;
pub use file::{FileMutatorV1, FileMutatorV2};
pub use plan::PlanHandler;
pub use process::ProcessHandler;
pub use script::{ScriptSession, SessionError};

/// Session handle shared by the registry and direct get/set callers.
pub type SharedSession = Rc<RefCell<ScriptSession>>;

/// Memory tree shared by the plan handler and its readers.
pub type SharedMemory = Rc<RefCell<MemoryTree>>;

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandlerOutput {
    pub output: String,
    /// True when the caller loop must wait for external input.
    pub stop: bool,
}

impl HandlerOutput {
    pub fn proceed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            stop: false,
        }
    }

    pub fn pause(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            stop: true,
        }
    }
}

pub trait Handler {
    /// Stable name used in logs and dispatch results.
    fn name(&self) -> &'static str;

    /// True if this handler's start marker occurs in `text`.
    fn matches(&self, text: &str) -> bool;

    /// Act on the first block in `text`.
    fn parse(&mut self, text: &str) -> Result<HandlerOutput>;

    /// Instructions telling a text generator how to write this block type.
    fn prompt(&self) -> Result<String>;
}

impl<H: Handler> Handler for Rc<RefCell<H>> {
    fn name(&self) -> &'static str {
        self.borrow().name()
    }

    fn matches(&self, text: &str) -> bool {
        self.borrow().matches(text)
    }

    fn parse(&mut self, text: &str) -> Result<HandlerOutput> {
        self.borrow_mut().parse(text)
    }

    fn prompt(&self) -> Result<String> {
        self.borrow().prompt()
    }
}

/// Outcome of [`Registry::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Handler that consumed the text; `None` for plain prose.
    pub handler: Option<&'static str>,
    pub output: String,
    pub stop: bool,
}

/// Handlers in priority order.
#[derive(Default)]
pub struct Registry {
    handlers: Vec<Box<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default set, highest priority first: plan, ask, file (both
    /// generations), script, shell, AppleScript.
    pub fn standard(
        config: &InterpConfig,
        session: SharedSession,
        memory: SharedMemory,
    ) -> Result<Self> {
        Ok(Self::new()
            .with(PlanHandler::new(
                memory,
                config.max_plan_depth,
                Some(config.memory_path.clone()),
            ))
            .with(AskHandler::new())
            .with(FileMutatorV1::new(&config.workspace))
            .with(FileMutatorV2::new(&config.workspace))
            .with(session)
            .with(ProcessHandler::shell(&config.process)?)
            .with(ProcessHandler::applescript(&config.process)?))
    }

    pub fn with(mut self, handler: impl Handler + 'static) -> Self {
        self.push(handler);
        self
    }

    /// Append at the lowest priority.
    pub fn push(&mut self, handler: impl Handler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Route `text` to the first matching handler.
    ///
    /// Never fails: handler errors become `error: ...` output with the
    /// stop flag cleared.
    #[instrument(skip_all, fields(bytes = text.len()))]
    pub fn dispatch(&mut self, text: &str) -> Dispatch {
        let Some(handler) = self.handlers.iter_mut().find(|h| h.matches(text)) else {
            debug!("no handler matched, treating as prose");
            return Dispatch {
                handler: None,
                output: String::new(),
                stop: false,
            };
        };
        let name = handler.name();
        info!(handler = name, "dispatching block");
        match handler.parse(text) {
            Ok(HandlerOutput { output, stop }) => Dispatch {
                handler: Some(name),
                output,
                stop,
            },
            Err(err) => {
                warn!(handler = name, err = %format!("{err:#}"), "handler failed");
                Dispatch {
                    handler: Some(name),
                    output: format!("error: {err:#}"),
                    stop: false,
                }
            }
        }
    }

    /// Every handler's instructions, in priority order.
    pub fn prompt(&self) -> Result<String> {
        let parts = self
            .handlers
            .iter()
            .map(|h| h.prompt())
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;

    struct Fixed {
        name: &'static str,
        marker: &'static str,
        fail: bool,
    }

    impl Handler for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matches(&self, text: &str) -> bool {
            text.contains(self.marker)
        }

        fn parse(&mut self, _text: &str) -> Result<HandlerOutput> {
            if self.fail {
                bail!("{} exploded", self.name);
            }
            Ok(HandlerOutput::proceed(self.name))
        }

        fn prompt(&self) -> Result<String> {
            Ok(format!("use {}", self.marker))
        }
    }

    fn fixed(name: &'static str, marker: &'static str, fail: bool) -> Fixed {
        Fixed { name, marker, fail }
    }

    #[test]
    fn first_match_wins() {
        let mut registry = Registry::new()
            .with(fixed("a", "@a", false))
            .with(fixed("b", "@", false));
        let result = registry.dispatch("hello @a");
        assert_eq!(result.handler, Some("a"));
        assert_eq!(result.output, "a");
        assert_eq!(registry.dispatch("just @").handler, Some("b"));
    }

    #[test]
    fn prose_is_a_no_op() {
        let mut registry = Registry::new().with(fixed("a", "@a", false));
        let result = registry.dispatch("nothing to see");
        assert_eq!(result.handler, None);
        assert_eq!(result.output, "");
        assert!(!result.stop);
    }

    #[test]
    fn handler_errors_become_output() {
        let mut registry = Registry::new().with(fixed("boom", "!", true));
        let result = registry.dispatch("!");
        assert_eq!(result.output, "error: boom exploded");
        assert!(!result.stop);
    }

    #[test]
    fn shared_handlers_dispatch_through_the_handle() {
        let shared = Rc::new(RefCell::new(fixed("shared", "#", false)));
        let mut registry = Registry::new().with(shared.clone());
        assert_eq!(registry.dispatch("#").handler, Some("shared"));
        assert_eq!(shared.borrow().name(), "shared");
    }

    #[test]
    fn prompts_join_in_order() {
        let registry = Registry::new()
            .with(fixed("a", "@a", false))
            .with(fixed("b", "@b", false));
        assert_eq!(registry.prompt().expect("prompt"), "use @a\n\nuse @b");
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
