//! Persistent script session for `python`-tagged blocks.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::context;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::autoprint::add_print;
use crate::core::block::{BlockPattern, BlockTag};
use crate::handlers::{Handler, HandlerOutput};
use crate::io::bindings_store::{load_bindings, write_bindings};
use crate::io::fetch::{WebFetcher, parse_page};
use crate::io::prompt::{PromptKind, render_prompt};
use crate::script::{self, Bindings, Builtin, Host, Value, dedent};

/// Binding name under which the web helper is injected.
pub const SCRAPE_WEB: &str = "scrape_web";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("name '{0}' is not defined")]
    KeyNotFound(String),
}

/// Script interpreter whose bindings survive across blocks and restarts.
///
/// Bindings are flushed to `path` after every successful run and on every
/// `set_variable`.
pub struct ScriptSession {
    path: PathBuf,
    bindings: Bindings,
    fetcher: Box<dyn WebFetcher>,
    pattern: BlockPattern,
    tags: Vec<String>,
}

impl ScriptSession {
    /// Restore bindings from `path` (if present) and inject `scrape_web`.
    #[instrument(skip(fetcher, tags), fields(path = %path.display()))]
    pub fn open(path: &Path, fetcher: Box<dyn WebFetcher>, tags: &[String]) -> Result<Self> {
        let mut bindings = load_bindings(path)?;
        bindings.insert(SCRAPE_WEB.to_string(), Value::Builtin(Builtin::ScrapeWeb));
        let pattern = BlockPattern::fenced(BlockTag::Script, tags)
            .with_context(|| format!("script tags {tags:?}"))?;
        Ok(Self {
            path: path.to_path_buf(),
            bindings,
            fetcher,
            pattern,
            tags: tags.to_vec(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_variable(&self, name: &str) -> Result<Value, SessionError> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::KeyNotFound(name.to_string()))
    }

    /// Bind `name` and flush the table.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<()> {
        self.bindings
            .insert(name.to_string(), value.within_nesting()?);
        self.flush()
    }

    /// User-visible binding names, sorted; builtins are left out.
    pub fn names(&self) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|(_, value)| !matches!(value, Value::Builtin(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Run extracted code and return everything it printed.
    ///
    /// Errors are rendered into the returned text after any output produced
    /// before the failure.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn run(&mut self, code: &str) -> String {
        let source = add_print(&dedent(code));
        let mut out = String::new();
        let host = FetchHost {
            fetcher: self.fetcher.as_ref(),
        };
        match script::run(&source, &mut self.bindings, &mut out, &host) {
            Ok(()) => {
                debug!(bytes = out.len(), "script finished");
                if let Err(err) = self.flush() {
                    warn!(err = %format!("{err:#}"), "failed to save bindings");
                    push_line(&mut out, &format!("[bindings not saved: {err:#}]"));
                }
            }
            Err(err) => {
                debug!(kind = err.kind.as_str(), "script raised");
                push_line(&mut out, &err.render(&source));
            }
        }
        out
    }

    fn flush(&self) -> Result<()> {
        write_bindings(&self.path, &self.bindings)
    }
}

impl Handler for ScriptSession {
    fn name(&self) -> &'static str {
        "script"
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.matches(text)
    }

    fn parse(&mut self, text: &str) -> Result<HandlerOutput> {
        match self.pattern.find(text)? {
            Some(block) => Ok(HandlerOutput::proceed(self.run(&block.body))),
            None => Ok(HandlerOutput::default()),
        }
    }

    fn prompt(&self) -> Result<String> {
        render_prompt(
            PromptKind::Script,
            context! { tags => &self.tags, names => self.names() },
        )
    }
}

/// Bridges `scrape_web` calls to the session's fetcher.
struct FetchHost<'a> {
    fetcher: &'a dyn WebFetcher,
}

impl Host for FetchHost<'_> {
    fn scrape_web(&self, url: &str) -> Result<Value> {
        let html = self.fetcher.fetch(url)?;
        Ok(parse_page(&html).into_value())
    }
}

fn push_line(out: &mut String, text: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeFetcher, fenced};

    fn open(dir: &Path) -> ScriptSession {
        ScriptSession::open(
            &dir.join("bindings.json"),
            Box::new(FakeFetcher::default()),
            &["python".to_string()],
        )
        .expect("open session")
    }

    #[test]
    fn prints_are_captured() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = open(temp.path());
        let result = session
            .parse(&fenced("python", "print(\"hello world\")"))
            .expect("parse");
        assert_eq!(result.output.trim(), "hello world");
        assert!(!result.stop);
    }

    #[test]
    fn seeded_variables_are_updated_in_place() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = open(temp.path());
        session.set_variable("a", Value::Int(10)).expect("set");
        session.parse(&fenced("python", "a += 1")).expect("parse");
        assert_eq!(session.get_variable("a"), Ok(Value::Int(11)));
        session.parse(&fenced("python", "a += 1")).expect("parse");
        assert_eq!(session.get_variable("a"), Ok(Value::Int(12)));
    }

    #[test]
    fn overly_nested_values_are_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = open(temp.path());
        let mut deep = Value::Int(0);
        for _ in 0..40 {
            deep = Value::List(vec![deep]);
        }
        assert!(session.set_variable("deep", deep).is_err());
        assert!(session.get_variable("deep").is_err());
    }

    #[test]
    fn bare_expressions_are_echoed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = open(temp.path());
        let out = session.run("xs = [1, 2]\nxs\nlen(xs) * 10\n");
        assert_eq!(out, "[1, 2]\n20\n");
    }

    #[test]
    fn errors_keep_earlier_output_and_bindings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = open(temp.path());
        let out = session.run("print('before')\nb = 2\nmissing + 1\n");
        assert!(out.starts_with("before\nTraceback"), "{out}");
        assert!(out.ends_with("NameError: name 'missing' is not defined"), "{out}");
        assert_eq!(session.get_variable("b"), Ok(Value::Int(2)));
    }

    #[test]
    fn missing_names_are_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = open(temp.path());
        assert_eq!(
            session.get_variable("nope"),
            Err(SessionError::KeyNotFound("nope".to_string()))
        );
    }

    #[test]
    fn scrape_web_uses_the_fetcher() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fetcher = FakeFetcher::default().with_page(
            "https://www.google.com",
            "<html><head><title>Google</title></head><body>Search</body></html>",
        );
        let mut session = ScriptSession::open(
            &temp.path().join("bindings.json"),
            Box::new(fetcher),
            &["python".to_string()],
        )
        .expect("open");
        session.run("url = 'https://www.google.com'\nresult = scrape_web(url)\ntitle = result[0]\n");
        assert_eq!(session.get_variable("title"), Ok(Value::from("Google")));
    }

    #[test]
    fn state_survives_reopening() {
        let temp = tempfile::tempdir().expect("tempdir");
        {
            let mut session = open(temp.path());
            session.run("def double(n):\n    return n * 2\ntotal = double(21)\n");
            session.set_variable("label", Value::from("answer")).expect("set");
        }
        let mut session = open(temp.path());
        assert_eq!(session.get_variable("total"), Ok(Value::Int(42)));
        assert_eq!(session.get_variable("label"), Ok(Value::from("answer")));
        assert_eq!(session.run("double(total) + 0"), "84\n");
        assert_eq!(session.names(), vec!["double", "label", "total"]);
    }

    #[test]
    fn prompt_lists_defined_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = open(temp.path());
        session.run("count = 3");
        let prompt = session.prompt().expect("prompt");
        assert!(prompt.contains("`count`"));
        assert!(!prompt.contains("`scrape_web`,"));
    }
}
