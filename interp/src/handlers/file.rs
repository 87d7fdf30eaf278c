//! File mutation handlers for both command generations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::context;
use tracing::{debug, instrument};

use crate::core::block::BlockPattern;
use crate::core::file_command::{FileCommand, FileOp, find_v2, matches_v2, parse_v1};
use crate::core::line_range::{delete_lines, read_lines, write_lines};
use crate::handlers::{Handler, HandlerOutput};
use crate::io::prompt::{PromptKind, render_prompt};

pub const WRITE_SUCCESS: &str = "write successfully";
pub const DELETE_SUCCESS: &str = "delete successfully";

/// Applies parsed commands to files below a workspace root.
#[derive(Debug, Clone)]
struct FileApplier {
    workspace: PathBuf,
}

impl FileApplier {
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    #[instrument(skip_all, fields(op = %command.op, path = %command.path))]
    fn apply(&self, command: &FileCommand) -> Result<String> {
        let path = self.resolve(&command.path);
        match command.op {
            FileOp::Write => {
                let mut lines = read_existing(&path)?;
                write_lines(&mut lines, command.range, &command.payload);
                store(&path, &lines)?;
                debug!(lines = command.payload.len(), "wrote lines");
                Ok(WRITE_SUCCESS.to_string())
            }
            FileOp::Read => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                let lines: Vec<String> = contents.lines().map(str::to_string).collect();
                Ok(read_lines(&lines, command.range))
            }
            FileOp::Delete => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
                delete_lines(&mut lines, command.range);
                store(&path, &lines)?;
                Ok(DELETE_SUCCESS.to_string())
            }
        }
    }
}

/// Lines of `path`, or none if it does not exist yet.
fn read_existing(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(contents.lines().map(str::to_string).collect())
}

fn store(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut contents = lines.join("\n");
    if !lines.is_empty() {
        contents.push('\n');
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// `###file <op> <start> <end> <path>` ... `###endfile` blocks.
pub struct FileMutatorV1 {
    applier: FileApplier,
    pattern: BlockPattern,
}

impl FileMutatorV1 {
    pub fn new(workspace: &Path) -> Self {
        Self {
            applier: FileApplier {
                workspace: workspace.to_path_buf(),
            },
            pattern: BlockPattern::legacy_file(),
        }
    }
}

impl Handler for FileMutatorV1 {
    fn name(&self) -> &'static str {
        "file_v1"
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.matches(text)
    }

    fn parse(&mut self, text: &str) -> Result<HandlerOutput> {
        let Some(block) = self.pattern.find(text)? else {
            return Ok(HandlerOutput::default());
        };
        let command = parse_v1(&block)?;
        Ok(HandlerOutput::proceed(self.applier.apply(&command)?))
    }

    fn prompt(&self) -> Result<String> {
        render_prompt(
            PromptKind::FileV1,
            context! { workspace => self.applier.workspace.display().to_string() },
        )
    }
}

/// Heredoc `file <path> <op> <start> <end> <<EOF` commands inside a fence.
pub struct FileMutatorV2 {
    applier: FileApplier,
}

impl FileMutatorV2 {
    pub fn new(workspace: &Path) -> Self {
        Self {
            applier: FileApplier {
                workspace: workspace.to_path_buf(),
            },
        }
    }
}

impl Handler for FileMutatorV2 {
    fn name(&self) -> &'static str {
        "file_v2"
    }

    fn matches(&self, text: &str) -> bool {
        matches_v2(text)
    }

    fn parse(&mut self, text: &str) -> Result<HandlerOutput> {
        let Some(command) = find_v2(text)? else {
            return Ok(HandlerOutput::default());
        };
        Ok(HandlerOutput::proceed(self.applier.apply(&command)?))
    }

    fn prompt(&self) -> Result<String> {
        render_prompt(
            PromptKind::FileV2,
            context! { workspace => self.applier.workspace.display().to_string() },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_write_read_delete_cycle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut handler = FileMutatorV1::new(temp.path());

        let write = "\n###file write 0 -1 ./data/a.py\nprint('a')\n###endfile\n";
        assert!(handler.matches(write));
        let out = handler.parse(write).expect("write");
        assert_eq!(out.output, WRITE_SUCCESS);
        assert!(!out.stop);
        assert_eq!(
            fs::read_to_string(temp.path().join("data/a.py")).expect("file"),
            "print('a')\n"
        );

        let read = handler
            .parse("###file read 0 1 ./data/a.py\n###endfile\n")
            .expect("read");
        assert_eq!(read.output, "[0]print('a')");

        let delete = handler
            .parse("###file delete 0 1 ./data/a.py\n###endfile\n")
            .expect("delete");
        assert_eq!(delete.output, DELETE_SUCCESS);
        assert_eq!(
            fs::read_to_string(temp.path().join("data/a.py")).expect("file"),
            ""
        );
    }

    #[test]
    fn delete_then_read_shifts_remaining_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("three.txt"), "one\ntwo\nthree\n").expect("seed");
        let mut handler = FileMutatorV2::new(temp.path());
        handler
            .parse("```\nfile three.txt delete 0 1\n```")
            .expect("delete");
        let out = handler
            .parse("```\nfile three.txt read 0 -1\n```")
            .expect("read");
        assert_eq!(out.output, "[0]three");
    }

    #[test]
    fn v2_heredoc_write_in_prose() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut handler = FileMutatorV2::new(temp.path());
        let text = "To save it, run:\n\n```\nfile ./data/a.txt write 0 -1 <<EOF\nChengdu is a city.\nIt has pandas.\nEOF\n```\n\n";
        assert!(handler.matches(text));
        let out = handler.parse(text).expect("write");
        assert_eq!(out.output, WRITE_SUCCESS);
        let read = handler
            .parse("```\nfile ./data/a.txt read 0 -1\n```")
            .expect("read");
        assert_eq!(read.output, "[0]Chengdu is a city.\n[1]It has pandas.");
    }

    #[test]
    fn v2_ignores_ordinary_code_blocks() {
        let handler = FileMutatorV2::new(Path::new("."));
        assert!(!handler.matches("```python\nprint('file')\n```"));
        assert!(!handler.matches("###file write 0 -1 a.txt\nx\n###endfile"));
    }

    #[test]
    fn end_before_start_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut handler = FileMutatorV1::new(temp.path());
        let err = handler
            .parse("###file read 3 1 a.txt\n###endfile\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("end line 1 is before start line 3"));
    }

    #[test]
    fn write_past_the_end_appends() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "first\n").expect("seed");
        let mut handler = FileMutatorV1::new(temp.path());
        handler
            .parse("###file write 10 -1 a.txt\nsecond\n###endfile\n")
            .expect("append");
        assert_eq!(
            fs::read_to_string(temp.path().join("a.txt")).expect("file"),
            "first\nsecond\n"
        );
    }

    #[test]
    fn prompt_names_the_workspace() {
        let handler = FileMutatorV2::new(Path::new("/srv/work"));
        assert!(handler.prompt().expect("prompt").contains("`/srv/work`"));
    }
}
