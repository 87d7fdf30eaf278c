//! Recognition of tagged blocks inside generated text.
//!
//! A block is a start line carrying a tag, a body, and an end line. Fenced
//! blocks open with three backticks followed by the tag and close with a line
//! of three backticks. The legacy file protocol uses `###file` / `###endfile`.

use std::fmt;

use regex::Regex;
use thiserror::Error;

/// Block type, which decides the handler that may consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    Script,
    Shell,
    AppleScript,
    Ask,
    Plan,
    FileV1,
    FileV2,
}

impl BlockTag {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockTag::Script => "script",
            BlockTag::Shell => "shell",
            BlockTag::AppleScript => "applescript",
            BlockTag::Ask => "ask",
            BlockTag::Plan => "plan",
            BlockTag::FileV1 => "file",
            BlockTag::FileV2 => "file",
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted block. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub tag: BlockTag,
    /// Remainder of the start line after the marker, trimmed.
    pub header: String,
    /// Text between the start and end lines, without the final newline.
    pub body: String,
}

/// Recognition errors. These are reported as output text, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("{tag} block starting at line {line} has no end marker")]
    Unterminated { tag: BlockTag, line: usize },
    #[error("malformed {tag} command: {detail}")]
    Malformed { tag: BlockTag, detail: String },
}

/// Start/end marker pair for one block type.
#[derive(Debug, Clone)]
pub struct BlockPattern {
    tag: BlockTag,
    start: Regex,
    end: Regex,
}

const FENCE_END: &str = r"(?m)^[ \t]*```[ \t\r]*$";

impl BlockPattern {
    /// Build a pattern from raw regexes. `start` may capture a `header` group.
    pub fn new(tag: BlockTag, start: &str, end: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            tag,
            start: Regex::new(start)?,
            end: Regex::new(end)?,
        })
    }

    /// Fenced block opened by any of `names` (matched literally, case-sensitive).
    pub fn fenced<S: AsRef<str>>(tag: BlockTag, names: &[S]) -> Result<Self, regex::Error> {
        let alternatives = names
            .iter()
            .map(|name| regex::escape(name.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        let start = format!(r"(?m)^[ \t]*```(?:{alternatives})[ \t\r]*$");
        Self::new(tag, &start, FENCE_END)
    }

    /// Legacy single-line `###file <op> <start> <end> <path>` command block.
    pub fn legacy_file() -> Self {
        Self::new(
            BlockTag::FileV1,
            r"(?m)^[ \t]*###file(?:[ \t]+(?P<header>[^\n]*?))?[ \t\r]*$",
            r"(?m)^[ \t]*###endfile[ \t\r]*$",
        )
        .expect("legacy file markers are valid regexes")
    }

    /// True if the start marker occurs anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.start.is_match(text)
    }

    /// Extract the first block. `Ok(None)` when no start marker is present.
    pub fn find(&self, text: &str) -> Result<Option<Block>, BlockError> {
        let Some(caps) = self.start.captures(text) else {
            return Ok(None);
        };
        let Some(marker) = caps.get(0) else {
            return Ok(None);
        };
        let header = caps
            .name("header")
            .map(|h| h.as_str().trim().to_string())
            .unwrap_or_default();
        let line = line_number(text, marker.start());

        let unterminated = BlockError::Unterminated {
            tag: self.tag,
            line,
        };
        let body_start = match text[marker.end()..].find('\n') {
            Some(offset) => marker.end() + offset + 1,
            None => return Err(unterminated),
        };
        let Some(end) = self.end.find_at(text, body_start) else {
            return Err(unterminated);
        };

        let mut body = &text[body_start..end.start()];
        body = body.strip_suffix('\n').unwrap_or(body);
        body = body.strip_suffix('\r').unwrap_or(body);

        Ok(Some(Block {
            tag: self.tag,
            header,
            body: body.to_string(),
        }))
    }
}

/// 1-based line number of byte `offset` in `text`.
pub(crate) fn line_number(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_pattern() -> BlockPattern {
        BlockPattern::fenced(BlockTag::Script, &["python"]).expect("pattern")
    }

    #[test]
    fn find_extracts_first_fenced_block_from_prose() {
        let text = "Let me check.\n```python\na = 1\n  b\n```\nand then\n```python\nc\n```\n";
        let block = script_pattern().find(text).expect("find").expect("block");
        assert_eq!(block.tag, BlockTag::Script);
        assert_eq!(block.body, "a = 1\n  b");
    }

    #[test]
    fn matches_requires_marker_at_line_start() {
        let pattern = script_pattern();
        assert!(!pattern.matches("inline ```python is not a block"));
        assert!(!pattern.matches("```pythonic\nx\n```"));
        assert!(pattern.matches("text\n  ```python\nx\n```"));
    }

    #[test]
    fn missing_end_marker_is_unterminated() {
        let err = script_pattern()
            .find("intro\n```python\nprint(1)\n")
            .unwrap_err();
        assert_eq!(
            err,
            BlockError::Unterminated {
                tag: BlockTag::Script,
                line: 2
            }
        );
    }

    #[test]
    fn empty_body_is_allowed() {
        let block = script_pattern()
            .find("```python\n```")
            .expect("find")
            .expect("block");
        assert_eq!(block.body, "");
    }

    #[test]
    fn legacy_file_block_captures_header() {
        let text = "\n###file write 0 -1 ./data/a.py\nprint('a')\n###endfile\n";
        let block = BlockPattern::legacy_file()
            .find(text)
            .expect("find")
            .expect("block");
        assert_eq!(block.header, "write 0 -1 ./data/a.py");
        assert_eq!(block.body, "print('a')");
    }

    #[test]
    fn fenced_accepts_several_names() {
        let pattern = BlockPattern::fenced(BlockTag::Shell, &["shell", "bash", "sh"]).expect("p");
        let block = pattern
            .find("```bash\necho hi\n```")
            .expect("find")
            .expect("block");
        assert_eq!(block.body, "echo hi");
    }
}
