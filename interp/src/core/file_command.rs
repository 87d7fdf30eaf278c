//! Parsing of the two file-mutation command syntaxes.
//!
//! Generation 1 is a `###file <op> <start> <end> <path>` start line with the
//! payload as block body. Generation 2 is a heredoc command placed as the
//! first line of a generic fenced block:
//!
//! ```text
//! file <path> <op> <start> <end> <<EOF
//! payload
//! EOF
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::block::{Block, BlockError, BlockTag, line_number};
use crate::core::line_range::LineRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Write,
    Read,
    Delete,
}

impl FileOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FileOp::Write => "write",
            FileOp::Read => "read",
            FileOp::Delete => "delete",
        }
    }
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(FileOp::Write),
            "read" => Ok(FileOp::Read),
            "delete" => Ok(FileOp::Delete),
            other => Err(format!("unknown operation '{other}'")),
        }
    }
}

/// A fully parsed file command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommand {
    pub path: String,
    pub op: FileOp,
    pub range: LineRange,
    /// Lines to write. Empty for read/delete.
    pub payload: Vec<String>,
}

static V1_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<op>\w+)\s+(?P<start>-?\d+)\s+(?P<end>-?\d+)\s+(?P<path>.+)$")
        .expect("v1 header regex")
});

/// Any fence line; openers and closers alternate.
static FENCE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[\w+-]*[ \t\r]*$").expect("fence line regex"));

/// Command on the first non-blank line of a fence body.
static V2_COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)\A(?:[ \t]*\r?\n)*",
        r"[ \t]*file[ \t]+(?P<path>\S+)[ \t]+(?P<op>write|read|delete)",
        r"[ \t]+(?P<start>-?\d+)[ \t]+(?P<end>-?\d+)[ \t]*(?P<heredoc><<[ \t]*EOF)?[ \t\r]*$",
    ))
    .expect("v2 command regex")
});

static HEREDOC_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*EOF[ \t\r]*$").expect("heredoc end regex"));

/// Parse a generation-1 block (header from the start line, payload from body).
pub fn parse_v1(block: &Block) -> Result<FileCommand, BlockError> {
    let malformed = |detail: String| BlockError::Malformed {
        tag: BlockTag::FileV1,
        detail,
    };
    let caps = V1_HEADER_RE
        .captures(&block.header)
        .ok_or_else(|| malformed(format!("expected '<op> <start> <end> <path>', got '{}'", block.header)))?;
    let op: FileOp = caps["op"].parse().map_err(malformed)?;
    let range = parse_range(&caps["start"], &caps["end"]).map_err(malformed)?;
    let payload = match op {
        FileOp::Write => split_payload(&block.body),
        FileOp::Read | FileOp::Delete => Vec::new(),
    };
    Ok(FileCommand {
        path: caps["path"].trim().to_string(),
        op,
        range,
        payload,
    })
}

/// True if `text` contains a generation-2 command at the top of a fence.
pub fn matches_v2(text: &str) -> bool {
    locate_v2(text).is_some()
}

/// First fence body that opens with a command, with the body's offset.
fn locate_v2(text: &str) -> Option<(usize, Captures<'_>)> {
    let mut open = false;
    for fence in FENCE_LINE_RE.find_iter(text) {
        open = !open;
        if !open {
            continue;
        }
        let Some(body) = text[fence.end()..].strip_prefix('\n') else {
            continue;
        };
        if let Some(caps) = V2_COMMAND_RE.captures(body) {
            return Some((text.len() - body.len(), caps));
        }
    }
    None
}

/// Parse the first generation-2 command in `text`.
pub fn find_v2(text: &str) -> Result<Option<FileCommand>, BlockError> {
    let Some((base, caps)) = locate_v2(text) else {
        return Ok(None);
    };
    let malformed = |detail: String| BlockError::Malformed {
        tag: BlockTag::FileV2,
        detail,
    };
    let op: FileOp = caps["op"].parse().map_err(malformed)?;
    let range = parse_range(&caps["start"], &caps["end"]).map_err(malformed)?;
    let command_end = base + caps.get(0).map_or(0, |m| m.end());

    let payload = match caps.name("heredoc") {
        Some(heredoc) => {
            let body_start = match text[command_end..].find('\n') {
                Some(offset) => command_end + offset + 1,
                None => text.len(),
            };
            let end = HEREDOC_END_RE.find_at(text, body_start).ok_or_else(|| {
                BlockError::Unterminated {
                    tag: BlockTag::FileV2,
                    line: line_number(text, base + heredoc.start()),
                }
            })?;
            let body = text[body_start..end.start()]
                .strip_suffix('\n')
                .unwrap_or(&text[body_start..end.start()]);
            split_payload(body)
        }
        None if op == FileOp::Write => {
            return Err(malformed("write requires a <<EOF payload".to_string()));
        }
        None => Vec::new(),
    };

    Ok(Some(FileCommand {
        path: caps["path"].to_string(),
        op,
        range,
        payload,
    }))
}

fn parse_range(start: &str, end: &str) -> Result<LineRange, String> {
    let start: i64 = start
        .parse()
        .map_err(|_| format!("invalid start line '{start}'"))?;
    let end: i64 = end.parse().map_err(|_| format!("invalid end line '{end}'"))?;
    LineRange::new(start, end).map_err(|err| err.to_string())
}

fn split_payload(body: &str) -> Vec<String> {
    body.lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}
