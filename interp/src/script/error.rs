//! Script errors with a trace of the statements they passed through.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Name,
    Type,
    Value,
    Index,
    Key,
    Attribute,
    ZeroDivision,
    Overflow,
    Runtime,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Name => "NameError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Value => "ValueError",
            ErrorKind::Index => "IndexError",
            ErrorKind::Key => "KeyError",
            ErrorKind::Attribute => "AttributeError",
            ErrorKind::ZeroDivision => "ZeroDivisionError",
            ErrorKind::Overflow => "OverflowError",
            ErrorKind::Runtime => "RuntimeError",
        }
    }
}

/// One statement the error unwound through. `depth` is the call depth
/// (0 for the block itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: usize,
    pub scope: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {}", .kind.as_str(), .message)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    /// Innermost frame first.
    pub trace: Vec<TraceFrame>,
}

pub type ScriptResult<T> = Result<T, ScriptError>;

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message).at(line, "<block>", 0)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, message)
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Key, message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Attribute, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ZeroDivision, message)
    }

    pub fn overflow() -> Self {
        Self::new(ErrorKind::Overflow, "integer overflow")
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// Record the statement at `line` unless a frame for this depth exists.
    pub(crate) fn at(mut self, line: usize, scope: &str, depth: usize) -> Self {
        if !self.trace.iter().any(|frame| frame.depth == depth) {
            self.trace.push(TraceFrame {
                line,
                scope: scope.to_string(),
                depth,
            });
        }
        self
    }

    /// Human-readable report: outermost frame first, with the offending
    /// source line for frames in the block itself.
    pub fn render(&self, source: &str) -> String {
        let lines: Vec<&str> = source.lines().collect();
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in self.trace.iter().rev() {
            out.push_str(&format!("  line {}, in {}\n", frame.line, frame.scope));
            if frame.depth == 0
                && let Some(text) = frame.line.checked_sub(1).and_then(|i| lines.get(i))
            {
                out.push_str(&format!("    {}\n", text.trim()));
            }
        }
        out.push_str(&self.to_string());
        out
    }
}
