//! Splits source into logical lines.
//!
//! A logical line runs to the first newline that is outside brackets,
//! strings and backslash continuations. Blank and comment-only lines are
//! dropped. The grammar parses each line's text on its own.

use super::error::{ScriptError, ScriptResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalLine<'a> {
    /// 1-based source line of the first character.
    pub number: usize,
    /// Leading whitespace width; a tab advances to the next multiple of 8.
    pub indent: usize,
    /// Line text after the indentation, without the closing newline.
    pub text: &'a str,
}

pub fn logical_lines(src: &str) -> ScriptResult<Vec<LogicalLine<'_>>> {
    let mut scanner = Scanner {
        src,
        pos: 0,
        line: 1,
    };
    let mut lines = Vec::new();
    loop {
        let number = scanner.line;
        let indent = scanner.indentation();
        match scanner.peek() {
            None => return Ok(lines),
            Some('\n' | '\r') => {
                scanner.bump();
                continue;
            }
            Some('#') => {
                scanner.skip_comment();
                continue;
            }
            Some(_) => {}
        }
        let start = scanner.pos;
        let end = scanner.logical_end()?;
        lines.push(LogicalLine {
            number,
            indent,
            text: &src[start..end],
        });
    }
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn indentation(&mut self) -> usize {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => {}
                _ => break,
            }
            self.bump();
        }
        width
    }

    /// Stops before the newline.
    fn skip_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.bump();
        }
    }

    /// Consume one logical line and return the offset where its text ends.
    fn logical_end(&mut self) -> ScriptResult<usize> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\n' if depth == 0 => {
                    let end = self.pos;
                    self.bump();
                    return Ok(end);
                }
                '\'' | '"' => self.skip_string(c)?,
                '#' => self.skip_comment(),
                '\\' => {
                    self.bump();
                    if self.peek() == Some('\r') {
                        self.bump();
                    }
                    if self.peek() == Some('\n') {
                        self.bump();
                    }
                }
                _ => {
                    match c {
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' | '}' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    self.bump();
                }
            }
        }
        Ok(self.pos)
    }

    fn skip_string(&mut self, quote: char) -> ScriptResult<()> {
        let start_line = self.line;
        let unterminated = || ScriptError::syntax(start_line, "unterminated string literal");
        let triple = if quote == '"' { "\"\"\"" } else { "'''" };
        let long = self.src[self.pos..].starts_with(triple);
        self.pos += if long { 3 } else { 1 };
        loop {
            if long && self.src[self.pos..].starts_with(triple) {
                self.pos += 3;
                return Ok(());
            }
            match self.bump().ok_or_else(unterminated)? {
                c if c == quote && !long => return Ok(()),
                '\n' if !long => return Err(unterminated()),
                '\\' => {
                    self.bump();
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<(usize, usize, &str)> {
        logical_lines(src)
            .expect("layout")
            .into_iter()
            .map(|line| (line.number, line.indent, line.text))
            .collect()
    }

    #[test]
    fn indentation_and_blank_lines() {
        assert_eq!(
            texts("if x:\n    y = 1\n\n  # note\nz\n"),
            vec![(1, 0, "if x:"), (2, 4, "y = 1"), (5, 0, "z")]
        );
        assert_eq!(texts("\tif x:\n \t y"), vec![(1, 8, "if x:"), (2, 9, "y")]);
    }

    #[test]
    fn brackets_and_continuations_join_lines() {
        assert_eq!(
            texts("xs = [\n  1,\n\n  2]\ntotal = 1 + \\\n    2\n"),
            vec![(1, 0, "xs = [\n  1,\n\n  2]"), (5, 0, "total = 1 + \\\n    2")]
        );
    }

    #[test]
    fn strings_hide_brackets_and_comment_marks() {
        assert_eq!(
            texts("a = '(#'\nb = \"\"\"x\n)\"\"\"\nc = 1"),
            vec![(1, 0, "a = '(#'"), (2, 0, "b = \"\"\"x\n)\"\"\""), (4, 0, "c = 1")]
        );
        assert_eq!(texts("d = ')' # (\ne"), vec![(1, 0, "d = ')' # ("), (2, 0, "e")]);
    }

    #[test]
    fn unterminated_string_reports_start_line() {
        let err = logical_lines("a = 1\nb = 'open\n").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.trace[0].line, 2);

        let err = logical_lines("s = '''never\nclosed\n").unwrap_err();
        assert_eq!(err.trace[0].line, 1);
    }
}
