//! Builds statement trees from parsed logical lines.
//!
//! [`layout`](super::layout) cuts the source into lines, the
//! [`grammar`](super::grammar) parses each one, and this module nests them
//! by indentation and checks where `break`, `continue` and `return` may
//! appear.

use super::ast::{FunctionDef, Stmt, StmtKind};
use super::error::{ScriptError, ScriptResult};
use super::grammar::{Header, Line, SyntaxFault, parse_line};
use super::layout::{LogicalLine, logical_lines};

/// Indented blocks allowed inside one another.
const MAX_BLOCK_DEPTH: usize = 20;

pub fn parse_program(src: &str) -> ScriptResult<Vec<Stmt>> {
    let mut builder = Builder {
        lines: logical_lines(src)?,
        pos: 0,
        indents: vec![0],
        loops: 0,
        in_function: false,
    };
    builder.block(0)
}

struct Builder<'a> {
    lines: Vec<LogicalLine<'a>>,
    pos: usize,
    /// Indentation of every open block, outermost first.
    indents: Vec<usize>,
    /// Enclosing loops in the current function body.
    loops: usize,
    in_function: bool,
}

impl<'a> Builder<'a> {
    fn peek(&self) -> Option<LogicalLine<'a>> {
        self.lines.get(self.pos).copied()
    }

    /// Statements at exactly `indent`, up to the first line indented less.
    fn block(&mut self, indent: usize) -> ScriptResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while let Some(line) = self.peek() {
            if line.indent < indent {
                if !self.indents.contains(&line.indent) {
                    return Err(ScriptError::syntax(
                        line.number,
                        "unindent does not match any outer indentation level",
                    ));
                }
                break;
            }
            if line.indent > indent {
                return Err(ScriptError::syntax(line.number, "unexpected indent"));
            }
            self.pos += 1;
            match parse(&line)? {
                Line::Simple(kinds) => {
                    for kind in kinds {
                        body.push(self.simple(line.number, kind)?);
                    }
                }
                Line::Compound(header, inline) => {
                    body.push(self.compound(&line, header, inline)?);
                }
            }
        }
        Ok(body)
    }

    fn simple(&self, line: usize, kind: StmtKind) -> ScriptResult<Stmt> {
        let misplaced = match kind {
            StmtKind::Break if self.loops == 0 => Some("'break' outside loop"),
            StmtKind::Continue if self.loops == 0 => Some("'continue' not properly in loop"),
            StmtKind::Return(_) if !self.in_function => Some("'return' outside function"),
            _ => None,
        };
        match misplaced {
            Some(message) => Err(ScriptError::syntax(line, message)),
            None => Ok(Stmt { line, kind }),
        }
    }

    fn compound(
        &mut self,
        line: &LogicalLine<'a>,
        header: Header,
        inline: Option<Vec<StmtKind>>,
    ) -> ScriptResult<Stmt> {
        let kind = match header {
            Header::If(cond) => {
                let mut branches = vec![(cond, self.suite(line, inline)?)];
                let mut orelse = Vec::new();
                while let Some(next) = self
                    .peek()
                    .filter(|next| next.indent == line.indent && starts_branch(next.text))
                {
                    self.pos += 1;
                    match parse(&next)? {
                        Line::Compound(Header::Elif(cond), inline) => {
                            let body = self.suite(&next, inline)?;
                            branches.push((cond, body));
                        }
                        Line::Compound(Header::Else, inline) => {
                            orelse = self.suite(&next, inline)?;
                            break;
                        }
                        _ => return Err(ScriptError::syntax(next.number, "invalid syntax")),
                    }
                }
                StmtKind::If { branches, orelse }
            }
            Header::While(cond) => StmtKind::While(cond, self.loop_suite(line, inline)?),
            Header::For(target, iter) => {
                StmtKind::For(target, iter, self.loop_suite(line, inline)?)
            }
            Header::Def { name, params } => {
                let outer = (self.loops, self.in_function);
                (self.loops, self.in_function) = (0, true);
                let body = self.suite(line, inline);
                (self.loops, self.in_function) = outer;
                StmtKind::Def(FunctionDef {
                    name,
                    params,
                    body: body?,
                })
            }
            Header::Elif(_) | Header::Else => {
                return Err(ScriptError::syntax(line.number, "invalid syntax"));
            }
        };
        Ok(Stmt {
            line: line.number,
            kind,
        })
    }

    fn loop_suite(
        &mut self,
        header: &LogicalLine<'a>,
        inline: Option<Vec<StmtKind>>,
    ) -> ScriptResult<Vec<Stmt>> {
        self.loops += 1;
        let body = self.suite(header, inline);
        self.loops -= 1;
        body
    }

    /// Body of a compound statement: the statements after its colon, or the
    /// more deeply indented lines that follow.
    fn suite(
        &mut self,
        header: &LogicalLine<'a>,
        inline: Option<Vec<StmtKind>>,
    ) -> ScriptResult<Vec<Stmt>> {
        if let Some(kinds) = inline {
            return kinds
                .into_iter()
                .map(|kind| self.simple(header.number, kind))
                .collect();
        }
        let Some(first) = self.peek().filter(|next| next.indent > header.indent) else {
            let at = self.peek().map_or(header.number, |next| next.number);
            return Err(ScriptError::syntax(at, "expected an indented block"));
        };
        if self.indents.len() > MAX_BLOCK_DEPTH {
            return Err(ScriptError::syntax(
                first.number,
                "too many statically nested blocks",
            ));
        }
        self.indents.push(first.indent);
        let body = self.block(first.indent);
        self.indents.pop();
        body
    }
}

/// Whether a line at an `if`'s indentation continues it.
fn starts_branch(text: &str) -> bool {
    ["elif", "else"].into_iter().any(|word| {
        text.strip_prefix(word)
            .is_some_and(|rest| !rest.starts_with(|c: char| c == '_' || c.is_alphanumeric()))
    })
}

fn parse(line: &LogicalLine<'_>) -> ScriptResult<Line> {
    parse_line(line.text).map_err(|fault| locate(line, fault))
}

/// Turn a fault inside `line` into an error on the source line it falls on.
fn locate(line: &LogicalLine<'_>, fault: SyntaxFault) -> ScriptError {
    let rest = line.text[fault.offset..].trim_start();
    let at = line.text.len() - rest.len();
    let number = line.number + line.text[..at].matches('\n').count();
    if let Some(message) = fault.message {
        return ScriptError::syntax(number, message);
    }
    let near: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(20)
        .collect();
    if near.is_empty() {
        ScriptError::syntax(number, "invalid syntax")
    } else {
        ScriptError::syntax(number, format!("invalid syntax near '{near}'"))
    }
}
