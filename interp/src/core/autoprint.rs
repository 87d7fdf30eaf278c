//! Auto-print rewrite for script blocks.
//!
//! Each source line is classified on its own (with bracket and triple-quote
//! state carried across lines). Lines classified as [`LineKind::Expression`]
//! are wrapped in `print(...)`; every other line is emitted byte-for-byte.
//! The rewrite never changes line count, and a rewritten line keeps its
//! original indentation.

/// Leading words that start a statement rather than an expression.
const STATEMENT_KEYWORDS: &[&str] = &[
    "assert", "async", "await", "break", "class", "continue", "def", "del", "elif", "else",
    "except", "finally", "for", "from", "global", "if", "import", "lambda", "nonlocal", "pass",
    "raise", "return", "try", "while", "with", "yield",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    /// Inside an open bracket or a triple-quoted string from an earlier line.
    Continuation,
    /// Starts with a statement keyword.
    Keyword,
    /// Opens a compound block (ends with `:`).
    CompoundHeader,
    Assignment,
    /// A call whose result is discarded, e.g. `print(x)` or `items.append(x)`.
    Call,
    /// Bare expression whose value would otherwise be lost.
    Expression,
}

#[derive(Debug, Default)]
struct ScanState {
    depth: usize,
    triple: Option<char>,
}

/// Wrap bare expression lines in `print(...)`.
pub fn add_print(code: &str) -> String {
    let kinds = classify_lines(code);
    code.split('\n')
        .zip(kinds)
        .map(|(line, kind)| match kind {
            LineKind::Expression => wrap_in_print(line),
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify every `\n`-separated line of `code`.
pub fn classify_lines(code: &str) -> Vec<LineKind> {
    let mut state = ScanState::default();
    code.split('\n')
        .map(|raw| {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let continued = state.depth > 0 || state.triple.is_some();
            let (code_part, _) = split_comment(line, state.triple);
            let kind = if continued {
                LineKind::Continuation
            } else {
                classify(line, code_part.trim())
            };
            scan(line, &mut state);
            kind
        })
        .collect()
}

fn classify(line: &str, code: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if code.is_empty() {
        return LineKind::Comment;
    }
    let first_word: String = code
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if STATEMENT_KEYWORDS.contains(&first_word.as_str()) {
        return LineKind::Keyword;
    }
    if code.ends_with(':') {
        return LineKind::CompoundHeader;
    }
    if has_top_level_assignment(code) {
        return LineKind::Assignment;
    }
    if is_discarded_call(code) {
        return LineKind::Call;
    }
    LineKind::Expression
}

fn wrap_in_print(raw: &str) -> String {
    let (line, cr) = match raw.strip_suffix('\r') {
        Some(stripped) => (stripped, "\r"),
        None => (raw, ""),
    };
    let indent_len = line.len() - line.trim_start().len();
    let (code, comment) = split_comment(line, None);
    let mut out = format!("{}print({})", &line[..indent_len], code.trim());
    if !comment.is_empty() {
        out.push_str("  ");
        out.push_str(comment);
    }
    out.push_str(cr);
    out
}

/// Split `line` into code and a trailing `#` comment outside string literals.
fn split_comment(line: &str, triple: Option<char>) -> (&str, &str) {
    if triple.is_some() {
        return (line, "");
    }
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '#' => return (&line[..idx], &line[idx..]),
                _ => {}
            },
        }
    }
    (line, "")
}

/// Advance bracket depth and triple-quote state over one line.
fn scan(line: &str, state: &mut ScanState) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        if let Some(t) = state.triple {
            if c == '\\' {
                i += 2;
                continue;
            }
            if is_triple(&chars, i, t) {
                state.triple = None;
                i += 3;
                continue;
            }
            i += 1;
            continue;
        }
        if let Some(q) = quote {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '#' => break,
            '\'' | '"' if is_triple(&chars, i, c) => {
                state.triple = Some(c);
                i += 3;
                continue;
            }
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => state.depth += 1,
            ')' | ']' | '}' => state.depth = state.depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
}

fn is_triple(chars: &[char], i: usize, q: char) -> bool {
    chars.len() >= i + 3 && chars[i..i + 3].iter().all(|c| *c == q)
}

/// `=` at bracket depth zero that is not part of `==`, `!=`, `<=`, `>=`.
fn has_top_level_assignment(code: &str) -> bool {
    let chars: Vec<char> = code.chars().collect();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => {
                let prev = if i > 0 { chars[i - 1] } else { ' ' };
                let next = chars.get(i + 1).copied().unwrap_or(' ');
                if next != '=' && !matches!(prev, '=' | '!' | '<' | '>') {
                    return true;
                }
                if next == '=' {
                    i += 2;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// A dotted name followed by one argument list that closes at end of line.
fn is_discarded_call(code: &str) -> bool {
    let head_len = code
        .char_indices()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
        .map(|(idx, c)| idx + c.len_utf8())
        .last()
        .unwrap_or(0);
    if head_len == 0 || !code[head_len..].starts_with('(') {
        return false;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in code[head_len..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return head_len + idx + 1 == code.len();
                }
            }
            _ => {}
        }
    }
    false
}
