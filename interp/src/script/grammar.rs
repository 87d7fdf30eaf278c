//! nom grammar for one logical line.
//!
//! Every parser skips its own leading whitespace, comments and line
//! continuations, so combinators compose without separate token handling.
//! Committed constructs use `cut` and `context`; the innermost context
//! becomes the error message.

use std::cell::Cell;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, digit1, one_of, satisfy};
use nom::combinator::{
    all_consuming, consumed, cut, map, not, opt, peek, recognize, success, value, verify,
};
use nom::error::{ErrorKind, ParseError, VerboseError, VerboseErrorKind, context};
use nom::multi::{many0, many1, separated_list1};
use nom::sequence::{pair, preceded, separated_pair, terminated, tuple};
use nom::{Err, Finish, IResult, Offset};

use super::ast::{
    Arg, BinOp, BoolOp, CmpOp, Const, Expr, FPart, Param, StmtKind, Subscript, Target, UnaryOp,
};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Bracket, call and unary nesting allowed inside one line.
const MAX_NESTING: usize = 32;
/// Tallest expression tree, and longest operator chain.
const MAX_EXPR_DEPTH: usize = 100;

/// Words that can never be used as names.
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Statements the language recognises but does not implement.
const UNSUPPORTED: &[(&str, &str)] = &[
    ("import", "'import' is not supported"),
    ("from", "'from' is not supported"),
    ("class", "'class' is not supported"),
    ("try", "'try' is not supported"),
    ("except", "'except' is not supported"),
    ("finally", "'finally' is not supported"),
    ("with", "'with' is not supported"),
    ("lambda", "'lambda' is not supported"),
    ("global", "'global' is not supported"),
    ("nonlocal", "'nonlocal' is not supported"),
    ("del", "'del' is not supported"),
    ("yield", "'yield' is not supported"),
    ("raise", "'raise' is not supported"),
    ("assert", "'assert' is not supported"),
    ("async", "'async' is not supported"),
    ("await", "'await' is not supported"),
];

/// Where and why a line failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxFault {
    /// Byte offset into the line text.
    pub offset: usize,
    /// `None` for plain invalid syntax.
    pub message: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    If(Expr),
    Elif(Expr),
    Else,
    While(Expr),
    For(Target, Expr),
    Def { name: String, params: Vec<Param> },
}

/// One parsed logical line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Simple(Vec<StmtKind>),
    /// Header plus the statements after its colon, if any.
    Compound(Header, Option<Vec<StmtKind>>),
}

pub fn parse_line(text: &str) -> Result<Line, SyntaxFault> {
    all_consuming(terminated(line, ws))(text)
        .finish()
        .map(|(_, line)| line)
        .map_err(|err| fault(text, &err))
}

fn fault(text: &str, err: &VerboseError<&str>) -> SyntaxFault {
    let described = err.errors.iter().find_map(|(at, kind)| match kind {
        VerboseErrorKind::Context(message) => Some((*at, *message)),
        _ => None,
    });
    match described {
        Some((at, message)) => SyntaxFault {
            offset: text.offset(at),
            message: Some(message),
        },
        None => SyntaxFault {
            offset: err
                .errors
                .iter()
                .map(|(at, _)| text.offset(at))
                .max()
                .unwrap_or(0),
            message: None,
        },
    }
}

fn failure<'a>(at: &'a str, message: &'static str) -> Err<VerboseError<&'a str>> {
    Err::Failure(VerboseError {
        errors: vec![(at, VerboseErrorKind::Context(message))],
    })
}

fn mismatch(at: &str) -> Err<VerboseError<&str>> {
    Err::Error(VerboseError::from_error_kind(at, ErrorKind::Verify))
}

thread_local! {
    static NESTING: Cell<usize> = const { Cell::new(0) };
}

/// Held while parsing one nested level; released on drop.
struct Nesting;

impl Nesting {
    fn enter(at: &str) -> Result<Nesting, Err<VerboseError<&str>>> {
        NESTING.with(|depth| {
            if depth.get() >= MAX_NESTING {
                return Err(failure(at, "too many nested parentheses"));
            }
            depth.set(depth.get() + 1);
            Ok(Nesting)
        })
    }
}

impl Drop for Nesting {
    fn drop(&mut self) {
        NESTING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Whitespace, comments and backslash continuations.
fn ws(i: &str) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((
            take_while1(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n' | '\x0c')),
            recognize(pair(char('#'), take_while(|c: char| c != '\n'))),
            tag("\\\r\n"),
            tag("\\\n"),
        ))),
    )(i)
}

fn sym<'a>(c: char) -> impl FnMut(&'a str) -> PResult<'a, char> {
    preceded(ws, char(c))
}

/// Operator `text` when not followed by any of `not_before`.
fn punct<'a>(
    text: &'static str,
    not_before: &'static str,
) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(
        ws,
        terminated(tag(text), not(satisfy(move |c| not_before.contains(c)))),
    )
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(ws, terminated(tag(word), not(satisfy(is_ident_char))))
}

fn closing<'a>(close: char) -> impl FnMut(&'a str) -> PResult<'a, char> {
    let message = match close {
        ')' => "expected ')'",
        ']' => "expected ']'",
        _ => "expected '}'",
    };
    context(message, cut(sym(close)))
}

/// Comma-separated items with an optional trailing comma, through `close`.
fn comma_list<'a, T: Clone>(
    item: impl FnMut(&'a str) -> PResult<'a, T>,
    close: char,
) -> impl FnMut(&'a str) -> PResult<'a, Vec<T>> {
    terminated(
        alt((
            terminated(separated_list1(sym(','), item), opt(sym(','))),
            success(Vec::new()),
        )),
        closing(close),
    )
}

fn identifier(i: &str) -> PResult<'_, String> {
    map(
        verify(
            preceded(
                ws,
                recognize(pair(
                    satisfy(|c| c == '_' || c.is_alphabetic()),
                    take_while(is_ident_char),
                )),
            ),
            |name: &str| !KEYWORDS.contains(&name),
        ),
        str::to_string,
    )(i)
}

fn line(i: &str) -> PResult<'_, Line> {
    alt((
        map(compound, |(header, body)| Line::Compound(header, body)),
        map(simple_statements, Line::Simple),
    ))(i)
}

fn compound(i: &str) -> PResult<'_, (Header, Option<Vec<StmtKind>>)> {
    let (rest, header) = alt((
        map(preceded(keyword("if"), cut(expr)), Header::If),
        map(preceded(keyword("elif"), cut(expr)), Header::Elif),
        value(Header::Else, keyword("else")),
        map(preceded(keyword("while"), cut(expr)), Header::While),
        preceded(keyword("for"), cut(for_header)),
        preceded(keyword("def"), cut(def_header)),
    ))(i)?;
    let (rest, _) = context("expected ':'", cut(sym(':')))(rest)?;
    let (rest, body) = opt(simple_statements)(rest)?;
    Ok((rest, (header, body)))
}

fn for_header(i: &str) -> PResult<'_, Header> {
    let (rest, target) = target_list(i)?;
    let (rest, _) = context("expected 'in' in for statement", cut(keyword("in")))(rest)?;
    let (rest, iter) = cut(expr_list)(rest)?;
    Ok((rest, Header::For(target, iter)))
}

fn def_header(i: &str) -> PResult<'_, Header> {
    let (rest, name) = identifier(i)?;
    let (rest, _) = context("expected '('", cut(sym('(')))(rest)?;
    let (rest, params) = comma_list(parameter, ')')(rest)?;
    let mut defaults = false;
    for (index, param) in params.iter().enumerate() {
        if param.default.is_none() && defaults {
            return Err(failure(i, "non-default argument follows default argument"));
        }
        defaults |= param.default.is_some();
        if params[..index].iter().any(|earlier| earlier.name == param.name) {
            return Err(failure(i, "duplicate argument in function definition"));
        }
    }
    // Return annotations are parsed and dropped.
    let (rest, _) = opt(preceded(punct("->", ""), cut(expr)))(rest)?;
    Ok((rest, Header::Def { name, params }))
}

fn parameter(i: &str) -> PResult<'_, Param> {
    if alt((punct("**", ""), punct("*", "")))(i).is_ok() {
        return Err(failure(i, "variadic parameters are not supported"));
    }
    let (rest, name) = identifier(i)?;
    let (rest, _) = opt(preceded(sym(':'), cut(expr)))(rest)?;
    let (rest, default) = opt(preceded(punct("=", "="), cut(expr)))(rest)?;
    Ok((rest, Param { name, default }))
}

fn simple_statements(i: &str) -> PResult<'_, Vec<StmtKind>> {
    terminated(separated_list1(sym(';'), simple_statement), opt(sym(';')))(i)
}

fn simple_statement(i: &str) -> PResult<'_, StmtKind> {
    alt((
        value(StmtKind::Pass, keyword("pass")),
        value(StmtKind::Break, keyword("break")),
        value(StmtKind::Continue, keyword("continue")),
        map(preceded(keyword("return"), opt(expr_list)), StmtKind::Return),
        unsupported,
        expression_statement,
    ))(i)
}

fn unsupported(i: &str) -> PResult<'_, StmtKind> {
    for &(word, message) in UNSUPPORTED {
        if keyword(word)(i).is_ok() {
            return Err(failure(i, message));
        }
    }
    Err(mismatch(i))
}

fn aug_op(i: &str) -> PResult<'_, BinOp> {
    preceded(
        ws,
        alt((
            value(BinOp::FloorDiv, tag("//=")),
            value(BinOp::Pow, tag("**=")),
            value(BinOp::Add, tag("+=")),
            value(BinOp::Sub, tag("-=")),
            value(BinOp::Mul, tag("*=")),
            value(BinOp::Div, tag("/=")),
            value(BinOp::Mod, tag("%=")),
        )),
    )(i)
}

fn expression_statement(i: &str) -> PResult<'_, StmtKind> {
    let (rest, first) = expr_list(i)?;
    if let Ok((rest, op)) = aug_op(rest) {
        let target = Target::from_expr(&first)
            .ok_or_else(|| failure(i, "cannot assign to expression"))?;
        if matches!(target, Target::Tuple(_)) {
            return Err(failure(i, "illegal expression for augmented assignment"));
        }
        let (rest, value) = cut(expr_list)(rest)?;
        return Ok((rest, StmtKind::AugAssign(target, op, value)));
    }
    let (rest, mut values) = many0(preceded(punct("=", "="), cut(expr_list)))(rest)?;
    let Some(value) = values.pop() else {
        return Ok((rest, StmtKind::Expr(first)));
    };
    let targets = std::iter::once(&first)
        .chain(&values)
        .map(Target::from_expr)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| failure(i, "cannot assign to expression"))?;
    Ok((rest, StmtKind::Assign { targets, value }))
}

/// Loop targets stop before `in`, so they are parsed at postfix level.
fn target_list(i: &str) -> PResult<'_, Target> {
    let (rest, first) = postfix(i)?;
    let (rest, more) = many0(preceded(sym(','), postfix))(rest)?;
    let (rest, _) = opt(sym(','))(rest)?;
    let expr = if more.is_empty() {
        first
    } else {
        Expr::List(std::iter::once(first).chain(more).collect())
    };
    let target = Target::from_expr(&expr).ok_or_else(|| failure(i, "cannot assign to expression"))?;
    Ok((rest, target))
}

/// Expression, or a bare tuple (represented as a list).
fn expr_list(i: &str) -> PResult<'_, Expr> {
    let (rest, first) = expr(i)?;
    let (rest, more) = many0(preceded(sym(','), expr))(rest)?;
    let (rest, trailing) = opt(sym(','))(rest)?;
    if more.is_empty() && trailing.is_none() {
        return Ok((rest, first));
    }
    Ok((rest, Expr::List(std::iter::once(first).chain(more).collect())))
}

fn expr(i: &str) -> PResult<'_, Expr> {
    let _nesting = Nesting::enter(i)?;
    let (rest, then) = or_test(i)?;
    let (rest, expr) = match keyword("if")(rest) {
        Ok((rest, _)) => {
            let (rest, cond) = cut(or_test)(rest)?;
            let (rest, _) = context(
                "expected 'else' in conditional expression",
                cut(keyword("else")),
            )(rest)?;
            let (rest, orelse) = cut(expr)(rest)?;
            let expr = Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(then),
                orelse: Box::new(orelse),
            };
            (rest, expr)
        }
        Err(_) => (rest, then),
    };
    if expr.depth() > MAX_EXPR_DEPTH {
        return Err(failure(i, "expression is too deeply nested"));
    }
    Ok((rest, expr))
}

/// Left-fold `first` and `rest`, refusing chains that would nest too deep.
fn fold_chain<'a, Op>(
    at: &'a str,
    first: Expr,
    rest: Vec<(Op, Expr)>,
    join: impl Fn(Op, Expr, Expr) -> Expr,
) -> Result<Expr, Err<VerboseError<&'a str>>> {
    if rest.len() >= MAX_EXPR_DEPTH {
        return Err(failure(at, "expression is too deeply nested"));
    }
    Ok(rest
        .into_iter()
        .fold(first, |left, (op, right)| join(op, left, right)))
}

fn or_test(i: &str) -> PResult<'_, Expr> {
    let (rest, first) = and_test(i)?;
    let (rest, more) = many0(pair(value(BoolOp::Or, keyword("or")), cut(and_test)))(rest)?;
    let expr = fold_chain(i, first, more, |op, l, r| Expr::Bool(op, Box::new(l), Box::new(r)))?;
    Ok((rest, expr))
}

fn and_test(i: &str) -> PResult<'_, Expr> {
    let (rest, first) = not_test(i)?;
    let (rest, more) = many0(pair(value(BoolOp::And, keyword("and")), cut(not_test)))(rest)?;
    let expr = fold_chain(i, first, more, |op, l, r| Expr::Bool(op, Box::new(l), Box::new(r)))?;
    Ok((rest, expr))
}

fn not_test(i: &str) -> PResult<'_, Expr> {
    match keyword("not")(i) {
        Ok((rest, _)) => {
            let _nesting = Nesting::enter(i)?;
            let (rest, operand) = cut(not_test)(rest)?;
            Ok((rest, Expr::Unary(UnaryOp::Not, Box::new(operand))))
        }
        Err(_) => comparison(i),
    }
}

fn cmp_op(i: &str) -> PResult<'_, CmpOp> {
    alt((
        value(CmpOp::Eq, punct("==", "")),
        value(CmpOp::Ne, punct("!=", "")),
        value(CmpOp::Le, punct("<=", "")),
        value(CmpOp::Ge, punct(">=", "")),
        value(CmpOp::Lt, punct("<", "")),
        value(CmpOp::Gt, punct(">", "")),
        value(CmpOp::NotIn, pair(keyword("not"), keyword("in"))),
        value(CmpOp::In, keyword("in")),
        value(CmpOp::IsNot, pair(keyword("is"), keyword("not"))),
        value(CmpOp::Is, keyword("is")),
    ))(i)
}

fn comparison(i: &str) -> PResult<'_, Expr> {
    let (rest, first) = arith(i)?;
    let (rest, pairs) = many0(pair(cmp_op, cut(arith)))(rest)?;
    if pairs.is_empty() {
        return Ok((rest, first));
    }
    if pairs.len() >= MAX_EXPR_DEPTH {
        return Err(failure(i, "expression is too deeply nested"));
    }
    Ok((rest, Expr::Compare(Box::new(first), pairs)))
}

fn add_op(i: &str) -> PResult<'_, BinOp> {
    alt((
        value(BinOp::Add, punct("+", "=")),
        value(BinOp::Sub, punct("-", "=>")),
    ))(i)
}

fn mul_op(i: &str) -> PResult<'_, BinOp> {
    alt((
        value(BinOp::FloorDiv, punct("//", "=")),
        value(BinOp::Div, punct("/", "/=")),
        value(BinOp::Mod, punct("%", "=")),
        value(BinOp::Mul, punct("*", "*=")),
    ))(i)
}

fn arith(i: &str) -> PResult<'_, Expr> {
    let (rest, first) = term(i)?;
    let (rest, more) = many0(pair(add_op, cut(term)))(rest)?;
    let expr = fold_chain(i, first, more, |op, l, r| Expr::Binary(op, Box::new(l), Box::new(r)))?;
    Ok((rest, expr))
}

fn term(i: &str) -> PResult<'_, Expr> {
    let (rest, first) = factor(i)?;
    let (rest, more) = many0(pair(mul_op, cut(factor)))(rest)?;
    let expr = fold_chain(i, first, more, |op, l, r| Expr::Binary(op, Box::new(l), Box::new(r)))?;
    Ok((rest, expr))
}

fn factor(i: &str) -> PResult<'_, Expr> {
    let unary = alt((
        value(UnaryOp::Neg, punct("-", "=>")),
        value(UnaryOp::Pos, punct("+", "=")),
    ))(i);
    match unary {
        Ok((rest, op)) => {
            let _nesting = Nesting::enter(i)?;
            let (rest, operand) = cut(factor)(rest)?;
            Ok((rest, Expr::Unary(op, Box::new(operand))))
        }
        Err(_) => power(i),
    }
}

fn power(i: &str) -> PResult<'_, Expr> {
    let (rest, base) = postfix(i)?;
    match punct("**", "=")(rest) {
        Ok((after, _)) => {
            let _nesting = Nesting::enter(rest)?;
            let (after, exponent) = cut(factor)(after)?;
            Ok((after, Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent))))
        }
        Err(_) => Ok((rest, base)),
    }
}

enum Trailer {
    Call(Vec<Arg>),
    Index(Subscript),
    Method(String, Vec<Arg>),
}

fn trailer(i: &str) -> PResult<'_, Trailer> {
    alt((
        map(preceded(sym('('), cut(call_args)), Trailer::Call),
        map(preceded(sym('['), cut(subscript)), Trailer::Index),
        preceded(sym('.'), cut(method)),
    ))(i)
}

fn postfix(i: &str) -> PResult<'_, Expr> {
    let (rest, base) = atom(i)?;
    let (rest, trailers) = many0(trailer)(rest)?;
    if trailers.len() >= MAX_EXPR_DEPTH {
        return Err(failure(i, "expression is too deeply nested"));
    }
    let expr = trailers.into_iter().fold(base, |expr, trailer| match trailer {
        Trailer::Call(args) => Expr::Call(Box::new(expr), args),
        Trailer::Index(subscript) => Expr::Subscript(Box::new(expr), subscript),
        Trailer::Method(name, args) => Expr::Method(Box::new(expr), name, args),
    });
    Ok((rest, expr))
}

fn method(i: &str) -> PResult<'_, Trailer> {
    let (rest, name) = identifier(i)?;
    let (rest, _) = context(
        "attribute access is only supported for method calls",
        cut(sym('(')),
    )(rest)?;
    let (rest, args) = call_args(rest)?;
    Ok((rest, Trailer::Method(name, args)))
}

/// Arguments after the opening parenthesis, through the closing one.
fn call_args(i: &str) -> PResult<'_, Vec<Arg>> {
    let (rest, args) = comma_list(argument, ')')(i)?;
    let mut named = false;
    for arg in &args {
        if arg.name.is_none() && named {
            return Err(failure(i, "positional argument follows keyword argument"));
        }
        named |= arg.name.is_some();
    }
    Ok((rest, args))
}

fn argument(i: &str) -> PResult<'_, Arg> {
    if alt((punct("**", ""), punct("*", "")))(i).is_ok() {
        return Err(failure(i, "argument unpacking is not supported"));
    }
    alt((
        map(
            separated_pair(identifier, punct("=", "="), cut(expr)),
            |(name, value)| Arg {
                name: Some(name),
                value,
            },
        ),
        map(generator, |value| Arg { name: None, value }),
    ))(i)
}

/// Expression, or a bare comprehension as a call's argument.
fn generator(i: &str) -> PResult<'_, Expr> {
    let (rest, element) = expr(i)?;
    match keyword("for")(rest) {
        Ok((rest, _)) => comprehension(rest, element),
        Err(_) => Ok((rest, element)),
    }
}

/// Subscript after the opening bracket, through the closing one.
fn subscript(i: &str) -> PResult<'_, Subscript> {
    let (rest, start) = opt(expr_list)(i)?;
    let Ok((rest, _)) = sym(':')(rest) else {
        let (rest, _) = closing(']')(rest)?;
        return match start {
            Some(index) => Ok((rest, Subscript::Index(Box::new(index)))),
            None => Err(Err::Failure(VerboseError::from_error_kind(
                i,
                ErrorKind::Verify,
            ))),
        };
    };
    let (rest, end) = opt(expr)(rest)?;
    if sym(':')(rest).is_ok() {
        return Err(failure(rest, "slice steps are not supported"));
    }
    let (rest, _) = closing(']')(rest)?;
    Ok((rest, Subscript::Slice(start.map(Box::new), end.map(Box::new))))
}

/// `target in iter [if cond]`, after the `for` keyword.
fn comprehension(i: &str, element: Expr) -> PResult<'_, Expr> {
    let (rest, target) = cut(target_list)(i)?;
    let (rest, _) = context("expected 'in' in comprehension", cut(keyword("in")))(rest)?;
    let (rest, iter) = cut(or_test)(rest)?;
    let (rest, cond) = opt(preceded(keyword("if"), cut(or_test)))(rest)?;
    if keyword("for")(rest).is_ok() {
        return Err(failure(rest, "nested comprehensions are not supported"));
    }
    let comp = Expr::ListComp {
        element: Box::new(element),
        target,
        iter: Box::new(iter),
        cond: cond.map(Box::new),
    };
    Ok((rest, comp))
}

fn atom(i: &str) -> PResult<'_, Expr> {
    alt((
        parenthesized,
        list_display,
        dict_display,
        number,
        strings,
        value(Expr::Const(Const::None), keyword("None")),
        value(Expr::Const(Const::Bool(true)), keyword("True")),
        value(Expr::Const(Const::Bool(false)), keyword("False")),
        lambda,
        map(identifier, Expr::Name),
    ))(i)
}

fn lambda(i: &str) -> PResult<'_, Expr> {
    let (_, _) = keyword("lambda")(i)?;
    Err(failure(i, "'lambda' is not supported"))
}

enum Display {
    Single(Expr),
    Comprehension(Expr),
    Items(Vec<Expr>),
}

/// Contents of a parenthesized or bracketed display, through `close`.
fn display(i: &str, close: char) -> PResult<'_, Display> {
    if let Ok((rest, _)) = sym(close)(i) {
        return Ok((rest, Display::Items(Vec::new())));
    }
    let (rest, first) = expr(i)?;
    if let Ok((rest, _)) = keyword("for")(rest) {
        let (rest, comp) = comprehension(rest, first)?;
        let (rest, _) = closing(close)(rest)?;
        return Ok((rest, Display::Comprehension(comp)));
    }
    if let Ok((rest, _)) = sym(close)(rest) {
        return Ok((rest, Display::Single(first)));
    }
    let Ok((rest, _)) = sym(',')(rest) else {
        closing(close)(rest)?;
        return Err(mismatch(rest));
    };
    let (rest, more) = comma_list(expr, close)(rest)?;
    Ok((rest, Display::Items(std::iter::once(first).chain(more).collect())))
}

fn parenthesized(i: &str) -> PResult<'_, Expr> {
    let (rest, _) = sym('(')(i)?;
    let (rest, display) = cut(|i| display(i, ')'))(rest)?;
    let expr = match display {
        Display::Single(expr) | Display::Comprehension(expr) => expr,
        Display::Items(items) => Expr::List(items),
    };
    Ok((rest, expr))
}

fn list_display(i: &str) -> PResult<'_, Expr> {
    let (rest, _) = sym('[')(i)?;
    let (rest, display) = cut(|i| display(i, ']'))(rest)?;
    let expr = match display {
        Display::Single(expr) => Expr::List(vec![expr]),
        Display::Comprehension(expr) => expr,
        Display::Items(items) => Expr::List(items),
    };
    Ok((rest, expr))
}

fn dict_display(i: &str) -> PResult<'_, Expr> {
    let (rest, _) = sym('{')(i)?;
    map(cut(comma_list(entry, '}')), Expr::Dict)(rest)
}

fn entry(i: &str) -> PResult<'_, (Expr, Expr)> {
    let (rest, key) = expr(i)?;
    let (rest, _) = context("set literals are not supported", cut(sym(':')))(rest)?;
    let (rest, value) = cut(expr)(rest)?;
    Ok((rest, (key, value)))
}

fn digits(i: &str) -> PResult<'_, &str> {
    recognize(pair(digit1, many0(alt((digit1, tag("_"))))))(i)
}

fn exponent(i: &str) -> PResult<'_, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(i)
}

fn float_text(i: &str) -> PResult<'_, &str> {
    alt((
        recognize(tuple((
            digits,
            char('.'),
            not(satisfy(|c| c == '_' || c.is_alphabetic())),
            opt(digits),
            opt(exponent),
        ))),
        recognize(tuple((char('.'), digits, opt(exponent)))),
        recognize(pair(digits, exponent)),
    ))(i)
}

fn number(i: &str) -> PResult<'_, Expr> {
    let (i, _) = ws(i)?;
    if let Ok((rest, text)) = float_text(i) {
        let value = text
            .replace('_', "")
            .parse::<f64>()
            .map_err(|_| failure(i, "invalid number literal"))?;
        return Ok((rest, Expr::Const(Const::Float(value))));
    }
    let (rest, text) = digits(i)?;
    let value = text
        .replace('_', "")
        .parse::<i64>()
        .map_err(|_| failure(i, "integer literal is too large"))?;
    Ok((rest, Expr::Const(Const::Int(value))))
}

/// One string literal with escapes applied.
#[derive(Debug)]
struct StrToken {
    formatted: bool,
    text: String,
}

fn string_token(i: &str) -> PResult<'_, StrToken> {
    let (rest, prefix) =
        terminated(take_while(|c: char| c.is_ascii_alphabetic()), peek(one_of("'\"")))(i)?;
    let prefix = prefix.to_ascii_lowercase();
    if !matches!(
        prefix.as_str(),
        "" | "f" | "r" | "b" | "u" | "fr" | "rf" | "br" | "rb"
    ) {
        return Err(mismatch(i));
    }
    let (rest, text) = quoted(rest, prefix.contains('r'))?;
    Ok((
        rest,
        StrToken {
            formatted: prefix.contains('f'),
            text,
        },
    ))
}

/// Quoted body starting at the opening quote.
fn quoted(i: &str, raw: bool) -> PResult<'_, String> {
    let (body, quote) = one_of("'\"")(i)?;
    let triple = if quote == '"' { "\"\"\"" } else { "'''" };
    let long = i.starts_with(triple);
    let body = if long { &i[3..] } else { body };
    let unterminated = || failure(i, "unterminated string literal");

    let mut text = String::new();
    let mut chars = body.char_indices();
    while let Some((at, c)) = chars.next() {
        if long && body[at..].starts_with(triple) {
            return Ok((&body[at + 3..], text));
        }
        match c {
            c if c == quote && !long => return Ok((&body[at + 1..], text)),
            '\n' if !long => return Err(unterminated()),
            '\\' => {
                let (_, next) = chars.next().ok_or_else(unterminated)?;
                if raw {
                    text.push('\\');
                    text.push(next);
                    continue;
                }
                match next {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    '\\' | '\'' | '"' => text.push(next),
                    '\n' => {}
                    other => {
                        text.push('\\');
                        text.push(other);
                    }
                }
            }
            c => text.push(c),
        }
    }
    Err(unterminated())
}

/// Adjacent string literals concatenate; any f-string makes the result one.
fn strings(i: &str) -> PResult<'_, Expr> {
    let (rest, tokens) = many1(preceded(ws, consumed(string_token)))(i)?;
    let mut parts: Vec<FPart> = Vec::new();
    let mut formatted = false;
    for (source, token) in tokens {
        if !token.formatted {
            push_literal(&mut parts, &token.text);
            continue;
        }
        formatted = true;
        for part in fstring_parts(&token.text).map_err(|message| failure(source, message))? {
            match part {
                FPart::Lit(text) => push_literal(&mut parts, &text),
                field => parts.push(field),
            }
        }
    }
    if formatted {
        return Ok((rest, Expr::FString(parts)));
    }
    let text = match parts.pop() {
        Some(FPart::Lit(text)) => text,
        _ => String::new(),
    };
    Ok((rest, Expr::Const(Const::Str(text))))
}

fn push_literal(parts: &mut Vec<FPart>, text: &str) {
    if let Some(FPart::Lit(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FPart::Lit(text.to_string()));
    }
}

fn fstring_parts(raw: &str) -> Result<Vec<FPart>, &'static str> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("{{") {
            literal.push('{');
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix("}}") {
            literal.push('}');
            rest = after;
            continue;
        }
        match c {
            '}' => return Err("f-string: single '}' is not allowed"),
            '{' => {
                if !literal.is_empty() {
                    parts.push(FPart::Lit(std::mem::take(&mut literal)));
                }
                let (field, spec, after) = replacement_field(&rest[1..])?;
                parts.push(FPart::Expr {
                    expr: field_expression(field)?,
                    spec: spec.map(str::to_string),
                });
                rest = after;
            }
            _ => {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    if !literal.is_empty() {
        parts.push(FPart::Lit(literal));
    }
    Ok(parts)
}

/// Split a replacement field into expression text and format spec; returns
/// the text after the closing brace.
fn replacement_field(text: &str) -> Result<(&str, Option<&str>, &str), &'static str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut colon = None;
    for (at, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            '}' => {
                let (field, spec) = match colon {
                    Some(colon) => (&text[..colon], Some(&text[colon + 1..at])),
                    None => (&text[..at], None),
                };
                if spec.is_some_and(|spec| spec.contains('{')) {
                    return Err("f-string: nested format specs are not supported");
                }
                if field.trim().is_empty() {
                    return Err("f-string: empty expression not allowed");
                }
                return Ok((field, spec, &text[at + 1..]));
            }
            ':' if depth == 0 && colon.is_none() => colon = Some(at),
            '!' if depth == 0 && colon.is_none() && !text[at + 1..].starts_with('=') => {
                return Err("f-string: conversions are not supported");
            }
            _ => {}
        }
    }
    Err("f-string: expecting '}'")
}

fn field_expression(text: &str) -> Result<Expr, &'static str> {
    all_consuming(terminated(expr_list, ws))(text)
        .finish()
        .map(|(_, expr)| expr)
        .map_err(|err| fault(text, &err).message.unwrap_or("f-string: invalid syntax"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(text: &str) -> Vec<StmtKind> {
        match parse_line(text) {
            Ok(Line::Simple(kinds)) => kinds,
            other => panic!("expected simple statements for {text:?}, got {other:?}"),
        }
    }

    fn single_expr(text: &str) -> Expr {
        match simple(text).as_slice() {
            [StmtKind::Expr(expr)] => expr.clone(),
            other => panic!("expected one expression, got {other:?}"),
        }
    }

    fn int(i: i64) -> Expr {
        Expr::Const(Const::Int(i))
    }

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    #[test]
    fn operators_need_their_full_spelling() {
        assert_eq!(
            simple("a -= 1"),
            vec![StmtKind::AugAssign(Target::Name("a".into()), BinOp::Sub, int(1))]
        );
        assert_eq!(
            single_expr("a - -1"),
            Expr::Binary(
                BinOp::Sub,
                Box::new(name("a")),
                Box::new(Expr::Unary(UnaryOp::Neg, Box::new(int(1))))
            )
        );
        assert_eq!(
            single_expr("a//b"),
            Expr::Binary(BinOp::FloorDiv, Box::new(name("a")), Box::new(name("b")))
        );
        assert!(matches!(single_expr("a == b"), Expr::Compare(_, ops) if ops[0].0 == CmpOp::Eq));
        assert!(matches!(simple("a **= 2").as_slice(), [StmtKind::AugAssign(_, BinOp::Pow, _)]));
    }

    #[test]
    fn keywords_are_whole_words() {
        assert_eq!(
            simple("notice = iffy"),
            vec![StmtKind::Assign {
                targets: vec![Target::Name("notice".into())],
                value: name("iffy"),
            }]
        );
        assert!(parse_line("if = 1").is_err());
    }

    #[test]
    fn literals() {
        assert_eq!(single_expr("1_000"), int(1000));
        assert_eq!(single_expr(".5"), Expr::Const(Const::Float(0.5)));
        assert_eq!(single_expr("2.5e1"), Expr::Const(Const::Float(25.0)));
        assert_eq!(
            single_expr("'a' \"b\" r'\\n'"),
            Expr::Const(Const::Str("ab\\n".into()))
        );
        assert_eq!(
            single_expr("'''x\ny'''"),
            Expr::Const(Const::Str("x\ny".into()))
        );
        let fault = parse_line("x = 99999999999999999999").unwrap_err();
        assert_eq!(fault.message, Some("integer literal is too large"));
        assert_eq!(fault.offset, 4);
    }

    #[test]
    fn semicolons_comments_and_continuations() {
        assert_eq!(simple("a = 1; b = 2;  # done").len(), 2);
        assert_eq!(
            single_expr("(1 +  # one\n 2)"),
            Expr::Binary(BinOp::Add, Box::new(int(1)), Box::new(int(2)))
        );
        assert_eq!(
            single_expr("1 + \\\n 2"),
            Expr::Binary(BinOp::Add, Box::new(int(1)), Box::new(int(2)))
        );
    }

    #[test]
    fn compound_headers_with_inline_bodies() {
        assert_eq!(
            parse_line("while n: n -= 1"),
            Ok(Line::Compound(
                Header::While(name("n")),
                Some(vec![StmtKind::AugAssign(
                    Target::Name("n".into()),
                    BinOp::Sub,
                    int(1)
                )])
            ))
        );
        let Ok(Line::Compound(Header::Def { name, params }, None)) =
            parse_line("def area(w: float, h=2) -> float:")
        else {
            panic!("expected def header");
        };
        assert_eq!(name, "area");
        assert_eq!(params[1].default, Some(int(2)));
    }

    #[test]
    fn faults_carry_messages_and_offsets() {
        let fault = parse_line("if x").unwrap_err();
        assert_eq!(fault.message, Some("expected ':'"));
        assert_eq!(fault.offset, 4);

        let fault = parse_line("f(a=1, b)").unwrap_err();
        assert_eq!(fault.message, Some("positional argument follows keyword argument"));

        let fault = parse_line("def f(a, a): pass").unwrap_err();
        assert_eq!(fault.message, Some("duplicate argument in function definition"));

        let fault = parse_line("{1, 2}").unwrap_err();
        assert_eq!(fault.message, Some("set literals are not supported"));

        let fault = parse_line("x = 1 2").unwrap_err();
        assert_eq!(fault.message, None);
        assert_eq!(&"x = 1 2"[fault.offset..], "2");
    }

    #[test]
    fn fstring_fields_report_their_own_errors() {
        for (text, message) in [
            ("f'{x!r}'", "f-string: conversions are not supported"),
            ("f'{}'", "f-string: empty expression not allowed"),
            ("f'{x'", "f-string: expecting '}'"),
            ("f'a}'", "f-string: single '}' is not allowed"),
            ("f'{x:{w}}'", "f-string: nested format specs are not supported"),
            ("f'{1 +}'", "f-string: invalid syntax"),
        ] {
            assert_eq!(parse_line(text).unwrap_err().message, Some(message), "{text}");
        }
        assert_eq!(parse_line("x = f'{}'").unwrap_err().offset, 4);
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let fault = parse_line(&deep).unwrap_err();
        assert_eq!(fault.message, Some("too many nested parentheses"));

        let ok = format!("{}1{}", "[".repeat(20), "]".repeat(20));
        assert!(parse_line(&ok).is_ok());

        let unary = format!("x = {}1", "-".repeat(50_000));
        assert_eq!(
            parse_line(&unary).unwrap_err().message,
            Some("too many nested parentheses")
        );

        let chain = format!("x = 1{}", " + 1".repeat(50_000));
        assert_eq!(
            parse_line(&chain).unwrap_err().message,
            Some("expression is too deeply nested")
        );

        let trailers = format!("x = a{}", "[0]".repeat(50_000));
        assert_eq!(
            parse_line(&trailers).unwrap_err().message,
            Some("expression is too deeply nested")
        );
    }
}
