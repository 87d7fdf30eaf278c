//! Operators, comparisons, and indexing over [`Value`].

use std::cmp::Ordering;

use super::ast::{BinOp, CmpOp, UnaryOp};
use super::error::{ScriptError, ScriptResult};
use super::value::{Value, format_float};

/// Integer view; bools count as 0/1.
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(x) => Some(*x),
        other => as_int(other).map(|i| i as f64),
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

pub fn unary(op: UnaryOp, operand: &Value) -> ScriptResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Float(x) => Ok(Value::Float(-x)),
            other => as_int(other)
                .map(|i| i.checked_neg().map(Value::Int).ok_or_else(ScriptError::overflow))
                .unwrap_or_else(|| {
                    Err(ScriptError::type_error(format!(
                        "bad operand type for unary -: '{}'",
                        other.type_name()
                    )))
                }),
        },
        UnaryOp::Pos => match operand {
            Value::Float(x) => Ok(Value::Float(*x)),
            other => as_int(other).map(Value::Int).ok_or_else(|| {
                ScriptError::type_error(format!(
                    "bad operand type for unary +: '{}'",
                    other.type_name()
                ))
            }),
        },
    }
}

pub fn binary(op: BinOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len())?;
            return Ok(Value::Str(format!("{a}{b}")));
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            check_len(a.len() + b.len())?;
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            return Ok(Value::List(joined));
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if as_int(n).is_some() => {
            let count = repeat_count(as_int(n).unwrap_or(0), s.len())?;
            return Ok(Value::Str(s.repeat(count)));
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if as_int(n).is_some() =>
        {
            let count = repeat_count(as_int(n).unwrap_or(0), items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            return Ok(Value::List(out));
        }
        (BinOp::Mod, Value::Str(_), _) => {
            return Err(ScriptError::type_error(
                "printf-style formatting is not supported; use an f-string",
            ));
        }
        _ => {}
    }

    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return int_binary(op, a, b);
    }
    match (as_float(left), as_float(right)) {
        (Some(a), Some(b)) => float_binary(op, a, b),
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

/// Longest string (in bytes) or list a single operation may build.
const MAX_SEQUENCE_LEN: usize = 10_000_000;

/// Reject results longer than [`MAX_SEQUENCE_LEN`].
pub fn check_len(len: usize) -> ScriptResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(ScriptError::runtime("result is too large"));
    }
    Ok(())
}

fn repeat_count(n: i64, unit: usize) -> ScriptResult<usize> {
    let count = usize::try_from(n.max(0)).map_err(|_| ScriptError::overflow())?;
    if unit.saturating_mul(count) > MAX_SEQUENCE_LEN {
        return Err(ScriptError::runtime("repetition result is too large"));
    }
    Ok(count)
}

fn int_binary(op: BinOp, a: i64, b: i64) -> ScriptResult<Value> {
    let checked = |result: Option<i64>| result.map(Value::Int).ok_or_else(ScriptError::overflow);
    match op {
        BinOp::Add => checked(a.checked_add(b)),
        BinOp::Sub => checked(a.checked_sub(b)),
        BinOp::Mul => checked(a.checked_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(ScriptError::zero_division("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(ScriptError::zero_division("integer division or modulo by zero"));
            }
            let q = a.checked_div(b).ok_or_else(ScriptError::overflow)?;
            let q = if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q };
            Ok(Value::Int(q))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(ScriptError::zero_division("integer division or modulo by zero"));
            }
            let r = a.checked_rem(b).ok_or_else(ScriptError::overflow)?;
            Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ScriptError::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| ScriptError::overflow())?;
            checked(a.checked_pow(exp))
        }
    }
}

fn float_binary(op: BinOp, a: f64, b: f64) -> ScriptResult<Value> {
    let zero = || ScriptError::zero_division("float division by zero");
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero());
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero());
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ScriptError::zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ScriptError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(value))
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (Value::None, Value::None) => true,
        (Value::Function(x), Value::Function(y)) => x == y,
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        _ => match (as_float(a), as_float(b)) {
            (Some(x), Some(y)) => {
                if let (Some(i), Some(j)) = (as_int(a), as_int(b)) {
                    i == j
                } else {
                    x == y
                }
            }
            _ => false,
        },
    }
}

pub fn ordering(a: &Value, b: &Value) -> ScriptResult<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = ordering(l, r)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => {
            if let (Some(i), Some(j)) = (as_int(a), as_int(b)) {
                return Ok(i.cmp(&j));
            }
            match (as_float(a), as_float(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                    ScriptError::value("cannot order NaN")
                }),
                _ => Err(ScriptError::type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    }
}

pub fn contains(container: &Value, item: &Value) -> ScriptResult<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(ScriptError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Dict(map) => match item {
            Value::Str(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> ScriptResult<bool> {
    Ok(match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt => ordering(left, right)? == Ordering::Less,
        CmpOp::Le => ordering(left, right)? != Ordering::Greater,
        CmpOp::Gt => ordering(left, right)? == Ordering::Greater,
        CmpOp::Ge => ordering(left, right)? != Ordering::Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => identical(left, right),
        CmpOp::IsNot => !identical(left, right),
    })
}

/// Values have no identity, so `is` holds for equal singletons and scalars.
fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => false,
    }
}

/// Items yielded by a `for` loop over `value`.
pub fn iterate(value: &Value) -> ScriptResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(map) => Ok(map.keys().cloned().map(Value::Str).collect()),
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn resolve_index(index: i64, len: usize, kind: &str) -> ScriptResult<usize> {
    let len = i64::try_from(len).map_err(|_| ScriptError::overflow())?;
    let adjusted = if index < 0 { index + len } else { index };
    if (0..len).contains(&adjusted) {
        Ok(adjusted as usize)
    } else {
        Err(ScriptError::index(format!("{kind} index out of range")))
    }
}

fn index_of(index: &Value) -> ScriptResult<i64> {
    as_int(index).ok_or_else(|| {
        ScriptError::type_error(format!(
            "indices must be integers, not {}",
            index.type_name()
        ))
    })
}

fn dict_key(key: &Value) -> ScriptResult<&str> {
    match key {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::type_error(format!(
            "dict keys must be str, not {}",
            other.type_name()
        ))),
    }
}

pub fn get_item(base: &Value, index: &Value) -> ScriptResult<Value> {
    match base {
        Value::List(items) => {
            let i = resolve_index(index_of(index)?, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(index_of(index)?, chars.len(), "string")?;
            Ok(Value::Str(chars[i].to_string()))
        }
        Value::Dict(map) => {
            let key = dict_key(index)?;
            map.get(key)
                .cloned()
                .ok_or_else(|| ScriptError::key(format!("'{key}'")))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_item(base: &mut Value, index: &Value, value: Value) -> ScriptResult<()> {
    match base {
        Value::List(items) => {
            let i = resolve_index(index_of(index)?, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(map) => {
            map.insert(dict_key(index)?.to_string(), value);
            Ok(())
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn clamp_bound(bound: Option<i64>, len: usize, default: usize) -> usize {
    match bound {
        None => default,
        Some(b) if b < 0 => len.saturating_sub(b.unsigned_abs() as usize),
        Some(b) => (b as usize).min(len),
    }
}

pub fn slice(base: &Value, start: Option<&Value>, end: Option<&Value>) -> ScriptResult<Value> {
    let start = start.map(index_of).transpose()?;
    let end = end.map(index_of).transpose()?;
    match base {
        Value::List(items) => {
            let s = clamp_bound(start, items.len(), 0);
            let e = clamp_bound(end, items.len(), items.len());
            Ok(Value::List(if s < e { items[s..e].to_vec() } else { Vec::new() }))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let s = clamp_bound(start, chars.len(), 0);
            let e = clamp_bound(end, chars.len(), chars.len());
            Ok(Value::Str(if s < e {
                chars[s..e].iter().collect()
            } else {
                String::new()
            }))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not sliceable",
            other.type_name()
        ))),
    }
}

/// Apply an f-string format spec such as `.2f`, `>8`, or `,`.
pub fn format_spec(value: &Value, spec: &str) -> ScriptResult<String> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let bad = || ScriptError::value(format!("invalid format specifier '{spec}'"));
    let mut chars = spec.chars().peekable();

    let mut align = None;
    let mut fill = ' ';
    let rest: Vec<char> = spec.chars().collect();
    if rest.len() >= 2 && matches!(rest[1], '<' | '>' | '^') {
        fill = rest[0];
        align = Some(rest[1]);
        chars.next();
        chars.next();
    } else if matches!(rest[0], '<' | '>' | '^') {
        align = Some(rest[0]);
        chars.next();
    }

    let mut zero_pad = false;
    if chars.peek() == Some(&'0') {
        zero_pad = true;
        chars.next();
    }
    let mut width = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        width.push(c);
        chars.next();
    }
    let grouping = chars.peek() == Some(&',');
    if grouping {
        chars.next();
    }
    let mut precision = None;
    if chars.peek() == Some(&'.') {
        chars.next();
        let mut digits = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(c);
            chars.next();
        }
        if digits.is_empty() {
            return Err(bad());
        }
        precision = Some(spec_number(&digits)?);
    }
    let kind = chars.next();
    if chars.next().is_some() {
        return Err(bad());
    }

    let body = match kind {
        Some('f') | Some('F') => {
            let x = as_float(value).ok_or_else(bad)?;
            format!("{:.*}", precision.unwrap_or(6), x)
        }
        Some('%') => {
            let x = as_float(value).ok_or_else(bad)?;
            format!("{:.*}%", precision.unwrap_or(6), x * 100.0)
        }
        Some('d') => as_int(value).ok_or_else(bad)?.to_string(),
        Some('s') => value.to_string(),
        None => match (value, precision) {
            (Value::Float(x), Some(p)) => format!("{x:.p$}"),
            (Value::Float(x), None) => format_float(*x),
            (Value::Str(s), Some(p)) => s.chars().take(p).collect(),
            (other, _) => other.to_string(),
        },
        Some(_) => return Err(bad()),
    };
    let body = if grouping { group_thousands(&body) } else { body };

    let width = if width.is_empty() {
        0
    } else {
        spec_number(&width)?
    };
    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    if zero_pad && align.is_none() && numeric {
        let (sign, digits) = body
            .strip_prefix('-')
            .map_or(("", body.as_str()), |d| ("-", d));
        return Ok(format!("{sign}{}{digits}", "0".repeat(pad)));
    }
    let fill_str = |n: usize| fill.to_string().repeat(n);
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '>' => format!("{}{body}", fill_str(pad)),
        '^' => format!("{}{body}{}", fill_str(pad / 2), fill_str(pad - pad / 2)),
        _ => format!("{body}{}", fill_str(pad)),
    })
}

/// Width or precision from a format spec, bounded like any other result.
fn spec_number(digits: &str) -> ScriptResult<usize> {
    let too_many = || ScriptError::value("Too many decimal digits in format string");
    let n: usize = digits.parse().map_err(|_| too_many())?;
    if n > MAX_SEQUENCE_LEN {
        return Err(too_many());
    }
    Ok(n)
}

fn group_thousands(number: &str) -> String {
    let (sign, rest) = number
        .strip_prefix('-')
        .map_or(("", number), |r| ("-", r));
    let (int_part, frac) = match rest.find('.') {
        Some(dot) => (&rest[..dot], &rest[dot..]),
        None => (rest, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}{frac}")
}
