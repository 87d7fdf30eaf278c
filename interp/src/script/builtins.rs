//! Built-in functions available to every block.

use super::ast::BinOp;
use super::error::{ScriptError, ScriptResult};
use super::eval::Host;
use super::methods::sort_values;
use super::ops::{as_float, as_int, binary, iterate, ordering};
use super::value::Value;

/// Upper bound on `range()` length.
const MAX_RANGE_LEN: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Int,
    Float,
    Bool,
    Range,
    List,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Round,
    Type,
    Enumerate,
    /// Injected into the bindings by the session rather than resolved by name.
    ScrapeWeb,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "bool" => Builtin::Bool,
            "range" => Builtin::Range,
            "list" => Builtin::List,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sum" => Builtin::Sum,
            "sorted" => Builtin::Sorted,
            "round" => Builtin::Round,
            "type" => Builtin::Type,
            "enumerate" => Builtin::Enumerate,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Range => "range",
            Builtin::List => "list",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Sorted => "sorted",
            Builtin::Round => "round",
            Builtin::Type => "type",
            Builtin::Enumerate => "enumerate",
            Builtin::ScrapeWeb => "scrape_web",
        }
    }
}

fn expect_args(builtin: Builtin, args: &[Value], min: usize, max: usize) -> ScriptResult<()> {
    if args.len() < min || args.len() > max {
        return Err(ScriptError::type_error(format!(
            "{}() takes {} argument(s) ({} given)",
            builtin.name(),
            if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            },
            args.len()
        )));
    }
    Ok(())
}

fn reject_kwargs(builtin: Builtin, kwargs: &[(String, Value)]) -> ScriptResult<()> {
    match kwargs.first() {
        Some((name, _)) => Err(ScriptError::type_error(format!(
            "{}() got an unexpected keyword argument '{name}'",
            builtin.name()
        ))),
        None => Ok(()),
    }
}

pub fn call(
    builtin: Builtin,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    out: &mut String,
    host: &dyn Host,
) -> ScriptResult<Value> {
    if builtin != Builtin::Print {
        reject_kwargs(builtin, &kwargs)?;
    }
    match builtin {
        Builtin::Print => print(args, kwargs, out),
        Builtin::Len => {
            expect_args(builtin, &args, 1, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Dict(map) => map.len(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(n as i64))
        }
        Builtin::Str => {
            expect_args(builtin, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(Value::to_string).unwrap_or_default()))
        }
        Builtin::Int => {
            expect_args(builtin, &args, 1, 1)?;
            to_int(&args[0])
        }
        Builtin::Float => {
            expect_args(builtin, &args, 1, 1)?;
            to_float(&args[0])
        }
        Builtin::Bool => {
            expect_args(builtin, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
        Builtin::Range => range(&args),
        Builtin::List => {
            expect_args(builtin, &args, 0, 1)?;
            match args.first() {
                Some(v) => Ok(Value::List(iterate(v)?)),
                None => Ok(Value::List(Vec::new())),
            }
        }
        Builtin::Abs => {
            expect_args(builtin, &args, 1, 1)?;
            match &args[0] {
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => as_int(other)
                    .ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "bad operand type for abs(): '{}'",
                            other.type_name()
                        ))
                    })?
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(ScriptError::overflow),
            }
        }
        Builtin::Min | Builtin::Max => extremum(builtin, args),
        Builtin::Sum => {
            expect_args(builtin, &args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            for item in iterate(&args[0])? {
                total = binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Sorted => {
            expect_args(builtin, &args, 1, 1)?;
            let mut items = iterate(&args[0])?;
            sort_values(&mut items)?;
            Ok(Value::List(items))
        }
        Builtin::Round => round(&args),
        Builtin::Type => {
            expect_args(builtin, &args, 1, 1)?;
            Ok(Value::Str(format!("<class '{}'>", args[0].type_name())))
        }
        Builtin::Enumerate => {
            expect_args(builtin, &args, 1, 1)?;
            Ok(Value::List(
                iterate(&args[0])?
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::List(vec![Value::Int(i as i64), v]))
                    .collect(),
            ))
        }
        Builtin::ScrapeWeb => {
            expect_args(builtin, &args, 1, 1)?;
            let Value::Str(url) = &args[0] else {
                return Err(ScriptError::type_error("scrape_web() expects a URL string"));
            };
            host.scrape_web(url)
                .map_err(|err| ScriptError::runtime(format!("scrape_web failed: {err:#}")))
        }
    }
}

fn print(args: Vec<Value>, kwargs: Vec<(String, Value)>, out: &mut String) -> ScriptResult<Value> {
    let mut sep = " ".to_string();
    let mut end = "\n".to_string();
    for (name, value) in kwargs {
        let text = match value {
            Value::None => None,
            Value::Str(s) => Some(s),
            other => {
                return Err(ScriptError::type_error(format!(
                    "{name} must be None or a string, not {}",
                    other.type_name()
                )));
            }
        };
        match name.as_str() {
            "sep" => sep = text.unwrap_or_else(|| " ".to_string()),
            "end" => end = text.unwrap_or_else(|| "\n".to_string()),
            _ => {
                return Err(ScriptError::type_error(format!(
                    "print() got an unexpected keyword argument '{name}'"
                )));
            }
        }
    }
    let parts: Vec<String> = args.iter().map(Value::to_string).collect();
    out.push_str(&parts.join(&sep));
    out.push_str(&end);
    Ok(Value::None)
}

fn to_int(value: &Value) -> ScriptResult<Value> {
    match value {
        Value::Float(x) => {
            if !x.is_finite() || x.abs() >= 9.2e18 {
                return Err(ScriptError::overflow());
            }
            Ok(Value::Int(x.trunc() as i64))
        }
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| {
                ScriptError::value(format!("invalid literal for int() with base 10: '{s}'"))
            }),
        other => as_int(other).map(Value::Int).ok_or_else(|| {
            ScriptError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_float(value: &Value) -> ScriptResult<Value> {
    match value {
        Value::Str(s) => {
            let text = s.trim().to_ascii_lowercase();
            let parsed = match text.as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" => Some(f64::NAN),
                _ => text.parse::<f64>().ok(),
            };
            parsed
                .map(Value::Float)
                .ok_or_else(|| ScriptError::value(format!("could not convert string to float: '{s}'")))
        }
        other => as_float(other).map(Value::Float).ok_or_else(|| {
            ScriptError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn range(args: &[Value]) -> ScriptResult<Value> {
    expect_args(Builtin::Range, args, 1, 3)?;
    let ints = args
        .iter()
        .map(|v| {
            as_int(v).ok_or_else(|| {
                ScriptError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        })
        .collect::<ScriptResult<Vec<i64>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => unreachable!("arity checked above"),
    };
    if step == 0 {
        return Err(ScriptError::value("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        (i128::from(stop) - i128::from(start) + i128::from(step) - 1) / i128::from(step)
    } else {
        (i128::from(start) - i128::from(stop) - i128::from(step) - 1) / -i128::from(step)
    };
    if span > i128::from(MAX_RANGE_LEN) {
        return Err(ScriptError::runtime("range() result is too large"));
    }
    let count = span.max(0) as i64;
    Ok(Value::List(
        (0..count).map(|i| Value::Int(start + i * step)).collect(),
    ))
}

fn extremum(builtin: Builtin, args: Vec<Value>) -> ScriptResult<Value> {
    let items = match args.len() {
        0 => {
            return Err(ScriptError::type_error(format!(
                "{}() expected at least 1 argument, got 0",
                builtin.name()
            )));
        }
        1 => iterate(&args[0])?,
        _ => args,
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(ScriptError::value(format!(
            "{}() arg is an empty sequence",
            builtin.name()
        )));
    };
    for item in iter {
        let ord = ordering(&item, &best)?;
        let better = if builtin == Builtin::Min {
            ord.is_lt()
        } else {
            ord.is_gt()
        };
        if better {
            best = item;
        }
    }
    Ok(best)
}

fn round(args: &[Value]) -> ScriptResult<Value> {
    expect_args(Builtin::Round, args, 1, 2)?;
    let digits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(v) => Some(as_int(v).ok_or_else(|| {
            ScriptError::type_error("round() digits must be an integer")
        })?),
    };
    match (&args[0], digits) {
        (Value::Float(x), None) => {
            if !x.is_finite() {
                return Err(ScriptError::overflow());
            }
            Ok(Value::Int(round_half_even(*x) as i64))
        }
        (Value::Float(x), Some(d)) => {
            let factor = 10f64.powi(i32::try_from(d).map_err(|_| ScriptError::overflow())?);
            Ok(Value::Float(round_half_even(x * factor) / factor))
        }
        (other, _) => as_int(other).map(Value::Int).ok_or_else(|| {
            ScriptError::type_error(format!(
                "type {} doesn't define __round__",
                other.type_name()
            ))
        }),
    }
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - x.signum()
    } else {
        rounded
    }
}
