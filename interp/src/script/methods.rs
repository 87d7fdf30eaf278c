//! Methods on strings, lists, and dicts.

use std::collections::BTreeMap;

use super::error::{ScriptError, ScriptResult};
use super::ops::{as_int, check_len, iterate, ordering, values_equal};
use super::value::Value;

/// True when `name` mutates its receiver, so the caller writes it back.
pub fn is_mutating(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::List(_) => matches!(
            name,
            "append" | "extend" | "pop" | "insert" | "remove" | "reverse" | "sort" | "clear"
        ),
        Value::Dict(_) => matches!(name, "update" | "pop" | "clear" | "setdefault"),
        _ => false,
    }
}

pub fn call_method(receiver: &mut Value, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::List(items) => list_method(items, name, args),
        Value::Dict(map) => dict_method(map, name, args),
        other => Err(no_attribute(other, name)),
    }
}

fn no_attribute(receiver: &Value, name: &str) -> ScriptError {
    ScriptError::attribute(format!(
        "'{}' object has no attribute '{name}'",
        receiver.type_name()
    ))
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> ScriptResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ScriptError::type_error(format!(
            "{name}() takes {expected} argument(s) ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'a>(name: &str, value: &'a Value) -> ScriptResult<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::type_error(format!(
            "{name}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn int_arg(name: &str, value: &Value) -> ScriptResult<i64> {
    as_int(value).ok_or_else(|| {
        ScriptError::type_error(format!(
            "{name}() argument must be int, not {}",
            value.type_name()
        ))
    })
}

fn str_method(s: &str, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
    let strip_set = |args: &[Value]| -> ScriptResult<Option<Vec<char>>> {
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(other) => Ok(Some(str_arg(name, other)?.chars().collect())),
        }
    };
    match name {
        "upper" => {
            arity(name, &args, 0, 0)?;
            Ok(s.to_uppercase().into())
        }
        "lower" => {
            arity(name, &args, 0, 0)?;
            Ok(s.to_lowercase().into())
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(name, &args, 0, 1)?;
            let set = strip_set(&args)?;
            let matcher = |c: char| match &set {
                Some(chars) => chars.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(out.into())
        }
        "split" => {
            arity(name, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::from).collect(),
                Some(sep) => {
                    let sep = str_arg(name, sep)?;
                    if sep.is_empty() {
                        return Err(ScriptError::value("empty separator"));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Ok(Value::List(parts))
        }
        "splitlines" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(s.lines().map(Value::from).collect()))
        }
        "join" => {
            arity(name, &args, 1, 1)?;
            let parts = iterate(&args[0])?
                .into_iter()
                .map(|item| match item {
                    Value::Str(text) => Ok(text),
                    other => Err(ScriptError::type_error(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<ScriptResult<Vec<_>>>()?;
            check_len(parts.iter().map(String::len).sum::<usize>() + s.len() * parts.len())?;
            Ok(parts.join(s).into())
        }
        "replace" => {
            arity(name, &args, 2, 2)?;
            let (old, new) = (str_arg(name, &args[0])?, str_arg(name, &args[1])?);
            let hits = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(old).count()
            };
            check_len(
                (s.len() - hits.saturating_mul(old.len()).min(s.len()))
                    .saturating_add(hits.saturating_mul(new.len())),
            )?;
            Ok(s.replace(old, new).into())
        }
        "startswith" => {
            arity(name, &args, 1, 1)?;
            Ok(s.starts_with(str_arg(name, &args[0])?).into())
        }
        "endswith" => {
            arity(name, &args, 1, 1)?;
            Ok(s.ends_with(str_arg(name, &args[0])?).into())
        }
        "find" => {
            arity(name, &args, 1, 1)?;
            let found = s
                .find(str_arg(name, &args[0])?)
                .map_or(-1, |byte| s[..byte].chars().count() as i64);
            Ok(Value::Int(found))
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(n as i64))
        }
        "isdigit" => {
            arity(name, &args, 0, 0)?;
            Ok((!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())).into())
        }
        "format" => Err(ScriptError::attribute(
            "str.format is not supported; use an f-string",
        )),
        _ => Err(no_attribute(&Value::Str(String::new()), name)),
    }
}

fn list_method(items: &mut Vec<Value>, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            items.extend(args);
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let more = iterate(&args[0])?;
            check_len(items.len() + more.len())?;
            items.extend(more);
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            if items.is_empty() {
                return Err(ScriptError::index("pop from empty list"));
            }
            let len = items.len() as i64;
            let index = match args.first() {
                Some(v) => int_arg(name, v)?,
                None => -1,
            };
            let index = if index < 0 { index + len } else { index };
            if !(0..len).contains(&index) {
                return Err(ScriptError::index("pop index out of range"));
            }
            Ok(items.remove(index as usize))
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let len = items.len() as i64;
            let index = int_arg(name, &args[0])?;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(index as usize, args[1].clone());
            Ok(Value::None)
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            let position = items
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .ok_or_else(|| ScriptError::value("list.remove(x): x not in list"))?;
            items.remove(position);
            Ok(Value::None)
        }
        "index" => {
            arity(name, &args, 1, 1)?;
            items
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| ScriptError::value(format!("{} is not in list", args[0].repr())))
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let n = items.iter().filter(|v| values_equal(v, &args[0])).count();
            Ok(Value::Int(n as i64))
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            items.reverse();
            Ok(Value::None)
        }
        "sort" => {
            arity(name, &args, 0, 0)?;
            sort_values(items)?;
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(items.clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            items.clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute(&Value::List(Vec::new()), name)),
    }
}

/// Stable sort that surfaces the first incomparable pair as an error.
pub fn sort_values(items: &mut [Value]) -> ScriptResult<()> {
    let mut failure = None;
    items.sort_by(|a, b| {
        ordering(a, b).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            std::cmp::Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn dict_method(
    map: &mut BTreeMap<String, Value>,
    name: &str,
    args: Vec<Value>,
) -> ScriptResult<Value> {
    let key_of = |value: &Value| -> ScriptResult<String> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(ScriptError::type_error(format!(
                "dict keys must be str, not {}",
                other.type_name()
            ))),
        }
    };
    match name {
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(map.keys().cloned().map(Value::Str).collect()))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(map.values().cloned().collect()))
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(
                map.iter()
                    .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            ))
        }
        "get" => {
            arity(name, &args, 1, 2)?;
            let key = key_of(&args[0])?;
            Ok(map
                .get(&key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            let key = key_of(&args[0])?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(map.entry(key).or_insert(default).clone())
        }
        "update" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Dict(other) => {
                    map.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
                    Ok(Value::None)
                }
                other => Err(ScriptError::type_error(format!(
                    "update() argument must be dict, not {}",
                    other.type_name()
                ))),
            }
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            let key = key_of(&args[0])?;
            match (map.remove(&key), args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(ScriptError::key(format!("'{key}'"))),
            }
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Dict(map.clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            map.clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute(&Value::Dict(BTreeMap::new()), name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_methods() {
        let mut s = Value::from("  a,b ,c  ");
        assert_eq!(call_method(&mut s, "strip", vec![]), Ok("a,b ,c".into()));
        let mut csv = Value::from("a,b,c");
        assert_eq!(
            call_method(&mut csv, "split", vec![",".into()]),
            Ok(Value::List(vec!["a".into(), "b".into(), "c".into()]))
        );
        let mut sep = Value::from("-");
        let joined = call_method(&mut sep, "join", vec![Value::List(vec!["x".into(), "y".into()])]);
        assert_eq!(joined, Ok("x-y".into()));
    }

    #[test]
    fn replace_cannot_build_oversized_strings() {
        let mut s = Value::from("a".repeat(10_000));
        let err = call_method(&mut s, "replace", vec!["a".into(), "b".repeat(10_000).into()])
            .unwrap_err();
        assert_eq!(err.kind.as_str(), "RuntimeError");
        let mut small = Value::from("a-b");
        assert_eq!(
            call_method(&mut small, "replace", vec!["-".into(), "+".into()]),
            Ok("a+b".into())
        );
    }

    #[test]
    fn list_mutation_and_errors() {
        let mut xs = Value::List(vec![3.into(), 1.into()]);
        call_method(&mut xs, "append", vec![2.into()]).expect("append");
        call_method(&mut xs, "sort", vec![]).expect("sort");
        assert_eq!(xs, Value::List(vec![1.into(), 2.into(), 3.into()]));
        assert_eq!(call_method(&mut xs, "pop", vec![]), Ok(Value::Int(3)));

        let mut mixed = Value::List(vec![1.into(), "a".into()]);
        assert!(call_method(&mut mixed, "sort", vec![]).is_err());
        let mut empty = Value::List(vec![]);
        let err = call_method(&mut empty, "pop", vec![]).unwrap_err();
        assert_eq!(err.kind.as_str(), "IndexError");
    }

    #[test]
    fn dict_get_and_pop_defaults() {
        let mut map = Value::Dict(BTreeMap::from([("a".to_string(), Value::Int(1))]));
        assert_eq!(call_method(&mut map, "get", vec!["z".into()]), Ok(Value::None));
        assert_eq!(call_method(&mut map, "pop", vec!["z".into(), 0.into()]), Ok(Value::Int(0)));
        let err = call_method(&mut map, "pop", vec!["z".into()]).unwrap_err();
        assert_eq!(err.kind.as_str(), "KeyError");
    }

    #[test]
    fn unknown_method_is_attribute_error() {
        let mut n = Value::Int(1);
        let err = call_method(&mut n, "append", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "AttributeError: 'int' object has no attribute 'append'");
        assert!(is_mutating(&Value::List(vec![]), "append"));
        assert!(!is_mutating(&Value::from("x"), "upper"));
    }
}
