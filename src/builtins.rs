//! Natives every interpreter starts with, and the built-in methods of
//! strings and lists.

use crate::error::{Error, Result};
use crate::from_json::value_from_json;
use crate::interpreter::Interpreter;
use crate::json;
use crate::primitives::to_number;
use crate::value::{ListRef, Value};

pub(crate) fn install(interpreter: &mut Interpreter) {
    interpreter.define_global("log", Value::native("log", native_log));
    interpreter.define_global("str", Value::native("str", native_str));
    interpreter.define_global("count", Value::native("count", native_count));
    interpreter.define_global("keys", Value::native("keys", native_keys));
    interpreter.define_global("toJson", Value::native("toJson", native_to_json));
    interpreter.define_global("parseJson", Value::native("parseJson", native_parse_json));
}

fn native_log(interpreter: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value> {
    let line = args
        .iter()
        .map(|arg| interpreter.stringify(arg))
        .collect::<Vec<_>>()
        .join(" ");
    log::info!("{}", line);
    Ok(Value::Null)
}

fn native_str(interpreter: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value> {
    let text = args
        .first()
        .map(|arg| interpreter.stringify(arg))
        .unwrap_or_default();
    Ok(Value::String(text))
}

/// Element count of a list, list container or link; field count of an
/// object or plain container; character count of a string.
fn native_count(_: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value> {
    let n = match args.first().unwrap_or(&Value::Null) {
        Value::Null => 0,
        Value::List(items) => items.borrow().len(),
        Value::Object(o) => o.borrow().len(),
        Value::String(s) => s.chars().count(),
        Value::Container(c) if c.is_list() => c.len(),
        Value::Container(c) => c.attribute_names().len(),
        Value::Link(link) => link.keys().len(),
        other => {
            return Err(Error::TypeError(format!(
                "count() does not apply to {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Number(n as f64))
}

fn native_keys(_: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value> {
    let keys = match args.first().unwrap_or(&Value::Null) {
        Value::Object(o) => o.borrow().keys(),
        Value::Container(c) if c.is_list() => c.array_keys(),
        Value::Container(c) => c.attribute_names(),
        Value::Link(link) => link.keys().to_vec(),
        _ => Vec::new(),
    };
    Ok(Value::list(keys.into_iter().map(Value::String).collect()))
}

fn native_to_json(_: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value> {
    let value = args.first().unwrap_or(&Value::Null);
    Ok(Value::String(json::value_to_json(value)))
}

fn native_parse_json(_: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value> {
    match args.first() {
        Some(Value::String(text)) => value_from_json(text),
        Some(other) => Err(Error::TypeError(format!(
            "parseJson() expects a string, got {}",
            other.type_name()
        ))),
        None => Ok(Value::Null),
    }
}

// ── Methods ─────────────────────────────────────────────────────────

fn arg_text(interpreter: &Interpreter, args: &[Value], i: usize) -> String {
    args.get(i)
        .map(|arg| interpreter.stringify(arg))
        .unwrap_or_default()
}

/// Clamp a numeric argument to a character position in `0..=len`.
fn arg_position(args: &[Value], i: usize, len: usize, default: usize) -> usize {
    match args.get(i) {
        Some(arg) => {
            let n = to_number(arg);
            if n.is_nan() || n < 0.0 {
                0
            } else {
                (n.trunc() as usize).min(len)
            }
        }
        None => default,
    }
}

/// Character index of the first `needle` in `haystack`, or -1.
fn char_index_of(haystack: &str, needle: &str) -> f64 {
    match haystack.find(needle) {
        Some(byte) => haystack[..byte].chars().count() as f64,
        None => -1.0,
    }
}

/// `None` when `method` is not a string method.
pub(crate) fn string_method(
    interpreter: &Interpreter,
    s: &str,
    method: &str,
    args: &[Value],
) -> Result<Option<Value>> {
    let value = match method {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "substring" => {
            let len = s.chars().count();
            let mut start = arg_position(args, 0, len, 0);
            let mut end = arg_position(args, 1, len, len);
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            Value::String(s.chars().skip(start).take(end - start).collect())
        }
        "indexOf" => Value::Number(char_index_of(s, &arg_text(interpreter, args, 0))),
        "replace" => {
            let from = arg_text(interpreter, args, 0);
            let to = arg_text(interpreter, args, 1);
            Value::String(s.replacen(&from, &to, 1))
        }
        "startsWith" => Value::Bool(s.starts_with(&arg_text(interpreter, args, 0))),
        "endsWith" => Value::Bool(s.ends_with(&arg_text(interpreter, args, 0))),
        "split" => {
            let separator = arg_text(interpreter, args, 0);
            let parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(separator.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect()
            };
            Value::list(parts)
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// `None` when `method` is not a list method.
pub(crate) fn list_method(
    interpreter: &Interpreter,
    items: &ListRef,
    method: &str,
    args: &[Value],
) -> Result<Option<Value>> {
    let value = match method {
        "push" => {
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Value::Number(items.len() as f64)
        }
        "pop" => items.borrow_mut().pop().unwrap_or_default(),
        "join" => {
            let separator = match args.first() {
                Some(arg) => interpreter.stringify(arg),
                None => ",".to_string(),
            };
            let joined = items
                .borrow()
                .iter()
                .map(|item| interpreter.stringify(item))
                .collect::<Vec<_>>()
                .join(&separator);
            Value::String(joined)
        }
        "indexOf" => {
            let needle = args.first().unwrap_or(&Value::Null);
            let found = items.borrow().iter().position(|item| item == needle);
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}
