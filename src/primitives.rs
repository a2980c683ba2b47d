//! Binary operator semantics, truthiness and string conversion.
//!
//! The evaluator never interprets operands itself; it hands them to a
//! [`Primitives`] provider. [`DefaultPrimitives`] implements loose,
//! JavaScript-flavoured coercions.

use crate::ast::BinaryOp;
use crate::error::{Error, Result};
use crate::json;
use crate::value::Value;

pub trait Primitives {
    /// Apply a binary operator. `&&` and `||` only reach this when the
    /// evaluator has already evaluated both sides.
    fn binary(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value>;

    fn truthy(&self, value: &Value) -> bool;

    fn stringify(&self, value: &Value) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrimitives;

impl Primitives for DefaultPrimitives {
    fn binary(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
        use BinaryOp::*;
        Ok(match op {
            Add if is_textual(lhs) || is_textual(rhs) => {
                let mut s = self.stringify(lhs);
                s.push_str(&self.stringify(rhs));
                Value::String(s)
            }
            Add => Value::Number(to_number(lhs) + to_number(rhs)),
            Sub => Value::Number(to_number(lhs) - to_number(rhs)),
            Mul => Value::Number(to_number(lhs) * to_number(rhs)),
            Div => Value::Number(to_number(lhs) / to_number(rhs)),
            Rem => Value::Number(to_number(lhs) % to_number(rhs)),
            Shl => Value::Number(f64::from(to_int32(lhs).wrapping_shl(shift_count(rhs)))),
            Shr => Value::Number(f64::from(to_int32(lhs).wrapping_shr(shift_count(rhs)))),
            BitAnd => Value::Number(f64::from(to_int32(lhs) & to_int32(rhs))),
            BitXor => Value::Number(f64::from(to_int32(lhs) ^ to_int32(rhs))),
            BitOr => Value::Number(f64::from(to_int32(lhs) | to_int32(rhs))),
            Lt | Gt | Le | Ge => Value::Bool(compare(op, lhs, rhs)?),
            Eq => Value::Bool(loose_eq(lhs, rhs)),
            Ne => Value::Bool(!loose_eq(lhs, rhs)),
            And => {
                if self.truthy(lhs) {
                    rhs.clone()
                } else {
                    lhs.clone()
                }
            }
            Or => {
                if self.truthy(lhs) {
                    lhs.clone()
                } else {
                    rhs.clone()
                }
            }
        })
    }

    fn truthy(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    fn stringify(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .borrow()
                .iter()
                .map(|item| self.stringify(item))
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(f) => format!("[function {}]", f.name()),
            Value::Container(c) => json::container_to_json(c),
            Value::Link(link) => link.link.target_path.clone(),
        }
    }
}

/// Integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < (1u64 << 53) as f64 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn is_textual(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(_) | Value::Number(_))
}

pub(crate) fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

fn to_int32(value: &Value) -> i32 {
    let n = to_number(value);
    if n.is_finite() {
        (n.trunc() as i64) as i32
    } else {
        0
    }
}

fn shift_count(value: &Value) -> u32 {
    (to_int32(value) as u32) & 31
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return Ok(match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Gt => a > b,
            BinaryOp::Le => a <= b,
            BinaryOp::Ge => a >= b,
            other => return Err(Error::UnsupportedOperator(other.to_string())),
        });
    }
    let (a, b) = (to_number(lhs), to_number(rhs));
    Ok(match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Gt => a > b,
        BinaryOp::Le => a <= b,
        BinaryOp::Ge => a >= b,
        other => return Err(Error::UnsupportedOperator(other.to_string())),
    })
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(_), Value::String(_) | Value::Bool(_))
        | (Value::String(_) | Value::Bool(_), Value::Number(_))
        | (Value::Bool(_), Value::String(_))
        | (Value::String(_), Value::Bool(_)) => to_number(lhs) == to_number(rhs),
        _ => lhs == rhs,
    }
}
