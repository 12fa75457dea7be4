//! Resolution of compiled expressions against a context.
//!
//! Resolution is infallible by design: a missing property segment yields
//! `Undefined` instead of an error, and an `Unsafe` expression always yields
//! `Undefined` — it is classified for display only and never executed,
//! regardless of configuration.

use crate::context::Context;
use crate::value::{format_number, Value};
use fml_parser::expr::{CompareOp, CompiledExpr, LiteralValue, LogicalOp};
use std::collections::HashMap;

/// Resolve a compiled expression to a value.
pub fn resolve(expr: &CompiledExpr, ctx: &Context) -> Value {
    match expr {
        CompiledExpr::Literal(lit) => literal_value(lit),
        CompiledExpr::Property(path) => resolve_path(path, ctx),
        CompiledExpr::ArrayAccess { base, index } => {
            let base = resolve(base, ctx);
            let index = resolve(index, ctx);
            index_value(&base, &index)
        }
        CompiledExpr::Comparison { left, op, right } => {
            let left = resolve(left, ctx);
            let right = resolve(right, ctx);
            Value::Bool(compare(&left, *op, &right))
        }
        CompiledExpr::Logical { left, op, right } => {
            // Short-circuit: the right side is only resolved when needed,
            // and the operand value itself flows through.
            let left = resolve(left, ctx);
            match op {
                LogicalOp::And => {
                    if left.is_truthy() {
                        resolve(right, ctx)
                    } else {
                        left
                    }
                }
                LogicalOp::Or => {
                    if left.is_truthy() {
                        left
                    } else {
                        resolve(right, ctx)
                    }
                }
            }
        }
        CompiledExpr::MethodCall { path } => {
            let Some((method, receiver_path)) = path.split_last() else {
                return Value::Undefined;
            };
            let receiver = resolve_path(receiver_path, ctx);
            call_builtin(&receiver, method)
        }
        CompiledExpr::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect(),
        ),
        CompiledExpr::Array(items) => {
            Value::Array(items.iter().map(|item| resolve(item, ctx)).collect())
        }
        CompiledExpr::Unsafe(_) => Value::Undefined,
    }
}

fn literal_value(lit: &LiteralValue) -> Value {
    match lit {
        LiteralValue::Str(s) => Value::String(s.clone()),
        LiteralValue::Num(n) => Value::Number(*n),
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Null => Value::Null,
    }
}

/// Walk a property chain, returning `Undefined` on any missing segment.
fn resolve_path(path: &[String], ctx: &Context) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return Value::Undefined;
    };
    let Some(mut current) = ctx.lookup(first).cloned() else {
        return Value::Undefined;
    };
    for segment in rest {
        current = property_of(&current, segment);
    }
    current
}

/// A single property step: object key, or `length` on strings and arrays.
fn property_of(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(obj) => obj.get(key).cloned().unwrap_or(Value::Undefined),
        Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
        Value::Array(items) if key == "length" => Value::Number(items.len() as f64),
        _ => Value::Undefined,
    }
}

/// `base[index]` — numeric index into an array, string key into an object.
fn index_value(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Array(items), Value::Number(n)) => {
            if n.fract() != 0.0 || *n < 0.0 {
                return Value::Undefined;
            }
            items.get(*n as usize).cloned().unwrap_or(Value::Undefined)
        }
        (Value::Object(obj), Value::String(key)) => {
            obj.get(key).cloned().unwrap_or(Value::Undefined)
        }
        _ => Value::Undefined,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::StrictEq => strict_eq(left, right),
        CompareOp::StrictNeq => !strict_eq(left, right),
        CompareOp::Eq => loose_eq(left, right),
        CompareOp::Neq => !loose_eq(left, right),
        CompareOp::Gt => relational(left, right).is_some_and(|o| o == std::cmp::Ordering::Greater),
        CompareOp::Lt => relational(left, right).is_some_and(|o| o == std::cmp::Ordering::Less),
        CompareOp::Gte => {
            relational(left, right).is_some_and(|o| o != std::cmp::Ordering::Less)
        }
        CompareOp::Lte => {
            relational(left, right).is_some_and(|o| o != std::cmp::Ordering::Greater)
        }
    }
}

/// Strict equality, also used by the renderers for `Switch` case matching.
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b, // NaN != NaN
        _ => left == right,
    }
}

/// Loose equality: `null == undefined`, number↔string and bool→number
/// coercions; everything else falls back to strict comparison.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => true,
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().map(|parsed| parsed == *n).unwrap_or(false)
        }
        (Value::Bool(b), other) | (other, Value::Bool(b)) if !matches!(other, Value::Bool(_)) => {
            loose_eq(&Value::Number(if *b { 1.0 } else { 0.0 }), other)
        }
        _ => strict_eq(left, right),
    }
}

/// Relational ordering: numbers numerically, strings lexicographically.
/// Mixed operand types produce no ordering, so the comparison is false.
fn relational(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// The fixed zero-argument method table. Unknown methods resolve to
/// `Undefined`; no user code ever runs here.
fn call_builtin(receiver: &Value, method: &str) -> Value {
    match (receiver, method) {
        (Value::String(s), "toUpperCase") => Value::String(s.to_uppercase()),
        (Value::String(s), "toLowerCase") => Value::String(s.to_lowercase()),
        (Value::String(s), "trim") => Value::String(s.trim().to_string()),
        (Value::String(s), "toString") => Value::String(s.clone()),
        (Value::Number(n), "toString") => Value::String(format_number(*n)),
        (Value::Bool(b), "toString") => Value::String(b.to_string()),
        (Value::Array(items), "reverse") => {
            Value::Array(items.iter().rev().cloned().collect())
        }
        (Value::Object(obj), "keys") => {
            let mut keys: Vec<String> = obj.keys().cloned().collect();
            keys.sort();
            Value::Array(keys.into_iter().map(Value::String).collect())
        }
        _ => Value::Undefined,
    }
}

/// Build a one-entry scope layer; a convenience for the renderers.
pub fn layer(entries: Vec<(String, Value)>) -> HashMap<String, Value> {
    entries.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fml_parser::expr::compile;
    use serde_json::json;

    fn ctx(data: serde_json::Value) -> Context {
        Context::new(Value::from_json(data)).unwrap()
    }

    fn eval(src: &str, data: serde_json::Value) -> Value {
        resolve(&compile(src), &ctx(data))
    }

    #[test]
    fn test_property_resolution() {
        assert_eq!(
            eval("user.name", json!({"user": {"name": "Ann"}})),
            Value::String("Ann".into())
        );
    }

    #[test]
    fn test_missing_segment_is_undefined() {
        assert_eq!(eval("user.missing.deep", json!({"user": {}})), Value::Undefined);
        assert_eq!(eval("ghost", json!({})), Value::Undefined);
    }

    #[test]
    fn test_length_property() {
        assert_eq!(eval("name.length", json!({"name": "Ann"})), Value::Number(3.0));
        assert_eq!(eval("items.length", json!({"items": [1, 2]})), Value::Number(2.0));
    }

    #[test]
    fn test_array_access() {
        assert_eq!(
            eval("items[1]", json!({"items": ["a", "b"]})),
            Value::String("b".into())
        );
        assert_eq!(eval("items[9]", json!({"items": ["a"]})), Value::Undefined);
    }

    #[test]
    fn test_array_access_with_dynamic_index() {
        assert_eq!(
            eval("items[cursor]", json!({"items": [10, 20], "cursor": 1})),
            Value::Number(20.0)
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("count > 1", json!({"count": 5})), Value::Bool(true));
        assert_eq!(eval("count > 1", json!({"count": 1})), Value::Bool(false));
        assert_eq!(
            eval("status === \"ok\"", json!({"status": "ok"})),
            Value::Bool(true)
        );
        assert_eq!(eval("n == \"3\"", json!({"n": 3})), Value::Bool(true));
        assert_eq!(eval("n === \"3\"", json!({"n": 3})), Value::Bool(false));
    }

    #[test]
    fn test_mixed_relational_is_false() {
        assert_eq!(eval("n > \"a\"", json!({"n": 3})), Value::Bool(false));
    }

    #[test]
    fn test_logical_short_circuit_returns_operands() {
        assert_eq!(
            eval("a && b", json!({"a": true, "b": "yes"})),
            Value::String("yes".into())
        );
        assert_eq!(eval("a && b", json!({"a": 0, "b": "yes"})), Value::Number(0.0));
        assert_eq!(
            eval("a || b", json!({"a": "", "b": "fallback"})),
            Value::String("fallback".into())
        );
    }

    #[test]
    fn test_short_circuit_skips_right_side() {
        // The right side references nothing resolvable; short-circuiting
        // means the left operand flows through untouched.
        assert_eq!(
            eval("a || missing.deep", json!({"a": "set"})),
            Value::String("set".into())
        );
    }

    #[test]
    fn test_builtin_methods() {
        assert_eq!(
            eval("name.toUpperCase()", json!({"name": "ann"})),
            Value::String("ANN".into())
        );
        assert_eq!(
            eval("name.trim()", json!({"name": "  x  "})),
            Value::String("x".into())
        );
        assert_eq!(
            eval("n.toString()", json!({"n": 7})),
            Value::String("7".into())
        );
    }

    #[test]
    fn test_unknown_method_is_undefined() {
        assert_eq!(eval("name.explode()", json!({"name": "x"})), Value::Undefined);
    }

    #[test]
    fn test_unsafe_never_evaluates() {
        assert_eq!(eval("a + b", json!({"a": 1, "b": 2})), Value::Undefined);
        assert_eq!(eval("f(x, y)", json!({})), Value::Undefined);
        assert_eq!(eval("x ? 1 : 2", json!({"x": true})), Value::Undefined);
    }

    #[test]
    fn test_object_literal_resolution() {
        let value = eval("{n: count, s: \"x\"}", json!({"count": 2}));
        match value {
            Value::Object(obj) => {
                assert_eq!(obj.get("n"), Some(&Value::Number(2.0)));
                assert_eq!(obj.get("s"), Some(&Value::String("x".into())));
            }
            other => panic!("Expected object, got {other:?}"),
        }
    }
}
