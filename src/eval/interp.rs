//! Interpreter for the condition sub-language.
//!
//! Evaluates a parsed [`Expr`] against a [`FlowContext`], producing a
//! JSON value. The only bound name is `context`; its `data`, `input`, and
//! `metadata` attributes project into the flow context. Missing data
//! paths resolve to null rather than erroring, so conditions like
//! `context.data.x is not None` behave naturally for absent keys.

use serde_json::{Map, Value};

use super::parser::{BinaryOp, BoolOpKind, CompareOp, Expr, UnaryOp};
use super::EvalError;
use crate::context::FlowContext;

/// Intermediate resolution target: `context` and its projections are not
/// plain values until an attribute chain lands on one.
enum Target {
    Context,
    Data,
    Metadata,
    Value(Value),
}

pub fn eval(expr: &Expr, ctx: &FlowContext) -> Result<Value, EvalError> {
    let target = eval_target(expr, ctx)?;
    finalize(target, ctx)
}

/// Python-style truthiness over JSON values.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn finalize(target: Target, ctx: &FlowContext) -> Result<Value, EvalError> {
    match target {
        Target::Value(v) => Ok(v),
        Target::Data => {
            let mut map = Map::new();
            for (k, v) in &ctx.data {
                map.insert(k.clone(), v.clone());
            }
            Ok(Value::Object(map))
        }
        Target::Metadata => {
            let mut map = Map::new();
            for attr in [
                "flow_id",
                "has_errors",
                "iteration_count",
                "max_iterations_reached",
                "suspended",
            ] {
                map.insert(attr.to_string(), ctx.metadata.eval_attr(attr));
            }
            Ok(Value::Object(map))
        }
        Target::Context => Err(EvalError::Runtime(
            "'context' cannot be used as a plain value".to_string(),
        )),
    }
}

fn eval_target(expr: &Expr, ctx: &FlowContext) -> Result<Target, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(Target::Value(value.clone())),

        Expr::Name(name) => {
            if name == "context" {
                Ok(Target::Context)
            } else {
                Err(EvalError::Runtime(format!("name '{name}' is not defined")))
            }
        }

        Expr::Attribute { base, attr } => {
            let base = eval_target(base, ctx)?;
            match base {
                Target::Context => match attr.as_str() {
                    "data" => Ok(Target::Data),
                    "input" => Ok(Target::Value(ctx.input.clone())),
                    "metadata" => Ok(Target::Metadata),
                    other => Err(EvalError::Runtime(format!(
                        "context has no attribute '{other}'"
                    ))),
                },
                Target::Data => Ok(Target::Value(
                    ctx.data.get(attr).cloned().unwrap_or(Value::Null),
                )),
                Target::Metadata => Ok(Target::Value(ctx.metadata.eval_attr(attr))),
                // Attribute access on values is total: objects look up the
                // field, everything else (including null from an earlier
                // missing segment) resolves to null.
                Target::Value(Value::Object(map)) => Ok(Target::Value(
                    map.get(attr).cloned().unwrap_or(Value::Null),
                )),
                Target::Value(_) => Ok(Target::Value(Value::Null)),
            }
        }

        Expr::Subscript { base, index } => {
            let base = eval_target(base, ctx)?;
            let index = eval(index, ctx)?;
            match base {
                Target::Data => match index {
                    Value::String(key) => Ok(Target::Value(
                        ctx.data.get(&key).cloned().unwrap_or(Value::Null),
                    )),
                    _ => Ok(Target::Value(Value::Null)),
                },
                Target::Metadata => match index {
                    Value::String(key) => Ok(Target::Value(ctx.metadata.eval_attr(&key))),
                    _ => Ok(Target::Value(Value::Null)),
                },
                Target::Context => Err(EvalError::Runtime(
                    "'context' is not subscriptable".to_string(),
                )),
                Target::Value(value) => Ok(Target::Value(subscript_value(&value, &index))),
            }
        }

        Expr::List(items) | Expr::Tuple(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, ctx)?);
            }
            Ok(Target::Value(Value::Array(values)))
        }

        Expr::Dict(entries) => {
            let mut map = Map::new();
            for (key_expr, value_expr) in entries {
                let key = eval(key_expr, ctx)?;
                let key = match key {
                    Value::String(s) => s,
                    other => {
                        return Err(EvalError::Runtime(format!(
                            "dict keys must be strings, got {}",
                            type_name(&other)
                        )))
                    }
                };
                map.insert(key, eval(value_expr, ctx)?);
            }
            Ok(Target::Value(Value::Object(map)))
        }

        Expr::Unary { op, operand } => {
            let value = eval(operand, ctx)?;
            let result = match op {
                UnaryOp::Not => Value::Bool(!truthy(&value)),
                UnaryOp::Neg => match as_number(&value) {
                    Some(Num::Int(i)) => Value::from(-i),
                    Some(Num::Float(f)) => Value::from(-f),
                    None => {
                        return Err(EvalError::Runtime(format!(
                            "bad operand type for unary -: {}",
                            type_name(&value)
                        )))
                    }
                },
                UnaryOp::Pos => match as_number(&value) {
                    Some(_) => value,
                    None => {
                        return Err(EvalError::Runtime(format!(
                            "bad operand type for unary +: {}",
                            type_name(&value)
                        )))
                    }
                },
            };
            Ok(Target::Value(result))
        }

        Expr::Binary { op, left, right } => {
            let left = eval(left, ctx)?;
            let right = eval(right, ctx)?;
            Ok(Target::Value(binary(*op, &left, &right)?))
        }

        Expr::Compare { op, left, right } => {
            let left = eval(left, ctx)?;
            let right = eval(right, ctx)?;
            Ok(Target::Value(Value::Bool(compare(*op, &left, &right)?)))
        }

        Expr::BoolOp { op, left, right } => {
            // Short-circuit and return the deciding operand's value,
            // matching the source language's and/or semantics.
            let left = eval(left, ctx)?;
            let result = match op {
                BoolOpKind::And => {
                    if truthy(&left) {
                        eval(right, ctx)?
                    } else {
                        left
                    }
                }
                BoolOpKind::Or => {
                    if truthy(&left) {
                        left
                    } else {
                        eval(right, ctx)?
                    }
                }
            };
            Ok(Target::Value(result))
        }

        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            let condition = eval(condition, ctx)?;
            if truthy(&condition) {
                Ok(Target::Value(eval(then, ctx)?))
            } else {
                Ok(Target::Value(eval(otherwise, ctx)?))
            }
        }
    }
}

fn subscript_value(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::Array(items), Value::Number(n)) => {
            let idx = match n.as_i64() {
                Some(i) => i,
                None => return Value::Null,
            };
            let len = items.len() as i64;
            let idx = if idx < 0 { idx + len } else { idx };
            if idx < 0 || idx >= len {
                Value::Null
            } else {
                items[idx as usize].clone()
            }
        }
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = match n.as_i64() {
                Some(i) => i,
                None => return Value::Null,
            };
            let len = chars.len() as i64;
            let idx = if idx < 0 { idx + len } else { idx };
            if idx < 0 || idx >= len {
                Value::Null
            } else {
                Value::String(chars[idx as usize].to_string())
            }
        }
        _ => Value::Null,
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_number(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Num::Int(i))
            } else {
                n.as_f64().map(Num::Float)
            }
        }
        // Booleans behave as 0/1 in numeric position, as in the source
        // language.
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match as_number(value)? {
        Num::Int(i) => Some(i as f64),
        Num::Float(f) => Some(f),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    // String and list concatenation for +.
    if op == BinaryOp::Add {
        if let (Value::String(a), Value::String(b)) = (left, right) {
            return Ok(Value::String(format!("{a}{b}")));
        }
        if let (Value::Array(a), Value::Array(b)) = (left, right) {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            return Ok(Value::Array(out));
        }
    }

    let (a, b) = match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EvalError::Runtime(format!(
                "unsupported operand types: {} and {}",
                type_name(left),
                type_name(right)
            )))
        }
    };

    let result = match (a, b) {
        (Num::Int(a), Num::Int(b)) => match op {
            BinaryOp::Add => Value::from(a + b),
            BinaryOp::Sub => Value::from(a - b),
            BinaryOp::Mul => Value::from(a * b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(EvalError::Runtime("division by zero".to_string()));
                }
                Value::from(a as f64 / b as f64)
            }
            BinaryOp::FloorDiv => {
                if b == 0 {
                    return Err(EvalError::Runtime("division by zero".to_string()));
                }
                Value::from(a.div_euclid(b))
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(EvalError::Runtime("modulo by zero".to_string()));
                }
                Value::from(a.rem_euclid(b))
            }
        },
        (a, b) => {
            let a = match a {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            let b = match b {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            match op {
                BinaryOp::Add => Value::from(a + b),
                BinaryOp::Sub => Value::from(a - b),
                BinaryOp::Mul => Value::from(a * b),
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(EvalError::Runtime("division by zero".to_string()));
                    }
                    Value::from(a / b)
                }
                BinaryOp::FloorDiv => {
                    if b == 0.0 {
                        return Err(EvalError::Runtime("division by zero".to_string()));
                    }
                    Value::from((a / b).floor())
                }
                BinaryOp::Mod => {
                    if b == 0.0 {
                        return Err(EvalError::Runtime("modulo by zero".to_string()));
                    }
                    Value::from(a - b * (a / b).floor())
                }
            }
        }
    };
    Ok(result)
}

/// Deep equality with cross-representation numeric comparison
/// (`1 == 1.0` holds).
pub fn value_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => {
            match (as_f64(left), as_f64(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| value_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| value_eq(v, other)))
        }
        _ => left == right,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq => Ok(value_eq(left, right)),
        CompareOp::Ne => Ok(!value_eq(left, right)),
        CompareOp::Is => is_null_identity(left, right),
        CompareOp::IsNot => is_null_identity(left, right).map(|r| !r),
        CompareOp::In => membership(left, right),
        CompareOp::NotIn => membership(left, right).map(|r| !r),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            if let (Some(a), Some(b)) = (as_f64(left), as_f64(right)) {
                return Ok(match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                    _ => unreachable!(),
                });
            }
            if let (Value::String(a), Value::String(b)) = (left, right) {
                return Ok(match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                    _ => unreachable!(),
                });
            }
            Err(EvalError::Runtime(format!(
                "unsupported comparison between {} and {}",
                type_name(left),
                type_name(right)
            )))
        }
    }
}

/// `is` / `is not` are identity-to-null checks: one side must be the
/// `None` literal.
fn is_null_identity(left: &Value, right: &Value) -> Result<bool, EvalError> {
    if left.is_null() || right.is_null() {
        Ok(left.is_null() && right.is_null())
    } else {
        Err(EvalError::Runtime(
            "'is' comparisons are only supported against None".to_string(),
        ))
    }
}

fn membership(needle: &Value, haystack: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| value_eq(needle, item))),
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            other => Err(EvalError::Runtime(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(other)
            ))),
        },
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(EvalError::Runtime(format!(
            "argument of type '{}' is not iterable",
            type_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::parser::parse;
    use serde_json::json;

    fn eval_str(source: &str, ctx: &FlowContext) -> Result<Value, EvalError> {
        eval(&parse(source).unwrap(), ctx)
    }

    fn test_ctx() -> FlowContext {
        let mut ctx = FlowContext::new();
        ctx.set("user", json!({"name": "Alice", "age": 30, "active": true}));
        ctx.set("numbers", json!([1, 2, 3, 4, 5]));
        ctx.set("count", json!(10));
        ctx.set("status", json!("success"));
        ctx
    }

    #[test]
    fn literals_and_truthiness() {
        let ctx = FlowContext::new();
        assert_eq!(eval_str("True", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("None", &ctx).unwrap(), Value::Null);
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("x")));
        assert!(!truthy(&json!(0)));
        assert!(truthy(&json!([1])));
        assert!(!truthy(&json!({})));
    }

    #[test]
    fn dotted_access_resolves_and_misses_to_null() {
        let ctx = test_ctx();
        assert_eq!(eval_str("context.data.user.name", &ctx).unwrap(), json!("Alice"));
        assert_eq!(eval_str("context.data.missing", &ctx).unwrap(), Value::Null);
        assert_eq!(
            eval_str("context.data.missing.deeper.still", &ctx).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn subscripts() {
        let ctx = test_ctx();
        assert_eq!(eval_str("context.data['count']", &ctx).unwrap(), json!(10));
        assert_eq!(eval_str("context.data.numbers[0]", &ctx).unwrap(), json!(1));
        assert_eq!(eval_str("context.data.numbers[-1]", &ctx).unwrap(), json!(5));
        assert_eq!(eval_str("context.data.numbers[99]", &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn comparisons() {
        let ctx = test_ctx();
        assert_eq!(eval_str("context.data.count > 5", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("context.data.count > 15", &ctx).unwrap(), json!(false));
        assert_eq!(
            eval_str("context.data.status == 'success'", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(eval_str("1 == 1.0", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("1 < 2 < 3", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("1 < 2 < 2", &ctx).unwrap(), json!(false));
    }

    #[test]
    fn null_identity() {
        let ctx = test_ctx();
        assert_eq!(eval_str("context.data.missing is None", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("context.data.user is None", &ctx).unwrap(), json!(false));
        assert_eq!(
            eval_str("context.data.user is not None", &ctx).unwrap(),
            json!(true)
        );
        assert!(matches!(
            eval_str("1 is 1", &ctx),
            Err(EvalError::Runtime(_))
        ));
    }

    #[test]
    fn membership() {
        let ctx = test_ctx();
        assert_eq!(eval_str("3 in context.data.numbers", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("10 in context.data.numbers", &ctx).unwrap(), json!(false));
        assert_eq!(
            eval_str("10 not in context.data.numbers", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(eval_str("'suc' in context.data.status", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("'name' in context.data.user", &ctx).unwrap(), json!(true));
        assert!(matches!(
            eval_str("1 in context.data.count", &ctx),
            Err(EvalError::Runtime(_))
        ));
    }

    #[test]
    fn boolean_operators_short_circuit() {
        let ctx = test_ctx();
        assert_eq!(
            eval_str("context.data.user.active and context.data.count > 5", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(
            eval_str("context.data.count > 15 or context.data.user.active", &ctx).unwrap(),
            json!(true)
        );
        // `or` returns the deciding operand's value.
        assert_eq!(eval_str("0 or 'fallback'", &ctx).unwrap(), json!("fallback"));
        assert_eq!(eval_str("not context.data.missing", &ctx).unwrap(), json!(true));
    }

    #[test]
    fn arithmetic() {
        let ctx = test_ctx();
        assert_eq!(eval_str("context.data.count + 5", &ctx).unwrap(), json!(15));
        assert_eq!(eval_str("context.data.user.age * 2", &ctx).unwrap(), json!(60));
        assert_eq!(eval_str("7 // 2", &ctx).unwrap(), json!(3));
        assert_eq!(eval_str("7 % 3", &ctx).unwrap(), json!(1));
        assert_eq!(eval_str("7 / 2", &ctx).unwrap(), json!(3.5));
        assert_eq!(eval_str("'ab' + 'cd'", &ctx).unwrap(), json!("abcd"));
        assert!(matches!(
            eval_str("1 / 0", &ctx),
            Err(EvalError::Runtime(_))
        ));
    }

    #[test]
    fn undefined_name_is_runtime_error() {
        let ctx = test_ctx();
        match eval_str("undefined_var > 5", &ctx) {
            Err(EvalError::Runtime(msg)) => assert!(msg.contains("undefined_var")),
            other => panic!("expected Runtime error, got {other:?}"),
        }
    }

    #[test]
    fn ordering_against_null_is_runtime_error() {
        let ctx = test_ctx();
        assert!(matches!(
            eval_str("context.data.missing > 5", &ctx),
            Err(EvalError::Runtime(_))
        ));
    }

    #[test]
    fn context_input_and_metadata_projection() {
        let mut ctx = test_ctx();
        ctx.input = json!({"key": "value"});
        assert_eq!(eval_str("context.input is not None", &ctx).unwrap(), json!(true));
        assert_eq!(
            eval_str("context.input.key == 'value'", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(
            eval_str("context.metadata.has_errors", &ctx).unwrap(),
            json!(false)
        );
    }

    #[test]
    fn ternary() {
        let ctx = test_ctx();
        assert_eq!(
            eval_str("'big' if context.data.count > 5 else 'small'", &ctx).unwrap(),
            json!("big")
        );
    }
}
