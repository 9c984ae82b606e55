//! Safe condition evaluation.
//!
//! Step conditions are written in a small expression language evaluated
//! against the flow context: a dedicated grammar with its own parser and
//! interpreter, not an embedding of any host evaluator. The whitelist
//! (comparisons, boolean combinators, identity-to-null, membership,
//! arithmetic, dotted access, literals) *is* the grammar: call forms,
//! lambdas, comprehensions, assignments, and imports are rejected during
//! parsing, before anything is evaluated.
//!
//! # Examples
//!
//! ```rust
//! use flowloom::context::FlowContext;
//! use flowloom::eval::ConditionEvaluator;
//! use serde_json::json;
//!
//! let mut ctx = FlowContext::new();
//! ctx.set("count", json!(10));
//!
//! let evaluator = ConditionEvaluator::new();
//! assert!(evaluator.evaluate("context.data.count > 5", &ctx).unwrap());
//! assert!(!evaluator.evaluate("context.data.missing is not None", &ctx).unwrap());
//! assert!(evaluator.evaluate("len(x) > 0", &ctx).is_err());
//! ```

use miette::Diagnostic;
use thiserror::Error;

use crate::context::FlowContext;

pub(crate) mod interp;
pub(crate) mod parser;

/// Condition evaluation failure, classed by phase.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum EvalError {
    /// The expression contains a construct outside the whitelist.
    #[error("unsafe construct in condition: {0}")]
    #[diagnostic(
        code(flowloom::eval::unsafe_construct),
        help("Conditions allow comparisons, and/or/not, membership, arithmetic, and context access only.")
    )]
    Unsafe(String),

    /// The expression failed to parse.
    #[error("syntax error in condition: {0}")]
    #[diagnostic(code(flowloom::eval::syntax))]
    Syntax(String),

    /// The expression parsed but could not be evaluated.
    #[error("runtime error in condition: {0}")]
    #[diagnostic(code(flowloom::eval::runtime))]
    Runtime(String),
}

/// Evaluates condition expressions against a [`FlowContext`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        ConditionEvaluator
    }

    /// Evaluate an expression; the result is the truthiness of the final
    /// value.
    pub fn evaluate(&self, expression: &str, ctx: &FlowContext) -> Result<bool, EvalError> {
        let expr = parser::parse(expression)?;
        let value = interp::eval(&expr, ctx)?;
        Ok(interp::truthy(&value))
    }

    /// Static validation: parse-level problems (unsafe constructs and
    /// syntax errors) as human-readable strings. Runtime behavior is not
    /// checked; a valid expression can still fail against a particular
    /// context.
    pub fn validate(&self, expression: &str) -> Vec<String> {
        match parser::parse(expression) {
            Ok(_) => Vec::new(),
            Err(err) => vec![err.to_string()],
        }
    }

    /// Whether the expression passes static validation.
    pub fn is_safe(&self, expression: &str) -> bool {
        self.validate(expression).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> FlowContext {
        let mut ctx = FlowContext::new();
        ctx.set("user", json!({"name": "Alice", "age": 30, "active": true}));
        ctx.set("numbers", json!([1, 2, 3, 4, 5]));
        ctx.set("count", json!(10));
        ctx.set("status", json!("success"));
        ctx
    }

    #[test]
    fn evaluates_simple_comparisons() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context();
        assert!(evaluator.evaluate("context.data.count > 5", &ctx).unwrap());
        assert!(!evaluator.evaluate("context.data.count > 15", &ctx).unwrap());
        assert!(evaluator
            .evaluate("context.data.status == 'success'", &ctx)
            .unwrap());
    }

    #[test]
    fn evaluates_complex_condition() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context();
        let condition = "(context.data.user.active and context.data.count >= 10) \
                         or context.data.status == 'override'";
        assert!(evaluator.evaluate(condition, &ctx).unwrap());
    }

    #[test]
    fn missing_field_never_raises() {
        let evaluator = ConditionEvaluator::new();
        let ctx = FlowContext::new();
        assert!(!evaluator
            .evaluate("context.data.something is not None", &ctx)
            .unwrap());
    }

    #[test]
    fn rejects_unsafe_before_evaluation() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context();
        for expr in [
            "len(context.data.items) > 0",
            "print('hello')",
            "context.data.status.upper() == 'SUCCESS'",
        ] {
            match evaluator.evaluate(expr, &ctx) {
                Err(EvalError::Unsafe(_)) => {}
                other => panic!("expected Unsafe for {expr:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn syntax_error_classification() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context();
        match evaluator.evaluate("x > > 5", &ctx) {
            Err(EvalError::Syntax(_)) => {}
            other => panic!("expected Syntax, got {other:?}"),
        }
    }

    #[test]
    fn runtime_error_classification() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context();
        match evaluator.evaluate("undefined_var > 5", &ctx) {
            Err(EvalError::Runtime(_)) => {}
            other => panic!("expected Runtime, got {other:?}"),
        }
    }

    #[test]
    fn validate_reports_and_is_safe_agrees() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.validate("x > 5").is_empty());
        assert!(evaluator.is_safe("x == 'value' and y < 10"));

        let errors = evaluator.validate("len(x) > 0");
        assert!(!errors.is_empty());
        assert!(errors.iter().any(|e| e.contains("Call")));
        assert!(!evaluator.is_safe("len(x) > 0"));

        let errors = evaluator.validate("x > > 5");
        assert!(errors.iter().any(|e| e.to_lowercase().contains("syntax")));
    }

    #[test]
    fn constants() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context();
        assert!(evaluator.evaluate("True", &ctx).unwrap());
        assert!(!evaluator.evaluate("False", &ctx).unwrap());
        assert!(!evaluator.evaluate("None", &ctx).unwrap());
    }
}
