/// Legacy string condition expressions
///
/// Expressions such as `"price > targetPrice"` are split on the first operator
/// found, scanning a fixed list in order. Operands resolve as a numeric literal,
/// a quoted string, a `{{node.field}}` reference, or a key looked up across the
/// node outputs. An identifier that resolves to nothing is compared as its own
/// literal text; a warning is logged but the behavior is kept.

use super::{operators::Operation, EvalContext};
use crate::error::ConditionError;
use crate::path::whole_template;
use serde_json::Value;

/// Operators in scan order; the first one present in the expression wins
const LEGACY_OPERATORS: [(&str, Operation); 7] = [
    (">=", Operation::GreaterThanOrEqual),
    ("<=", Operation::LessThanOrEqual),
    (">", Operation::GreaterThan),
    ("<", Operation::LessThan),
    ("==", Operation::Equals),
    ("!=", Operation::NotEquals),
    ("=", Operation::Equals),
];

/// Identifier aliases tried when a key is absent from every node output
const KEY_ALIASES: [(&str, &str); 1] = [("price", "currentPrice")];

/// A parsed legacy expression
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyExpression<'e> {
    pub left: &'e str,
    pub operation: Operation,
    pub right: &'e str,
}

/// Split an expression into its operands and operator
pub fn parse_legacy(expression: &str) -> Result<LegacyExpression<'_>, ConditionError> {
    LEGACY_OPERATORS
        .iter()
        .find_map(|(symbol, operation)| {
            expression.find(symbol).map(|idx| LegacyExpression {
                left: expression[..idx].trim(),
                operation: *operation,
                right: expression[idx + symbol.len()..].trim(),
            })
        })
        .ok_or_else(|| ConditionError::MalformedExpression(expression.to_string()))
}

/// Evaluate a legacy expression against the run's node outputs
pub fn evaluate_legacy(expression: &str, ctx: &EvalContext<'_>) -> Result<bool, ConditionError> {
    let parsed = parse_legacy(expression)?;
    let left = resolve_legacy_operand(parsed.left, expression, ctx);
    let right = resolve_legacy_operand(parsed.right, expression, ctx);

    tracing::debug!(
        expression,
        left = %left,
        right = %right,
        operation = parsed.operation.name(),
        "Evaluating legacy condition"
    );

    parsed.operation.apply(&left, &right, None, None)
}

/// Resolve one side of a legacy expression
pub fn resolve_legacy_operand(token: &str, expression: &str, ctx: &EvalContext<'_>) -> Value {
    if let Ok(number) = token.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(number) {
            return Value::Number(n);
        }
    }

    if let Some(unquoted) = strip_quotes(token) {
        return Value::String(unquoted.to_string());
    }

    if let Some(reference) = whole_template(token) {
        if let Some(value) = ctx.resolve_reference(reference) {
            return value.clone();
        }
    }

    if let Some(value) = ctx.find_key(token) {
        return value.clone();
    }

    if token.contains('.') {
        if let Some(value) = ctx.resolve_reference(token) {
            return value.clone();
        }
    }

    for (alias, target) in KEY_ALIASES {
        if token == alias {
            if let Some(value) = ctx.find_key(target) {
                return value.clone();
            }
        }
    }

    tracing::warn!(
        identifier = token,
        expression,
        "Unresolved identifier in legacy condition, comparing as literal text"
    );
    Value::String(token.to_string())
}

fn strip_quotes(token: &str) -> Option<&str> {
    ['"', '\''].iter().find_map(|quote| {
        token
            .strip_prefix(*quote)
            .and_then(|rest| rest.strip_suffix(*quote))
    })
}
