/// Condition / comparator evaluator
///
/// Pure functions used by comparator blocks:
/// - `evaluate`: one structured comparison (`operation` + operands)
/// - `evaluate_legacy`: flat string expressions such as `"price > targetPrice"`
/// - `evaluate_all`: left-to-right boolean chains of structured conditions
///
/// Operands are resolved against an `EvalContext`, a read-only view of the
/// per-node outputs produced so far in a run.

// Operator parsing and generic value comparison
pub mod operators;

// String expression parsing with literal fallback
pub mod legacy;

pub use legacy::evaluate_legacy;
pub use operators::{compare_values, is_empty, loose_equal, Operation};

use crate::error::ConditionError;
use crate::path::{split_reference, value_at_path, whole_template};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Read-only view of node outputs, in the order nodes completed
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    outputs: &'a [(String, Value)],
}

impl<'a> EvalContext<'a> {
    pub fn new(outputs: &'a [(String, Value)]) -> Self {
        Self { outputs }
    }

    /// Context with no outputs (literal-only evaluation)
    pub fn empty() -> EvalContext<'static> {
        EvalContext { outputs: &[] }
    }

    /// Output of a node by id
    pub fn output(&self, node_id: &str) -> Option<&'a Value> {
        self.outputs
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, value)| value)
    }

    /// Resolve `nodeId.field.path`
    pub fn resolve_reference(&self, reference: &str) -> Option<&'a Value> {
        let (node_id, path) = split_reference(reference);
        value_at_path(self.output(node_id)?, path)
    }

    /// First node output (in completion order) holding `key` at its top level
    pub fn find_key(&self, key: &str) -> Option<&'a Value> {
        self.outputs
            .iter()
            .find_map(|(_, output)| output.as_object().and_then(|map| map.get(key)))
    }

    /// Replace a whole-string `{{nodeId.field}}` operand with the referenced value
    pub fn resolve_operand(&self, operand: &Value) -> Value {
        match operand {
            Value::String(text) => match whole_template(text) {
                Some(reference) => self.resolve_reference(reference).cloned().unwrap_or(Value::Null),
                None => operand.clone(),
            },
            other => other.clone(),
        }
    }
}

/// Operands of a single comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operands {
    #[serde(default, alias = "value", alias = "field")]
    pub left: Value,
    #[serde(default, alias = "target", alias = "values", alias = "compareTo")]
    pub right: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,
}

/// Evaluate one comparison after resolving template operands against `ctx`
pub fn evaluate(
    operation: &str,
    operands: &Operands,
    ctx: &EvalContext<'_>,
) -> Result<bool, ConditionError> {
    let op = Operation::from_str(operation)?;
    let left = ctx.resolve_operand(&operands.left);
    let right = ctx.resolve_operand(&operands.right);
    let min = operands.min.as_ref().map(|v| ctx.resolve_operand(v));
    let max = operands.max.as_ref().map(|v| ctx.resolve_operand(v));

    op.apply(&left, &right, min.as_ref(), max.as_ref())
}

/// Logical connective between consecutive conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl FromStr for LogicalOperator {
    type Err = ConditionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "and" | "&&" => Ok(LogicalOperator::And),
            "or" | "||" => Ok(LogicalOperator::Or),
            _ => Err(ConditionError::UnknownLogicalOperator(raw.to_string())),
        }
    }
}

/// One entry of a multi-condition chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(alias = "operator")]
    pub operation: String,
    #[serde(flatten)]
    pub operands: Operands,
    /// Connective joining this condition to the *next* one (defaults to AND)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<String>,
}

/// Evaluate a chain strictly left to right
///
/// Each condition is joined to the accumulated result by the logical operator
/// attached to the condition before it; there is no precedence or grouping.
/// An empty chain is true.
pub fn evaluate_all(conditions: &[Condition], ctx: &EvalContext<'_>) -> Result<bool, ConditionError> {
    let Some((first, rest)) = conditions.split_first() else {
        return Ok(true);
    };

    let mut result = evaluate(&first.operation, &first.operands, ctx)?;
    let mut previous = first;

    for condition in rest {
        let connective = match previous.logical_operator.as_deref() {
            Some(raw) => LogicalOperator::from_str(raw)?,
            None => LogicalOperator::And,
        };
        let current = evaluate(&condition.operation, &condition.operands, ctx)?;
        result = match connective {
            LogicalOperator::And => result && current,
            LogicalOperator::Or => result || current,
        };
        previous = condition;
    }

    Ok(result)
}
