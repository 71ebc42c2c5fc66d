/// Comparator / condition block
///
/// Three config shapes are accepted, checked in this order:
/// - `{conditions: [...]}`: a left-to-right chain of structured conditions
/// - `{operation, left, right?, min?, max?}`: one structured comparison
/// - `{condition: "price > targetPrice"}`: a legacy string expression
///
/// The result is always `{passed, mode, ...}`. `passed: false` is a valid
/// outcome; branching on it is left to downstream consumers.

use super::{BlockHandler, BlockInput, NodeContext};
use crate::condition::{
    evaluate, evaluate_all, evaluate_legacy, legacy::parse_legacy, Condition, LogicalOperator,
    Operands, Operation,
};
use crate::error::NodeError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;

/// Which of the accepted config shapes a node uses
enum Mode<'a> {
    Multi(&'a Value),
    Single(&'a str),
    Legacy(&'a str),
}

impl<'a> Mode<'a> {
    fn detect(config: &'a Value) -> Result<Self, NodeError> {
        if let Some(conditions) = config.get("conditions") {
            return Ok(Mode::Multi(conditions));
        }
        if let Some(operation) = config
            .get("operation")
            .or_else(|| config.get("operator"))
            .and_then(Value::as_str)
        {
            return Ok(Mode::Single(operation));
        }
        if let Some(expression) = config.get("condition").and_then(Value::as_str) {
            return Ok(Mode::Legacy(expression));
        }
        Err(NodeError::config(
            "comparator needs 'conditions', 'operation' or 'condition'",
        ))
    }
}

fn parse_conditions(raw: &Value) -> Result<Vec<Condition>, NodeError> {
    serde_json::from_value(raw.clone())
        .map_err(|e| NodeError::config(format!("invalid 'conditions': {}", e)))
}

fn parse_operands(config: &Value) -> Result<Operands, NodeError> {
    serde_json::from_value(config.clone())
        .map_err(|e| NodeError::config(format!("invalid operands: {}", e)))
}

pub struct ComparatorBlock {
    block_type: &'static str,
}

impl ComparatorBlock {
    /// Registered under both `comparator` and `condition`
    pub fn new(block_type: &'static str) -> Self {
        Self { block_type }
    }
}

#[async_trait]
impl BlockHandler for ComparatorBlock {
    fn block_type(&self) -> &str {
        self.block_type
    }

    fn description(&self) -> &str {
        "Evaluates conditions against upstream outputs and reports whether they passed"
    }

    fn validate_config(&self, config: &Value) -> Result<(), NodeError> {
        match Mode::detect(config)? {
            Mode::Multi(raw) => {
                let conditions = parse_conditions(raw)?;
                for condition in &conditions {
                    Operation::from_str(&condition.operation)?;
                    if let Some(logical) = &condition.logical_operator {
                        LogicalOperator::from_str(logical)?;
                    }
                }
            }
            Mode::Single(operation) => {
                Operation::from_str(operation)?;
                parse_operands(config)?;
            }
            Mode::Legacy(expression) => {
                parse_legacy(expression)?;
            }
        }
        Ok(())
    }

    async fn execute(&self, input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        let eval = ctx.eval_context();

        let output = match Mode::detect(&input.config)? {
            Mode::Multi(raw) => {
                let conditions = parse_conditions(raw)?;
                let passed = evaluate_all(&conditions, &eval)?;
                json!({
                    "passed": passed,
                    "mode": "multi",
                    "conditionCount": conditions.len(),
                })
            }
            Mode::Single(operation) => {
                let operands = parse_operands(&input.config)?;
                let passed = evaluate(operation, &operands, &eval)?;
                json!({
                    "passed": passed,
                    "mode": "single",
                    "operation": operation,
                    "left": eval.resolve_operand(&operands.left),
                    "right": eval.resolve_operand(&operands.right),
                })
            }
            Mode::Legacy(expression) => {
                let passed = evaluate_legacy(expression, &eval)?;
                json!({
                    "passed": passed,
                    "mode": "legacy",
                    "condition": expression,
                })
            }
        };

        tracing::debug!("🔀 Comparator {} -> {}", ctx.node_id, output["passed"]);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn ctx(outputs: Vec<(String, Value)>) -> NodeContext {
        NodeContext {
            execution_id: "exec".into(),
            workflow_id: "wf".into(),
            node_id: "check".into(),
            outputs,
            timeout_secs: 5,
        }
    }

    async fn run(config: Value, outputs: Vec<(String, Value)>) -> Result<Value, NodeError> {
        let block = ComparatorBlock::new("comparator");
        let input = BlockInput::new(config, Map::new());
        block.execute(&input, &ctx(outputs)).await
    }

    fn price_output() -> Vec<(String, Value)> {
        vec![("price".to_string(), json!({"currentPrice": 1800, "targetPrice": 2000}))]
    }

    #[tokio::test]
    async fn legacy_expression_false_is_a_result() {
        let out = run(json!({"condition": "price > targetPrice"}), price_output()).await.unwrap();
        assert_eq!(out["passed"], json!(false));
        assert_eq!(out["mode"], json!("legacy"));
    }

    #[tokio::test]
    async fn single_operation_with_references() {
        let out = run(
            json!({"operation": "lte", "left": "{{price.currentPrice}}", "right": "{{price.targetPrice}}"}),
            price_output(),
        )
        .await
        .unwrap();
        assert_eq!(out["passed"], json!(true));
        assert_eq!(out["left"], json!(1800));
    }

    #[tokio::test]
    async fn multi_condition_chain() {
        let config = json!({"conditions": [
            {"operation": "gt", "left": "{{price.currentPrice}}", "right": 5000, "logicalOperator": "or"},
            {"operation": "between", "value": "{{price.currentPrice}}", "min": 1000, "max": 2000}
        ]});
        let out = run(config, price_output()).await.unwrap();
        assert_eq!(out["passed"], json!(true));
        assert_eq!(out["conditionCount"], json!(2));
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        let block = ComparatorBlock::new("condition");
        assert!(block.validate_config(&json!({})).is_err());
        assert!(block.validate_config(&json!({"operation": "roughly"})).is_err());
        assert!(block.validate_config(&json!({"condition": "price"})).is_err());
        assert!(block
            .validate_config(&json!({"conditions": [{"operation": "eq", "left": 1, "right": 1, "logicalOperator": "xor"}]}))
            .is_err());
        assert!(block.validate_config(&json!({"condition": "price >= 10"})).is_ok());
    }

    #[tokio::test]
    async fn invalid_regex_is_a_condition_error() {
        let err = run(json!({"operation": "regex_match", "left": "abc", "right": "("}), vec![]).await.unwrap_err();
        assert_eq!(err.kind(), "condition");
    }
}
