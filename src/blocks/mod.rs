/// Block handlers
///
/// A block handler is the executable bound to one block type. The coordinator
/// only sees the `BlockHandler` trait: it validates each node's config once when
/// a run is prepared, then calls `execute` with the node's resolved input and a
/// read-only view of the run's execution context.

use crate::condition::EvalContext;
use crate::error::NodeError;
use crate::path::whole_template;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;

pub mod comparator;
pub mod market;
pub mod registry;
pub mod services;
pub mod swap;
pub mod transform;
pub mod trigger;

pub use crate::condition::operators::as_number;
pub use registry::HandlerRegistry;
pub use services::Services;

/// Uniform contract every block type implements
#[async_trait]
pub trait BlockHandler: Send + Sync {
    /// Block type identifier (e.g. "price_monitor")
    fn block_type(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Check the node's static config before any node of the run is dispatched
    fn validate_config(&self, _config: &Value) -> Result<(), NodeError> {
        Ok(())
    }

    /// Run the block
    async fn execute(&self, input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError>;

    /// True when the block performs an external effect that cannot be undone
    fn irreversible(&self) -> bool {
        false
    }
}

/// Resolved input of one node
#[derive(Debug, Clone)]
pub struct BlockInput {
    /// Config with `{{nodeId.field}}` templates already interpolated
    pub config: Value,
    /// Outputs of direct predecessors, keyed by node id
    pub upstream: Map<String, Value>,
}

impl BlockInput {
    pub fn new(config: Value, upstream: Map<String, Value>) -> Self {
        Self { config, upstream }
    }

    /// String config field
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Required string config field
    pub fn require_str(&self, key: &str) -> Result<&str, NodeError> {
        self.str_field(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| NodeError::config(format!("missing required field '{}'", key)))
    }

    /// Numeric config field; accepts numbers and numeric strings
    pub fn number_field(&self, key: &str) -> Result<Option<f64>, NodeError> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => as_number(value)
                .map(Some)
                .ok_or_else(|| NodeError::config(format!("field '{}' is not a number: {}", key, value))),
        }
    }

    pub fn require_number(&self, key: &str) -> Result<f64, NodeError> {
        self.number_field(key)?
            .ok_or_else(|| NodeError::config(format!("missing required field '{}'", key)))
    }

    /// All predecessor outputs merged into one object
    ///
    /// On key clashes the predecessor whose id sorts last wins.
    pub fn merged_upstream(&self) -> Value {
        let mut merged = Map::new();
        for output in self.upstream.values() {
            if let Value::Object(fields) = output {
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(merged)
    }
}

/// Per-dispatch view handed to a handler
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub execution_id: String,
    pub workflow_id: String,
    pub node_id: String,
    /// Outputs of every node completed so far, in completion order
    pub outputs: Vec<(String, Value)>,
    /// Time budget for external calls
    pub timeout_secs: u64,
}

impl NodeContext {
    /// Evaluation context for the condition evaluator
    pub fn eval_context(&self) -> EvalContext<'_> {
        EvalContext::new(&self.outputs)
    }

    /// Key identifying this node's external effect within the run
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.execution_id, self.node_id)
    }
}

/// Validate a numeric config field: a number, a numeric string or a `{{...}}` template
pub fn check_numeric(config: &Value, key: &str, required: bool) -> Result<(), NodeError> {
    match config.get(key) {
        None | Some(Value::Null) if required => {
            Err(NodeError::config(format!("missing required field '{}'", key)))
        }
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(s)) if whole_template(s).is_some() => Ok(()),
        Some(value) if as_number(value).is_some() => Ok(()),
        Some(value) => Err(NodeError::config(format!("field '{}' is not a number: {}", key, value))),
    }
}

/// Validate a required non-empty string config field
pub fn check_string(config: &Value, key: &str) -> Result<(), NodeError> {
    match config.get(key).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(NodeError::config(format!("missing required field '{}'", key))),
    }
}

/// Bound an external call; elapsed time becomes `NodeError::Timeout`
pub async fn with_timeout<T, F>(seconds: u64, fut: F) -> Result<T, NodeError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
        Ok(result) => result.map_err(NodeError::Failed),
        Err(_) => Err(NodeError::Timeout { seconds }),
    }
}
