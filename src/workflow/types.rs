/// Core workflow type definitions
///
/// A workflow is a snapshot of typed blocks (nodes) and the directed edges
/// between them. These types are serialized to JSON for persistence and handed
/// to the execution engine as an immutable snapshot per run.

use crate::schema::SchemaDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete workflow definition containing nodes and their connections
///
/// Workflows are stored as JSON in SQLite and compiled into petgraph DAGs
/// for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-eth-rebalance")
    pub id: String,
    /// Human-readable workflow name
    #[serde(default)]
    pub name: String,
    /// List of nodes in this workflow
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// List of edges connecting nodes
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    /// Look up a node by id
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == node_id)
    }
}

/// A single block instance in the workflow DAG
///
/// `block_type` selects the handler; `config` is interpreted only by that handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "price", "swap-1")
    pub id: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Block type identifier (e.g., "price_monitor", "comparator")
    #[serde(alias = "type")]
    pub block_type: String,
    /// Handler-specific configuration; string values may contain `{{nodeId.field}}` templates
    #[serde(default = "empty_config")]
    pub config: Value,
    /// Declared shape this node expects from its upstream outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<SchemaDefinition>,
}

fn empty_config() -> Value {
    Value::Object(Default::default())
}

impl Node {
    /// Convenience constructor used by builders and tests
    pub fn new(id: &str, block_type: &str, config: Value) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            block_type: block_type.to_string(),
            config,
            input_schema: None,
        }
    }

    /// Attach a declared input schema
    pub fn with_input_schema(mut self, schema: SchemaDefinition) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Directed dependency between two nodes
///
/// `source` must complete before `target` is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Upstream node ID
    #[serde(alias = "from")]
    pub source: String,
    /// Downstream node ID
    #[serde(alias = "to")]
    pub target: String,
}

impl Edge {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}
