/// Per-run execution context
///
/// Node id -> output map shared by every dispatch of one run. Entries keep the
/// order in which nodes completed, which is the order the condition evaluator
/// searches when it looks a bare key up across outputs.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Concurrency-safe output store scoped to one run
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    outputs: Arc<RwLock<Vec<(String, Value)>>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context pre-filled with outputs restored from the state store
    pub fn from_outputs(outputs: Vec<(String, Value)>) -> Self {
        Self {
            outputs: Arc::new(RwLock::new(outputs)),
        }
    }

    /// Merge a node's output; a re-executed node moves to the end
    pub fn insert(&self, node_id: &str, output: Value) {
        let mut outputs = self.outputs.write();
        outputs.retain(|(id, _)| id != node_id);
        outputs.push((node_id.to_string(), output));
    }

    /// Drop a node's output before it is re-executed
    pub fn remove(&self, node_id: &str) {
        self.outputs.write().retain(|(id, _)| id != node_id);
    }

    pub fn get(&self, node_id: &str) -> Option<Value> {
        self.outputs
            .read()
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, output)| output.clone())
    }

    /// Point-in-time copy handed to a dispatch
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.outputs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.outputs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.read().is_empty()
    }
}
