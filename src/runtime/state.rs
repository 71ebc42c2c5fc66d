/// Execution state models and the state store contract
///
/// `WorkflowExecution` is one run, `NodeExecution` one node within it. The
/// coordinator is the only writer; every write goes through `ExecutionStore`,
/// one row at a time. Each run keeps the workflow snapshot it started from.

use crate::workflow::Workflow;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "paused" => Ok(ExecutionStatus::Paused),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(anyhow::anyhow!("Unknown execution status: {}", other)),
        }
    }
}

/// Node lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(NodeStatus::Pending),
            "running" => Ok(NodeStatus::Running),
            "completed" => Ok(NodeStatus::Completed),
            "failed" => Ok(NodeStatus::Failed),
            other => Err(anyhow::anyhow!("Unknown node status: {}", other)),
        }
    }
}

/// One run of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
}

impl WorkflowExecution {
    /// Fresh `pending` run with a random id
    pub fn pending(workflow_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            error_summary: None,
        }
    }

    /// Apply a status transition; terminal states stamp `completed_at`
    pub fn transition(&mut self, status: ExecutionStatus, error: Option<&str>) {
        self.status = status;
        self.error_summary = error.map(str::to_string);
        self.completed_at = status.is_terminal().then(Utc::now);
    }
}

/// One node's execution within a run; one row per `(execution_id, node_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecution {
    pub id: String,
    pub execution_id: String,
    pub node_id: String,
    pub status: NodeStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeExecution {
    pub fn new(execution_id: &str, node_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            status: NodeStatus::Pending,
            input: Value::Null,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply an update in place
    ///
    /// Entering `running` restarts the attempt (clears output, error and
    /// completion time); terminal states stamp `completed_at`.
    pub fn apply(&mut self, update: NodeUpdate) {
        let now = Utc::now();
        match update.status {
            NodeStatus::Pending => {
                self.output = None;
                self.error = None;
                self.started_at = None;
                self.completed_at = None;
            }
            NodeStatus::Running => {
                self.output = None;
                self.error = None;
                self.started_at = Some(now);
                self.completed_at = None;
            }
            NodeStatus::Completed | NodeStatus::Failed => {
                self.output = update.output;
                self.error = update.error;
                self.completed_at = Some(now);
            }
        }
        if let Some(input) = update.input {
            self.input = input;
        }
        self.status = update.status;
    }
}

/// Arguments of `ExecutionStore::upsert_node_execution`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub status: NodeStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl NodeUpdate {
    pub fn pending() -> Self {
        Self { status: NodeStatus::Pending, input: None, output: None, error: None }
    }

    pub fn running(input: Value) -> Self {
        Self { status: NodeStatus::Running, input: Some(input), output: None, error: None }
    }

    pub fn completed(output: Value) -> Self {
        Self { status: NodeStatus::Completed, input: None, output: Some(output), error: None }
    }

    pub fn failed(error: String) -> Self {
        Self { status: NodeStatus::Failed, input: None, output: None, error: Some(error) }
    }
}

/// A run together with its node rows, in the order rows were created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    #[serde(flatten)]
    pub execution: WorkflowExecution,
    pub nodes: Vec<NodeExecution>,
}

impl ExecutionRecord {
    pub fn node(&self, node_id: &str) -> Option<&NodeExecution> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// Rows whose status is `completed`
    pub fn completed_nodes(&self) -> impl Iterator<Item = &NodeExecution> {
        self.nodes.iter().filter(|n| n.status == NodeStatus::Completed)
    }
}

/// Persistence contract for execution state
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create a `pending` run of `workflow` and keep `workflow` as its snapshot
    async fn create_execution(&self, workflow: &Workflow) -> Result<WorkflowExecution>;

    /// The workflow definition a run was started from
    async fn load_snapshot(&self, execution_id: &str) -> Result<Option<Workflow>>;

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Create the node row on first use, update it afterwards
    async fn upsert_node_execution(
        &self,
        execution_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<NodeExecution>;

    async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>>;
}

/// In-memory execution store
#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    records: RwLock<HashMap<String, ExecutionRecord>>,
    snapshots: RwLock<HashMap<String, Workflow>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create_execution(&self, workflow: &Workflow) -> Result<WorkflowExecution> {
        let execution = WorkflowExecution::pending(&workflow.id);
        self.snapshots.write().insert(execution.id.clone(), workflow.clone());
        self.records.write().insert(
            execution.id.clone(),
            ExecutionRecord { execution: execution.clone(), nodes: Vec::new() },
        );
        Ok(execution)
    }

    async fn load_snapshot(&self, execution_id: &str) -> Result<Option<Workflow>> {
        Ok(self.snapshots.read().get(execution_id).cloned())
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(execution_id)
            .ok_or_else(|| anyhow::anyhow!("Execution not found: {}", execution_id))?;
        record.execution.transition(status, error);
        Ok(())
    }

    async fn upsert_node_execution(
        &self,
        execution_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<NodeExecution> {
        let mut records = self.records.write();
        let record = records
            .get_mut(execution_id)
            .ok_or_else(|| anyhow::anyhow!("Execution not found: {}", execution_id))?;

        let position = match record.nodes.iter().position(|n| n.node_id == node_id) {
            Some(position) => position,
            None => {
                record.nodes.push(NodeExecution::new(execution_id, node_id));
                record.nodes.len() - 1
            }
        };

        let row = &mut record.nodes[position];
        row.apply(update);
        Ok(row.clone())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self.records.read().get(execution_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Node;
    use serde_json::json;

    fn workflow(id: &str) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: "test".to_string(),
            nodes: vec![Node::new("t", "manual_trigger", json!({}))],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn one_row_per_node_across_attempts() {
        let store = MemoryExecutionStore::new();
        let execution = store.create_execution(&workflow("wf")).await.unwrap();
        let id = execution.id.as_str();

        store.upsert_node_execution(id, "swap", NodeUpdate::running(json!({"a": 1}))).await.unwrap();
        store.upsert_node_execution(id, "swap", NodeUpdate::failed("[handler] boom".into())).await.unwrap();
        let retried = store.upsert_node_execution(id, "swap", NodeUpdate::running(json!({"a": 2}))).await.unwrap();

        assert_eq!(retried.status, NodeStatus::Running);
        assert_eq!(retried.error, None);
        assert_eq!(retried.input, json!({"a": 2}));

        let done = store.upsert_node_execution(id, "swap", NodeUpdate::completed(json!({"ok": true}))).await.unwrap();
        assert_eq!(done.input, json!({"a": 2}));
        assert!(done.completed_at.is_some());

        let record = store.get_execution(id).await.unwrap().unwrap();
        assert_eq!(record.nodes.len(), 1);
        assert_eq!(record.completed_nodes().count(), 1);
    }

    #[tokio::test]
    async fn status_transitions_stamp_completion() {
        let store = MemoryExecutionStore::new();
        let execution = store.create_execution(&workflow("wf")).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Pending);

        store.update_execution_status(&execution.id, ExecutionStatus::Failed, Some("node 'x' failed")).await.unwrap();
        let record = store.get_execution(&execution.id).await.unwrap().unwrap();
        assert!(record.execution.completed_at.is_some());
        assert_eq!(record.execution.error_summary.as_deref(), Some("node 'x' failed"));

        store.update_execution_status(&execution.id, ExecutionStatus::Running, None).await.unwrap();
        let record = store.get_execution(&execution.id).await.unwrap().unwrap();
        assert!(record.execution.completed_at.is_none());
        assert!(record.execution.error_summary.is_none());

        assert!(store.update_execution_status("ghost", ExecutionStatus::Running, None).await.is_err());
    }

    #[tokio::test]
    async fn keeps_the_workflow_a_run_started_from() {
        let store = MemoryExecutionStore::new();
        let mut definition = workflow("wf");
        let execution = store.create_execution(&definition).await.unwrap();
        assert_eq!(execution.workflow_id, "wf");

        definition.nodes.push(Node::new("late", "manual_trigger", json!({})));

        let snapshot = store.load_snapshot(&execution.id).await.unwrap().unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(store.load_snapshot("ghost").await.unwrap().is_none());
    }

    #[test]
    fn serializes_camel_case() {
        let execution = WorkflowExecution::pending("wf-1");
        let value = serde_json::to_value(&execution).unwrap();
        assert_eq!(value["workflowId"], json!("wf-1"));
        assert_eq!(value["status"], json!("pending"));
        assert_eq!("paused".parse::<ExecutionStatus>().unwrap(), ExecutionStatus::Paused);
    }
}
