/// SQLite-backed execution state store
///
/// Shares the connection pool with workflow storage. Runs and node rows live
/// in two tables; `(execution_id, node_id)` is unique so retries update the
/// existing node row instead of adding one. Each run row carries the workflow
/// snapshot as JSON text.

use crate::runtime::state::{
    ExecutionRecord, ExecutionStatus, ExecutionStore, NodeExecution, NodeUpdate, WorkflowExecution,
};
use crate::workflow::Workflow;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Create the store and its tables
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error_summary TEXT,
                snapshot TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_executions (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                status TEXT NOT NULL,
                input TEXT NOT NULL,
                output TEXT,
                error TEXT,
                started_at TEXT,
                completed_at TEXT,
                UNIQUE(execution_id, node_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_workflow_executions_workflow ON workflow_executions(workflow_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_execution(&self, execution_id: &str) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| execution_from_row(&row)).transpose()
    }

    async fn fetch_node(&self, execution_id: &str, node_id: &str) -> Result<Option<NodeExecution>> {
        let row = sqlx::query("SELECT * FROM node_executions WHERE execution_id = ? AND node_id = ?")
            .bind(execution_id)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| node_from_row(&row)).transpose()
    }

    async fn insert_execution(&self, execution: &WorkflowExecution, snapshot: &Workflow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, status, started_at, completed_at, error_summary, snapshot)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(execution.status.as_str())
        .bind(execution.started_at.to_rfc3339())
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(&execution.error_summary)
        .bind(serde_json::to_string(snapshot)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn write_status(&self, execution: &WorkflowExecution) -> Result<()> {
        sqlx::query(
            "UPDATE workflow_executions SET status = ?, completed_at = ?, error_summary = ? WHERE id = ?",
        )
        .bind(execution.status.as_str())
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(&execution.error_summary)
        .bind(&execution.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn create_execution(&self, workflow: &Workflow) -> Result<WorkflowExecution> {
        let execution = WorkflowExecution::pending(&workflow.id);
        self.insert_execution(&execution, workflow).await?;
        Ok(execution)
    }

    async fn load_snapshot(&self, execution_id: &str) -> Result<Option<Workflow>> {
        let snapshot: Option<String> =
            sqlx::query_scalar("SELECT snapshot FROM workflow_executions WHERE id = ?")
                .bind(execution_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(snapshot.as_deref().map(serde_json::from_str).transpose()?)
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut execution = self
            .fetch_execution(execution_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Execution not found: {}", execution_id))?;

        execution.transition(status, error);
        self.write_status(&execution).await
    }

    async fn upsert_node_execution(
        &self,
        execution_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<NodeExecution> {
        let mut row = match self.fetch_node(execution_id, node_id).await? {
            Some(row) => row,
            None => NodeExecution::new(execution_id, node_id),
        };
        row.apply(update);

        sqlx::query(
            r#"
            INSERT INTO node_executions
                (id, execution_id, node_id, status, input, output, error, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(execution_id, node_id) DO UPDATE SET
                status = excluded.status,
                input = excluded.input,
                output = excluded.output,
                error = excluded.error,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.execution_id)
        .bind(&row.node_id)
        .bind(row.status.as_str())
        .bind(serde_json::to_string(&row.input)?)
        .bind(row.output.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&row.error)
        .bind(row.started_at.map(|t| t.to_rfc3339()))
        .bind(row.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let Some(execution) = self.fetch_execution(execution_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query("SELECT * FROM node_executions WHERE execution_id = ? ORDER BY rowid")
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await?;

        let nodes = rows
            .iter()
            .map(node_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ExecutionRecord { execution, nodes }))
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn parse_optional_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

fn execution_from_row(row: &SqliteRow) -> Result<WorkflowExecution> {
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");

    Ok(WorkflowExecution {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        status: status.parse()?,
        started_at: parse_time(&started_at)?,
        completed_at: parse_optional_time(row.get("completed_at"))?,
        error_summary: row.get("error_summary"),
    })
}

fn node_from_row(row: &SqliteRow) -> Result<NodeExecution> {
    let status: String = row.get("status");
    let input: String = row.get("input");
    let output: Option<String> = row.get("output");

    Ok(NodeExecution {
        id: row.get("id"),
        execution_id: row.get("execution_id"),
        node_id: row.get("node_id"),
        status: status.parse()?,
        input: serde_json::from_str::<Value>(&input)?,
        output: output.as_deref().map(serde_json::from_str).transpose()?,
        error: row.get("error"),
        started_at: parse_optional_time(row.get("started_at"))?,
        completed_at: parse_optional_time(row.get("completed_at"))?,
    })
}
