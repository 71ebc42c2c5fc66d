/// SQLite persistence layer for workflow definitions
///
/// Workflow snapshots are stored as JSON next to a few indexed columns used
/// for listing. This is the durable side of the graph loader; the registry
/// keeps the in-memory copies runs are started from.

use crate::workflow::types::Workflow;
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, Row};

/// SQLite-based workflow storage manager
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// SQLite connection pool shared with the execution store
    pool: SqlitePool,
}

impl WorkflowStorage {
    /// Create storage over an existing pool and make sure the schema exists
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create the workflows table; safe to call repeatedly
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                node_count INTEGER NOT NULL,
                definition TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_name ON workflows(name)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or replace a workflow snapshot
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, node_count, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                node_count = excluded.node_count,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(workflow.nodes.len() as i64)
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a workflow by ID
    pub async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let definition_json: String = row.get("definition");
            serde_json::from_str(&definition_json).map_err(anyhow::Error::from)
        })
        .transpose()
    }

    /// List stored workflows, most recently updated first
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        let rows = sqlx::query(
            "SELECT id, name, node_count, created_at, updated_at FROM workflows ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| WorkflowSummary {
                id: row.get("id"),
                name: row.get("name"),
                node_count: row.get("node_count"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Load every stored workflow for registry initialization
    pub async fn load_all_workflows(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT definition FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let definition_json: String = row.get("definition");
                serde_json::from_str(&definition_json).map_err(anyhow::Error::from)
            })
            .collect()
    }

    /// Delete a workflow by ID; returns whether a row was removed
    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Workflow listing entry
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub node_count: i64,
    pub created_at: String,
    pub updated_at: String,
}
