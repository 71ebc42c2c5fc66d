/// Hot-reload workflow registry using ArcSwap
///
/// Holds the published workflow snapshots runs are started from. Every update
/// swaps the whole map, so a run that already loaded its `Arc<Workflow>` keeps
/// executing against the snapshot it started with while edits land.

use crate::error::EngineError;
use crate::workflow::{storage::WorkflowStorage, types::Workflow};
use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};

/// Source of immutable workflow snapshots for the coordinator
#[async_trait]
pub trait GraphLoader: Send + Sync {
    /// Return the node/edge snapshot for a run
    async fn load_workflow(&self, workflow_id: &str) -> crate::error::Result<Arc<Workflow>>;
}

/// Lock-free workflow registry
///
/// Reads never block; writers clone the current map, modify the copy and
/// store it back atomically.
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Key: workflow_id, Value: published snapshot
    workflows: ArcSwap<HashMap<String, Arc<Workflow>>>,

    /// Durable backing store; `None` for purely in-memory registries
    storage: Option<WorkflowStorage>,
}

impl WorkflowRegistry {
    /// Registry backed by SQLite storage
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage: Some(storage),
        }
    }

    /// Registry without persistence (tests, embedded use)
    pub fn in_memory() -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage: None,
        }
    }

    pub fn storage(&self) -> Option<&WorkflowStorage> {
        self.storage.as_ref()
    }

    /// Populate the registry from storage at startup
    pub async fn init_from_storage(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let loaded: HashMap<String, Arc<Workflow>> = storage
            .load_all_workflows()
            .await?
            .into_iter()
            .map(|workflow| (workflow.id.clone(), Arc::new(workflow)))
            .collect();

        self.workflows.store(Arc::new(loaded));

        tracing::info!("📚 Initialized workflow registry with {} workflows",
            self.workflows.load().len());

        Ok(())
    }

    /// Persist (when backed) and publish a workflow snapshot
    pub async fn publish(&self, workflow: Workflow) -> Result<Arc<Workflow>> {
        if let Some(storage) = &self.storage {
            storage.save_workflow(&workflow).await?;
        }

        let snapshot = Arc::new(workflow);
        self.swap_in(snapshot.clone());

        tracing::info!("🔄 Published workflow: {}", snapshot.id);
        Ok(snapshot)
    }

    /// Lock-free read of the current snapshot
    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<Workflow>> {
        self.workflows.load().get(workflow_id).cloned()
    }

    /// All published snapshots, ordered by id
    pub fn list_workflows(&self) -> Vec<Arc<Workflow>> {
        let mut all: Vec<Arc<Workflow>> = self.workflows.load().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Remove a workflow from memory and storage; returns whether it existed
    pub async fn remove_workflow(&self, workflow_id: &str) -> Result<bool> {
        let mut removed = false;
        if let Some(storage) = &self.storage {
            removed = storage.delete_workflow(workflow_id).await?;
        }

        let previous = self.workflows.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(workflow_id);
            next
        });
        if previous.contains_key(workflow_id) {
            removed = true;
            tracing::info!("🗑️ Removed workflow from registry: {}", workflow_id);
        }

        Ok(removed)
    }

    /// Copy-on-write insert; `rcu` retries if another writer swapped in between
    fn swap_in(&self, snapshot: Arc<Workflow>) {
        self.workflows.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(snapshot.id.clone(), snapshot.clone());
            next
        });
    }
}

#[async_trait]
impl GraphLoader for WorkflowRegistry {
    async fn load_workflow(&self, workflow_id: &str) -> crate::error::Result<Arc<Workflow>> {
        if let Some(snapshot) = self.get_workflow(workflow_id) {
            return Ok(snapshot);
        }

        // Fall back to storage for workflows written by another process
        let Some(storage) = &self.storage else {
            return Err(EngineError::NotFound(format!("workflow {}", workflow_id)));
        };

        let workflow = storage
            .get_workflow(workflow_id)
            .await
            .map_err(|e| EngineError::Loader(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("workflow {}", workflow_id)))?;

        let snapshot = Arc::new(workflow);
        self.swap_in(snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Node;
    use serde_json::json;

    fn workflow(id: &str, name: &str) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: name.to_string(),
            nodes: vec![Node::new("t", "manual_trigger", json!({}))],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn running_snapshot_survives_republish() {
        let registry = WorkflowRegistry::in_memory();
        registry.publish(workflow("wf", "v1")).await.unwrap();

        let held = registry.load_workflow("wf").await.unwrap();
        registry.publish(workflow("wf", "v2")).await.unwrap();

        assert_eq!(held.name, "v1");
        assert_eq!(registry.get_workflow("wf").unwrap().name, "v2");
    }

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let registry = WorkflowRegistry::in_memory();
        assert!(matches!(
            registry.load_workflow("nope").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(!registry.remove_workflow("nope").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_are_all_kept() {
        let registry = Arc::new(WorkflowRegistry::in_memory());

        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.publish(workflow(&format!("wf-{}", i), "v1")).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.list_workflows().len(), 32);
    }

    #[tokio::test]
    async fn initializes_from_storage() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = WorkflowStorage::new(pool).await.unwrap();
        storage.save_workflow(&workflow("a", "stored")).await.unwrap();

        let registry = WorkflowRegistry::new(storage);
        registry.init_from_storage().await.unwrap();

        assert_eq!(registry.list_workflows().len(), 1);
        assert!(registry.remove_workflow("a").await.unwrap());
        assert!(registry.get_workflow("a").is_none());
    }
}
