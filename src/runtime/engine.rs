/// Execution coordinator
///
/// Drives one workflow run at a time per execution id: validates the graph,
/// dispatches every node whose predecessors have completed (up to the fan-out
/// limit), records each transition in the execution store and feeds outputs
/// forward through the run's execution context.
///
/// Node failures are recorded on the node and fail the run; nodes already in
/// flight finish, nothing new is dispatched. Store failures escape as
/// `EngineError` and abort the run.

use crate::blocks::{BlockHandler, HandlerRegistry, NodeContext};
use crate::config::{EngineConfig, SchemaPolicy};
use crate::error::{EngineError, NodeError, Result};
use crate::runtime::context::ExecutionContext;
use crate::runtime::inputs::{input_snapshot, reconcile, resolve_input};
use crate::runtime::notify::{Notifier, StatusEvent};
use crate::runtime::state::{
    ExecutionRecord, ExecutionStatus, ExecutionStore, NodeExecution, NodeStatus, NodeUpdate,
    WorkflowExecution,
};
use crate::workflow::{ExecutionPlan, GraphLoader, Node, Workflow};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinHandle, JoinSet};

/// Background drive of a run, returned by run control calls that spawn
pub type RunTask = JoinHandle<Result<ExecutionStatus>>;

/// In-memory state of a run the coordinator knows about
struct RunHandle {
    execution_id: String,
    workflow: Arc<Workflow>,
    plan: ExecutionPlan,
    context: ExecutionContext,
    /// Checked before every dispatch; in-flight handlers are never interrupted
    pause_requested: AtomicBool,
    /// Set while a scheduling loop owns the run
    driving: AtomicBool,
    /// Serializes run status writes between pause and the scheduling loop
    transitions: tokio::sync::Mutex<()>,
}

impl RunHandle {
    fn new(execution_id: String, workflow: Arc<Workflow>, plan: ExecutionPlan, context: ExecutionContext) -> Self {
        Self {
            execution_id,
            workflow,
            plan,
            context,
            pause_requested: AtomicBool::new(false),
            driving: AtomicBool::new(false),
            transitions: tokio::sync::Mutex::new(()),
        }
    }
}

/// Releases the `driving` flag when the scheduling loop ends
struct DriveGuard(Arc<RunHandle>);

impl Drop for DriveGuard {
    fn drop(&mut self) {
        self.0.driving.store(false, Ordering::SeqCst);
    }
}

/// Result of one dispatch that did not hit a store error
enum NodeOutcome {
    Completed,
    Failed(String),
}

/// Everything a dispatch task needs, cloned into each task
#[derive(Clone)]
struct Dispatcher {
    store: Arc<dyn ExecutionStore>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl Dispatcher {
    /// Resolve input, run the handler and record the outcome for one node
    async fn dispatch(
        &self,
        run: &RunHandle,
        node: Node,
        handler: Arc<dyn BlockHandler>,
    ) -> Result<NodeOutcome> {
        let execution_id = run.execution_id.as_str();
        let snapshot = run.context.snapshot();
        let input = resolve_input(&node, &run.plan, &snapshot);

        let compatibility = reconcile(&node, &input);
        let mut rejection = None;
        if let Some(result) = &compatibility {
            let threshold = self.config.schema_acceptance_threshold;
            if result.score < threshold {
                match self.config.schema_policy {
                    SchemaPolicy::Warn => tracing::warn!(
                        node_id = %node.id,
                        score = result.score,
                        threshold,
                        "Upstream data below schema acceptance threshold, dispatching anyway"
                    ),
                    SchemaPolicy::Halt => {
                        rejection = Some(NodeError::SchemaRejected { score: result.score, threshold })
                    }
                }
            }
        }

        self.store
            .upsert_node_execution(
                execution_id,
                &node.id,
                NodeUpdate::running(input_snapshot(&input, compatibility.as_ref())),
            )
            .await
            .map_err(EngineError::store)?;
        self.emit(execution_id, &node.id, NodeStatus::Running, None);

        tracing::info!("📍 Executing node '{}' (type: {})", node.id, node.block_type);
        let started = Instant::now();

        let result = match rejection {
            Some(err) => Err(err),
            None => {
                let ctx = NodeContext {
                    execution_id: execution_id.to_string(),
                    workflow_id: run.workflow.id.clone(),
                    node_id: node.id.clone(),
                    outputs: snapshot,
                    timeout_secs: self.config.handler_timeout_secs,
                };
                // A panicking handler fails its node, not the scheduling loop
                let call = tokio::spawn(async move { handler.execute(&input, &ctx).await });
                match call.await {
                    Ok(result) => result,
                    Err(join_error) => Err(NodeError::Failed(anyhow::anyhow!(
                        "handler panicked: {}",
                        join_error
                    ))),
                }
            }
        };

        match result {
            Ok(output) => {
                self.store
                    .upsert_node_execution(execution_id, &node.id, NodeUpdate::completed(output.clone()))
                    .await
                    .map_err(EngineError::store)?;
                run.context.insert(&node.id, output);
                self.emit(execution_id, &node.id, NodeStatus::Completed, None);

                tracing::info!("✅ Node '{}' completed in {:?}", node.id, started.elapsed());
                Ok(NodeOutcome::Completed)
            }
            Err(err) => {
                let message = err.to_record();
                tracing::error!("❌ Node '{}' failed: {}", node.id, message);

                self.store
                    .upsert_node_execution(execution_id, &node.id, NodeUpdate::failed(message.clone()))
                    .await
                    .map_err(EngineError::store)?;
                self.emit(execution_id, &node.id, NodeStatus::Failed, Some(message.clone()));

                Ok(NodeOutcome::Failed(message))
            }
        }
    }

    fn emit(&self, execution_id: &str, node_id: &str, status: NodeStatus, error: Option<String>) {
        self.notifier.notify(StatusEvent::Node {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            status,
            error,
        });
    }
}

/// Workflow execution coordinator
pub struct ExecutionEngine {
    /// Immutable after construction
    handlers: Arc<HandlerRegistry>,
    store: Arc<dyn ExecutionStore>,
    loader: Arc<dyn GraphLoader>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    /// Runs being prepared or driven; a run leaves when its scheduling loop
    /// ends and is rehydrated from the store on demand
    runs: Mutex<HashMap<String, Arc<RunHandle>>>,
}

impl ExecutionEngine {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        store: Arc<dyn ExecutionStore>,
        loader: Arc<dyn GraphLoader>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            handlers,
            store,
            loader,
            notifier,
            config,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Load the workflow, create a `pending` run holding its snapshot and validate it
    ///
    /// A run that fails validation stays `pending` with its error summary set
    /// and the validation error is returned.
    pub async fn prepare_run(&self, workflow_id: &str) -> Result<String> {
        let workflow = self.loader.load_workflow(workflow_id).await?;
        let execution = self
            .store
            .create_execution(&workflow)
            .await
            .map_err(EngineError::store)?;
        self.emit_execution(&execution.id, workflow_id, ExecutionStatus::Pending, None);

        let plan = match self.validate(&workflow) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!("❌ Workflow '{}' rejected before dispatch: {}", workflow_id, err);
                let summary = err.to_string();
                self.set_status(&execution.id, workflow_id, ExecutionStatus::Pending, Some(&summary))
                    .await?;
                return Err(err);
            }
        };

        for node_id in plan.order() {
            self.store
                .upsert_node_execution(&execution.id, node_id, NodeUpdate::pending())
                .await
                .map_err(EngineError::store)?;
        }

        tracing::info!("📝 Prepared execution {} for workflow '{}'", execution.id, workflow_id);

        let run = Arc::new(RunHandle::new(
            execution.id.clone(),
            workflow,
            plan,
            ExecutionContext::new(),
        ));
        self.runs.lock().insert(execution.id.clone(), run);

        Ok(execution.id)
    }

    /// Run the scheduling loop until the run completes, fails or pauses
    pub async fn drive(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let run = self.run_handle(execution_id).await?;
        let guard = Self::claim(&run)?;
        self.drive_claimed(run, guard, Vec::new()).await
    }

    /// Prepare and drive a run to its end
    pub async fn run_workflow(&self, workflow_id: &str) -> Result<WorkflowExecution> {
        let execution_id = self.prepare_run(workflow_id).await?;
        self.drive(&execution_id).await?;
        self.get_run_status(&execution_id).await
    }

    /// Prepare a run and drive it in the background; returns the execution id
    pub async fn start_run(self: &Arc<Self>, workflow_id: &str) -> Result<String> {
        let execution_id = self.prepare_run(workflow_id).await?;
        let run = self.run_handle(&execution_id).await?;
        let guard = Self::claim(&run)?;
        self.spawn_drive(run, guard, Vec::new());
        Ok(execution_id)
    }

    /// Stop dispatching new nodes; handlers already running finish
    pub async fn pause_run(&self, execution_id: &str) -> Result<()> {
        let run = self.cached(execution_id);
        let _transition = match &run {
            Some(run) => Some(run.transitions.lock().await),
            None => None,
        };

        let record = self.load_record(execution_id).await?;
        let status = record.execution.status;
        if !matches!(status, ExecutionStatus::Pending | ExecutionStatus::Running) {
            return Err(Self::invalid_state(execution_id, status, "pause"));
        }

        if let Some(run) = &run {
            run.pause_requested.store(true, Ordering::SeqCst);
        }
        self.set_status(execution_id, &record.execution.workflow_id, ExecutionStatus::Paused, None)
            .await?;

        tracing::info!("⏸️ Paused execution {}", execution_id);
        Ok(())
    }

    /// Continue a paused or failed run from its first non-completed nodes
    pub async fn resume_run(self: &Arc<Self>, execution_id: &str) -> Result<RunTask> {
        let run = self.run_handle(execution_id).await?;
        let guard = Self::claim(&run)?;

        let status = self.load_record(execution_id).await?.execution.status;
        if !matches!(status, ExecutionStatus::Paused | ExecutionStatus::Failed) {
            return Err(Self::invalid_state(execution_id, status, "resume"));
        }

        run.pause_requested.store(false, Ordering::SeqCst);
        tracing::info!("▶️ Resuming execution {}", execution_id);
        Ok(self.spawn_drive(run, guard, Vec::new()))
    }

    /// Re-execute a failed node (or every failed node) and whatever depends on it
    ///
    /// Completed upstream outputs are reused from the execution context. When
    /// one node is named, the other failed nodes keep their failure and are not
    /// dispatched; the run ends `failed` if any of them remain.
    pub async fn retry_run(self: &Arc<Self>, execution_id: &str, node_id: Option<&str>) -> Result<RunTask> {
        let run = self.run_handle(execution_id).await?;
        let guard = Self::claim(&run)?;

        let record = self.load_record(execution_id).await?;
        let status = record.execution.status;
        if !matches!(status, ExecutionStatus::Failed | ExecutionStatus::Paused) {
            return Err(Self::invalid_state(execution_id, status, "retry"));
        }

        let roots: Vec<String> = match node_id {
            Some(node_id) => {
                if !run.plan.contains(node_id) {
                    return Err(EngineError::NotFound(format!(
                        "node {} in execution {}",
                        node_id, execution_id
                    )));
                }
                let node_status = record.node(node_id).map(|n| n.status).unwrap_or(NodeStatus::Pending);
                if node_status != NodeStatus::Failed {
                    return Err(EngineError::NodeNotRetryable {
                        node_id: node_id.to_string(),
                        status: node_status.to_string(),
                    });
                }
                vec![node_id.to_string()]
            }
            None => record
                .nodes
                .iter()
                .filter(|n| n.status == NodeStatus::Failed)
                .map(|n| n.node_id.clone())
                .collect(),
        };

        let mut targets: Vec<String> = Vec::new();
        for root in &roots {
            for id in std::iter::once(root.clone()).chain(run.plan.downstream_of(root)) {
                if !targets.contains(&id) {
                    targets.push(id);
                }
            }
        }

        for target in &targets {
            if record.node(target).map(|n| n.status) == Some(NodeStatus::Completed) {
                continue;
            }
            run.context.remove(target);
            self.store
                .upsert_node_execution(execution_id, target, NodeUpdate::pending())
                .await
                .map_err(EngineError::store)?;

            let irreversible = run
                .workflow
                .node(target)
                .and_then(|node| self.handlers.get(&node.block_type))
                .map(|handler| handler.irreversible())
                .unwrap_or(false);
            if irreversible {
                tracing::info!("🔁 Retrying irreversible node '{}'; handler checks for an earlier submission", target);
            }
        }

        let held: Vec<(String, String)> = record
            .nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Failed && !targets.contains(&n.node_id))
            .map(|n| (n.node_id.clone(), n.error.clone().unwrap_or_default()))
            .collect();

        run.pause_requested.store(false, Ordering::SeqCst);
        tracing::info!("🔁 Retrying execution {} ({} nodes reset, {} left failed)",
            execution_id, targets.len(), held.len());
        Ok(self.spawn_drive(run, guard, held))
    }

    pub async fn get_run_status(&self, execution_id: &str) -> Result<WorkflowExecution> {
        Ok(self.load_record(execution_id).await?.execution)
    }

    /// Run plus its node rows
    pub async fn get_run(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.load_record(execution_id).await
    }

    /// Check graph structure, block types and per-handler config
    pub fn validate(&self, workflow: &Workflow) -> Result<ExecutionPlan> {
        let plan = ExecutionPlan::build(workflow)?;

        for node in &workflow.nodes {
            let handler = self.handlers.get(&node.block_type).ok_or_else(|| {
                EngineError::UnknownBlockType {
                    node_id: node.id.clone(),
                    block_type: node.block_type.clone(),
                }
            })?;

            handler
                .validate_config(&node.config)
                .map_err(|e| EngineError::InvalidConfig {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                })?;
        }

        Ok(plan)
    }

    fn cached(&self, execution_id: &str) -> Option<Arc<RunHandle>> {
        self.runs.lock().get(execution_id).cloned()
    }

    /// In-memory run, or one rebuilt from its stored snapshot with completed
    /// outputs restored
    async fn run_handle(&self, execution_id: &str) -> Result<Arc<RunHandle>> {
        if let Some(run) = self.cached(execution_id) {
            return Ok(run);
        }

        let record = self.load_record(execution_id).await?;
        let workflow = self
            .store
            .load_snapshot(execution_id)
            .await
            .map_err(EngineError::store)?
            .ok_or_else(|| {
                EngineError::Store(format!("execution {} has no workflow snapshot", execution_id))
            })?;
        let plan = self.validate(&workflow)?;

        let mut completed: Vec<&NodeExecution> = record
            .completed_nodes()
            .filter(|n| plan.contains(&n.node_id))
            .collect();
        completed.sort_by_key(|n| n.completed_at);
        let outputs = completed
            .into_iter()
            .map(|n| (n.node_id.clone(), n.output.clone().unwrap_or(Value::Null)))
            .collect::<Vec<_>>();

        tracing::info!("♻️ Rehydrated execution {} with {} completed nodes", execution_id, outputs.len());

        let run = Arc::new(RunHandle::new(
            execution_id.to_string(),
            Arc::new(workflow),
            plan,
            ExecutionContext::from_outputs(outputs),
        ));
        if record.execution.status == ExecutionStatus::Paused {
            run.pause_requested.store(true, Ordering::SeqCst);
        }

        // Finished runs are only inspected, never driven again
        if record.execution.status == ExecutionStatus::Completed {
            return Ok(run);
        }

        Ok(self
            .runs
            .lock()
            .entry(execution_id.to_string())
            .or_insert(run)
            .clone())
    }

    fn claim(run: &Arc<RunHandle>) -> Result<DriveGuard> {
        if run.driving.swap(true, Ordering::SeqCst) {
            return Err(EngineError::InvalidState {
                execution_id: run.execution_id.clone(),
                status: ExecutionStatus::Running.to_string(),
                action: "start a second scheduling loop".to_string(),
            });
        }
        Ok(DriveGuard(Arc::clone(run)))
    }

    /// Drop the run from memory unless a newer handle already replaced it
    fn release(&self, run: &Arc<RunHandle>) {
        let mut runs = self.runs.lock();
        if runs
            .get(&run.execution_id)
            .is_some_and(|cached| Arc::ptr_eq(cached, run))
        {
            runs.remove(&run.execution_id);
        }
    }

    fn spawn_drive(self: &Arc<Self>, run: Arc<RunHandle>, guard: DriveGuard, held: Vec<(String, String)>) -> RunTask {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let execution_id = run.execution_id.clone();
            let result = engine.drive_claimed(run, guard, held).await;
            if let Err(err) = &result {
                tracing::error!("💥 Execution {} aborted: {}", execution_id, err);
            }
            result
        })
    }

    /// Scheduling loop; `held` lists failed nodes (with their errors) that
    /// stay failed and are never dispatched
    async fn drive_claimed(
        &self,
        run: Arc<RunHandle>,
        _guard: DriveGuard,
        held: Vec<(String, String)>,
    ) -> Result<ExecutionStatus> {
        let execution_id = run.execution_id.clone();
        let workflow_id = run.workflow.id.clone();

        {
            let _transition = run.transitions.lock().await;
            let status = self.load_record(&execution_id).await?.execution.status;
            if status == ExecutionStatus::Completed {
                return Err(Self::invalid_state(&execution_id, status, "drive"));
            }
            if run.pause_requested.load(Ordering::SeqCst) {
                self.release(&run);
                return Ok(ExecutionStatus::Paused);
            }
            self.set_status(&execution_id, &workflow_id, ExecutionStatus::Running, None)
                .await?;
        }

        tracing::info!("🚀 Starting execution {} of workflow '{}' ({} nodes)",
            execution_id, workflow_id, run.plan.len());
        let started = Instant::now();

        let mut completed: HashSet<String> = self
            .load_record(&execution_id)
            .await?
            .completed_nodes()
            .filter(|n| run.plan.contains(&n.node_id))
            .map(|n| n.node_id.clone())
            .collect();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut tasks = JoinSet::new();
        let mut failure: Option<String> = None;
        let mut fatal: Option<EngineError> = None;
        let limit = self.config.max_parallel_nodes.max(1);

        loop {
            let accepting = failure.is_none() && fatal.is_none();
            if accepting && !run.pause_requested.load(Ordering::SeqCst) {
                let ready: Vec<String> = run
                    .plan
                    .ready(&completed, &in_flight)
                    .into_iter()
                    .filter(|id| !held.iter().any(|(held_id, _)| held_id == id))
                    .map(str::to_string)
                    .collect();

                for node_id in ready {
                    if in_flight.len() >= limit {
                        break;
                    }
                    let Some(node) = run.workflow.node(&node_id).cloned() else {
                        continue;
                    };
                    let Some(handler) = self.handlers.get(&node.block_type) else {
                        fatal = Some(EngineError::UnknownBlockType {
                            node_id: node.id.clone(),
                            block_type: node.block_type.clone(),
                        });
                        break;
                    };

                    in_flight.insert(node_id.clone());
                    let dispatcher = self.dispatcher();
                    let task_run = Arc::clone(&run);
                    tasks.spawn(async move {
                        let outcome = dispatcher.dispatch(&task_run, node, handler).await;
                        (node_id, outcome)
                    });
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok((node_id, Ok(NodeOutcome::Completed))) => {
                    in_flight.remove(&node_id);
                    completed.insert(node_id);
                }
                Ok((node_id, Ok(NodeOutcome::Failed(message)))) => {
                    in_flight.remove(&node_id);
                    failure.get_or_insert_with(|| format!("node '{}' failed: {}", node_id, message));
                }
                Ok((node_id, Err(err))) => {
                    in_flight.remove(&node_id);
                    tracing::error!("💥 State store failure while running '{}': {}", node_id, err);
                    fatal.get_or_insert(err);
                }
                Err(join_error) => {
                    fatal.get_or_insert(EngineError::Store(format!(
                        "dispatch task aborted: {}",
                        join_error
                    )));
                }
            }
        }

        let _transition = run.transitions.lock().await;

        if let Some(err) = fatal {
            let summary = err.to_string();
            if let Err(store_err) = self
                .set_status(&execution_id, &workflow_id, ExecutionStatus::Failed, Some(&summary))
                .await
            {
                tracing::error!("💥 Could not record failure of {}: {}", execution_id, store_err);
            }
            self.release(&run);
            return Err(err);
        }

        let all_completed = run.plan.order().iter().all(|id| completed.contains(id));
        let (status, summary) = match (failure, held.first()) {
            (Some(summary), _) => (ExecutionStatus::Failed, Some(summary)),
            (None, _) if all_completed => (ExecutionStatus::Completed, None),
            (None, _) if run.pause_requested.load(Ordering::SeqCst) => (ExecutionStatus::Paused, None),
            (None, Some((node_id, message))) => (
                ExecutionStatus::Failed,
                Some(format!("node '{}' failed: {}", node_id, message)),
            ),
            (None, None) => (ExecutionStatus::Paused, None),
        };
        let recorded = self
            .set_status(&execution_id, &workflow_id, status, summary.as_deref())
            .await;
        self.release(&run);
        recorded?;

        match status {
            ExecutionStatus::Completed => {
                tracing::info!("🎉 Execution {} completed in {:?}", execution_id, started.elapsed());
            }
            ExecutionStatus::Paused => {
                tracing::info!("⏸️ Execution {} paused with {}/{} nodes completed",
                    execution_id, completed.len(), run.plan.len());
            }
            _ => {
                tracing::warn!("⚠️ Execution {} failed: {}", execution_id, summary.as_deref().unwrap_or_default());
            }
        }

        Ok(status)
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            config: self.config.clone(),
        }
    }

    async fn load_record(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.store
            .get_execution(execution_id)
            .await
            .map_err(EngineError::store)?
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))
    }

    async fn set_status(
        &self,
        execution_id: &str,
        workflow_id: &str,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.store
            .update_execution_status(execution_id, status, error)
            .await
            .map_err(EngineError::store)?;
        self.emit_execution(execution_id, workflow_id, status, error.map(str::to_string));
        Ok(())
    }

    fn emit_execution(&self, execution_id: &str, workflow_id: &str, status: ExecutionStatus, error: Option<String>) {
        self.notifier.notify(StatusEvent::Execution {
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            status,
            error,
        });
    }

    fn invalid_state(execution_id: &str, status: ExecutionStatus, action: &str) -> EngineError {
        EngineError::InvalidState {
            execution_id: execution_id.to_string(),
            status: status.to_string(),
            action: action.to_string(),
        }
    }
}
