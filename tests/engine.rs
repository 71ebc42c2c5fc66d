//! End-to-end coordinator scenarios against the in-memory execution store

use async_trait::async_trait;
use blockflow::blocks::{with_timeout, BlockHandler, BlockInput, HandlerRegistry, NodeContext, Services};
use blockflow::config::{EngineConfig, SchemaPolicy};
use blockflow::error::{EngineError, NodeError};
use blockflow::runtime::{
    BroadcastNotifier, ExecutionEngine, ExecutionStatus, MemoryExecutionStore, NodeStatus,
    StatusEvent,
};
use blockflow::schema::{SchemaDefinition, SchemaType};
use blockflow::workflow::{Edge, Node, Workflow, WorkflowRegistry};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Records every call and returns a fixed output
struct CountingBlock {
    block_type: String,
    calls: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<String>>>,
    output: Value,
}

impl CountingBlock {
    fn new(block_type: &str, log: &Arc<Mutex<Vec<String>>>, output: Value) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let block = Self {
            block_type: block_type.to_string(),
            calls: calls.clone(),
            log: log.clone(),
            output,
        };
        (block, calls)
    }
}

#[async_trait]
impl BlockHandler for CountingBlock {
    fn block_type(&self) -> &str {
        &self.block_type
    }

    fn description(&self) -> &str {
        "counts invocations"
    }

    async fn execute(&self, _input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(ctx.node_id.clone());
        Ok(self.output.clone())
    }
}

/// Fails until its failure budget is spent
struct FlakyBlock {
    calls: Arc<AtomicUsize>,
    failures_left: AtomicUsize,
}

#[async_trait]
impl BlockHandler for FlakyBlock {
    fn block_type(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "fails a fixed number of times"
    }

    async fn execute(&self, _input: &BlockInput, _ctx: &NodeContext) -> Result<Value, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spent = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if spent.is_ok() {
            return Err(NodeError::Failed(anyhow::anyhow!("rpc unavailable")));
        }
        Ok(json!({"ok": true}))
    }
}

/// Signals when it starts and waits for permission to finish
struct GateBlock {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl BlockHandler for GateBlock {
    fn block_type(&self) -> &str {
        "gate"
    }

    fn description(&self) -> &str {
        "waits for the test to release it"
    }

    async fn execute(&self, _input: &BlockInput, _ctx: &NodeContext) -> Result<Value, NodeError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(json!({"released": true}))
    }
}

struct SlowBlock;

#[async_trait]
impl BlockHandler for SlowBlock {
    fn block_type(&self) -> &str {
        "slow_rpc"
    }

    fn description(&self) -> &str {
        "never answers in time"
    }

    async fn execute(&self, _input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        with_timeout(ctx.timeout_secs, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        })
        .await
    }
}

struct PanickingBlock;

#[async_trait]
impl BlockHandler for PanickingBlock {
    fn block_type(&self) -> &str {
        "panics"
    }

    fn description(&self) -> &str {
        "panics when executed"
    }

    async fn execute(&self, _input: &BlockInput, _ctx: &NodeContext) -> Result<Value, NodeError> {
        panic!("boom")
    }
}

struct Harness {
    engine: Arc<ExecutionEngine>,
    registry: Arc<WorkflowRegistry>,
    store: Arc<MemoryExecutionStore>,
    notifier: Arc<BroadcastNotifier>,
}

impl Harness {
    fn new(handlers: HandlerRegistry, config: EngineConfig) -> Self {
        let registry = Arc::new(WorkflowRegistry::in_memory());
        let store = Arc::new(MemoryExecutionStore::new());
        let notifier = Arc::new(BroadcastNotifier::default());
        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(handlers),
            store.clone(),
            registry.clone(),
            notifier.clone(),
            config,
        ));
        Self { engine, registry, store, notifier }
    }

    /// A second coordinator over the same store and workflows, as after a restart
    fn restarted(&self, handlers: HandlerRegistry) -> Arc<ExecutionEngine> {
        Arc::new(ExecutionEngine::new(
            Arc::new(handlers),
            self.store.clone(),
            self.registry.clone(),
            self.notifier.clone(),
            EngineConfig::default(),
        ))
    }

    async fn publish(&self, workflow: Workflow) {
        self.registry.publish(workflow).await.unwrap();
    }
}

fn builtin() -> HandlerRegistry {
    HandlerRegistry::with_builtin(Services::unconfigured())
}

fn workflow(nodes: Vec<Node>, edges: Vec<(&str, &str)>) -> Workflow {
    Workflow {
        id: "wf".to_string(),
        name: "test workflow".to_string(),
        nodes,
        edges: edges.into_iter().map(|(s, t)| Edge::new(s, t)).collect(),
    }
}

fn trigger(payload: Value) -> Node {
    Node::new("t", "manual_trigger", json!({ "payload": payload }))
}

#[tokio::test]
async fn linear_run_with_false_comparison_completes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (after, after_calls) = CountingBlock::new("notify", &log, json!({"sent": true}));
    let mut handlers = builtin();
    handlers.register(Arc::new(after));

    let h = Harness::new(handlers, EngineConfig::default());
    h.publish(workflow(
        vec![
            trigger(json!({"price": 50})),
            Node::new("check", "comparator", json!({"operation": "gt", "left": "{{t.payload.price}}", "right": 100})),
            Node::new("after", "notify", json!({})),
        ],
        vec![("t", "check"), ("check", "after")],
    ))
    .await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.completed_at.is_some());

    let record = h.engine.get_run(&execution.id).await.unwrap();
    assert!(record.nodes.iter().all(|n| n.status == NodeStatus::Completed));
    let check = record.node("check").unwrap();
    assert_eq!(check.output.as_ref().unwrap()["passed"], json!(false));
    assert_eq!(check.input["config"]["left"], json!(50));
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);

    let err = h.engine.pause_run(&execution.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[tokio::test]
async fn join_node_waits_for_both_branches() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (left, _) = CountingBlock::new("left", &log, json!({"a": 1}));
    let (right, _) = CountingBlock::new("right", &log, json!({"b": 2}));
    let (join, join_calls) = CountingBlock::new("join", &log, json!({"joined": true}));
    let mut handlers = builtin();
    handlers.register(Arc::new(left));
    handlers.register(Arc::new(right));
    handlers.register(Arc::new(join));

    let h = Harness::new(handlers, EngineConfig::default());
    h.publish(workflow(
        vec![
            trigger(json!({})),
            Node::new("l", "left", json!({})),
            Node::new("r", "right", json!({})),
            Node::new("j", "join", json!({})),
        ],
        vec![("t", "l"), ("t", "r"), ("l", "j"), ("r", "j")],
    ))
    .await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(join_calls.load(Ordering::SeqCst), 1);

    let order = log.lock().clone();
    assert_eq!(order.last().map(String::as_str), Some("j"));
    assert_eq!(order.len(), 3);

    let record = h.engine.get_run(&execution.id).await.unwrap();
    let join_input = &record.node("j").unwrap().input["upstream"];
    assert_eq!(join_input["l"], json!({"a": 1}));
    assert_eq!(join_input["r"], json!({"b": 2}));
}

fn retry_handlers(log: &Arc<Mutex<Vec<String>>>) -> (HandlerRegistry, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let (source, source_calls) = CountingBlock::new("source", log, json!({"value": 7}));
    let (after, after_calls) = CountingBlock::new("notify", log, json!({"sent": true}));
    let flaky_calls = Arc::new(AtomicUsize::new(0));
    let flaky = FlakyBlock {
        calls: flaky_calls.clone(),
        failures_left: AtomicUsize::new(1),
    };

    let mut handlers = builtin();
    handlers.register(Arc::new(source));
    handlers.register(Arc::new(flaky));
    handlers.register(Arc::new(after));
    (handlers, source_calls, flaky_calls, after_calls)
}

fn retry_workflow() -> Workflow {
    workflow(
        vec![
            Node::new("src", "source", json!({})),
            Node::new("flaky", "flaky", json!({})),
            Node::new("after", "notify", json!({})),
        ],
        vec![("src", "flaky"), ("flaky", "after")],
    )
}

#[tokio::test]
async fn retry_reruns_failed_node_without_recomputing_upstream() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (handlers, source_calls, flaky_calls, after_calls) = retry_handlers(&log);
    let h = Harness::new(handlers, EngineConfig::default());
    h.publish(retry_workflow()).await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    let summary = execution.error_summary.unwrap();
    assert!(summary.contains("flaky"), "{}", summary);

    let record = h.engine.get_run(&execution.id).await.unwrap();
    assert_eq!(record.node("flaky").unwrap().error.as_deref(), Some("[handler] rpc unavailable"));
    assert_eq!(record.node("after").unwrap().status, NodeStatus::Pending);

    let err = h.engine.retry_run(&execution.id, Some("src")).await.unwrap_err();
    assert!(matches!(err, EngineError::NodeNotRetryable { .. }));
    let err = h.engine.retry_run(&execution.id, Some("ghost")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let task = h.engine.retry_run(&execution.id, Some("flaky")).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), ExecutionStatus::Completed);

    assert_eq!(source_calls.load(Ordering::SeqCst), 1);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 2);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);

    let record = h.engine.get_run(&execution.id).await.unwrap();
    assert_eq!(record.execution.status, ExecutionStatus::Completed);
    assert_eq!(record.execution.error_summary, None);
    assert_eq!(record.nodes.len(), 3);
    assert_eq!(record.node("flaky").unwrap().error, None);
}

#[tokio::test]
async fn retry_after_restart_reuses_stored_outputs() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (handlers, source_calls, flaky_calls, _) = retry_handlers(&log);
    let h = Harness::new(handlers.clone(), EngineConfig::default());
    h.publish(retry_workflow()).await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let restarted = h.restarted(handlers);
    let task = restarted.retry_run(&execution.id, None).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), ExecutionStatus::Completed);

    assert_eq!(source_calls.load(Ordering::SeqCst), 1);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 2);

    let record = restarted.get_run(&execution.id).await.unwrap();
    assert_eq!(record.node("flaky").unwrap().input["upstream"]["src"], json!({"value": 7}));
}

#[tokio::test]
async fn retry_after_restart_runs_the_snapshot_not_the_republished_workflow() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (handlers, source_calls, flaky_calls, after_calls) = retry_handlers(&log);
    let h = Harness::new(handlers.clone(), EngineConfig::default());
    h.publish(retry_workflow()).await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    // Same id, different graph: "src" and "after" are gone, "extra" is new
    h.publish(workflow(
        vec![
            Node::new("flaky", "flaky", json!({})),
            Node::new("extra", "notify", json!({})),
        ],
        vec![("flaky", "extra")],
    ))
    .await;

    let restarted = h.restarted(handlers);
    let task = restarted.retry_run(&execution.id, None).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), ExecutionStatus::Completed);

    assert_eq!(source_calls.load(Ordering::SeqCst), 1);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 2);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
    assert!(!log.lock().iter().any(|id| id == "extra"));

    let record = restarted.get_run(&execution.id).await.unwrap();
    let ids: Vec<&str> = record.nodes.iter().map(|n| n.node_id.as_str()).collect();
    assert_eq!(ids, vec!["src", "flaky", "after"]);
    assert!(record.nodes.iter().all(|n| n.status == NodeStatus::Completed));
}

#[tokio::test]
async fn retry_after_workflow_deleted_still_completes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (handlers, _, _, after_calls) = retry_handlers(&log);
    let h = Harness::new(handlers.clone(), EngineConfig::default());
    h.publish(retry_workflow()).await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    h.registry.remove_workflow("wf").await.unwrap();

    let task = h.restarted(handlers).retry_run(&execution.id, None).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), ExecutionStatus::Completed);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn named_retry_leaves_other_failed_branches_alone() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (source, source_calls) = CountingBlock::new("source", &log, json!({"value": 7}));
    let flaky_calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = builtin();
    handlers.register(Arc::new(source));
    handlers.register(Arc::new(FlakyBlock {
        calls: flaky_calls.clone(),
        failures_left: AtomicUsize::new(2),
    }));

    let h = Harness::new(handlers, EngineConfig::default());
    h.publish(workflow(
        vec![
            Node::new("src", "source", json!({})),
            Node::new("f1", "flaky", json!({})),
            Node::new("f2", "flaky", json!({})),
        ],
        vec![("src", "f1"), ("src", "f2")],
    ))
    .await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 2);

    let task = h.engine.retry_run(&execution.id, Some("f1")).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), ExecutionStatus::Failed);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 3);

    let record = h.engine.get_run(&execution.id).await.unwrap();
    assert_eq!(record.node("f1").unwrap().status, NodeStatus::Completed);
    let f2 = record.node("f2").unwrap();
    assert_eq!(f2.status, NodeStatus::Failed);
    assert_eq!(f2.error.as_deref(), Some("[handler] rpc unavailable"));
    let summary = record.execution.error_summary.unwrap();
    assert!(summary.contains("f2"), "{}", summary);

    let task = h.engine.retry_run(&execution.id, Some("f2")).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), ExecutionStatus::Completed);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 4);
    assert_eq!(source_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pause_stops_dispatch_and_resume_finishes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (after, after_calls) = CountingBlock::new("notify", &log, json!({"sent": true}));

    let mut handlers = builtin();
    handlers.register(Arc::new(GateBlock { started: started.clone(), release: release.clone() }));
    handlers.register(Arc::new(after));

    let h = Harness::new(handlers, EngineConfig::default());
    h.publish(workflow(
        vec![Node::new("gate", "gate", json!({})), Node::new("after", "notify", json!({}))],
        vec![("gate", "after")],
    ))
    .await;

    let execution_id = h.engine.prepare_run("wf").await.unwrap();
    let engine = h.engine.clone();
    let id = execution_id.clone();
    let drive = tokio::spawn(async move { engine.drive(&id).await });

    started.notified().await;
    h.engine.pause_run(&execution_id).await.unwrap();
    assert_eq!(
        h.engine.get_run_status(&execution_id).await.unwrap().status,
        ExecutionStatus::Paused
    );

    // A second loop on the same run is refused while the first owns it
    let err = h.engine.drive(&execution_id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));

    release.notify_one();
    assert_eq!(drive.await.unwrap().unwrap(), ExecutionStatus::Paused);

    let record = h.engine.get_run(&execution_id).await.unwrap();
    assert_eq!(record.node("gate").unwrap().status, NodeStatus::Completed);
    assert_eq!(record.node("after").unwrap().status, NodeStatus::Pending);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);

    let task = h.engine.resume_run(&execution_id).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), ExecutionStatus::Completed);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_graphs_stay_pending_with_summary() {
    let h = Harness::new(builtin(), EngineConfig::default());
    let mut events = h.notifier.subscribe();

    h.publish(workflow(
        vec![
            Node::new("a", "comparator", json!({"condition": "x > 1"})),
            Node::new("b", "comparator", json!({"condition": "x > 1"})),
        ],
        vec![("a", "b"), ("b", "a")],
    ))
    .await;

    let err = h.engine.prepare_run("wf").await.unwrap_err();
    assert!(matches!(err, EngineError::CycleDetected(_)));

    let execution_id = match events.recv().await.unwrap() {
        StatusEvent::Execution { execution_id, status, .. } => {
            assert_eq!(status, ExecutionStatus::Pending);
            execution_id
        }
        other => panic!("unexpected event {:?}", other),
    };

    let execution = h.engine.get_run_status(&execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Pending);
    assert!(execution.error_summary.unwrap().contains("cycle"));

    h.publish(workflow(vec![Node::new("x", "teleport", json!({}))], vec![])).await;
    let err = h.engine.prepare_run("wf").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownBlockType { .. }));

    h.publish(workflow(vec![Node::new("x", "protocol_health", json!({"protocol": "aave"}))], vec![])).await;
    let err = h.engine.prepare_run("wf").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig { .. }));

    let err = h.engine.prepare_run("missing").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn handler_timeout_is_recorded_as_timeout() {
    let mut handlers = builtin();
    handlers.register(Arc::new(SlowBlock));
    let config = EngineConfig {
        handler_timeout_secs: 1,
        ..EngineConfig::default()
    };

    let h = Harness::new(handlers, config);
    h.publish(workflow(
        vec![trigger(json!({})), Node::new("rpc", "slow_rpc", json!({}))],
        vec![("t", "rpc")],
    ))
    .await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_summary.unwrap().contains("[timeout]"));

    let record = h.engine.get_run(&execution.id).await.unwrap();
    let rpc = record.node("rpc").unwrap();
    assert_eq!(rpc.status, NodeStatus::Failed);
    assert!(rpc.error.as_deref().unwrap().starts_with("[timeout]"));
}

#[tokio::test]
async fn handler_panic_fails_only_its_node() {
    let mut handlers = builtin();
    handlers.register(Arc::new(PanickingBlock));

    let h = Harness::new(handlers, EngineConfig::default());
    h.publish(workflow(
        vec![trigger(json!({})), Node::new("bad", "panics", json!({}))],
        vec![("t", "bad")],
    ))
    .await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let record = h.engine.get_run(&execution.id).await.unwrap();
    assert_eq!(record.node("t").unwrap().status, NodeStatus::Completed);
    assert!(record.node("bad").unwrap().error.as_deref().unwrap().contains("panicked"));
}

fn balance_schema() -> SchemaDefinition {
    SchemaDefinition::of_type(SchemaType::Object)
        .with_property("balance", SchemaDefinition::of_type(SchemaType::Number), true)
        .with_property("owner", SchemaDefinition::of_type(SchemaType::String), true)
        .with_property("chain", SchemaDefinition::of_type(SchemaType::String), true)
}

#[tokio::test]
async fn schema_policy_controls_incompatible_upstream() {
    for policy in [SchemaPolicy::Halt, SchemaPolicy::Warn] {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (consumer, consumer_calls) = CountingBlock::new("consumer", &log, json!({}));
        let mut handlers = builtin();
        handlers.register(Arc::new(consumer));

        let config = EngineConfig {
            schema_policy: policy,
            ..EngineConfig::default()
        };
        let h = Harness::new(handlers, config);
        h.publish(workflow(
            vec![
                trigger(json!({"unrelated": true})),
                Node::new("use", "consumer", json!({})).with_input_schema(balance_schema()),
            ],
            vec![("t", "use")],
        ))
        .await;

        let execution = h.engine.run_workflow("wf").await.unwrap();
        let record = h.engine.get_run(&execution.id).await.unwrap();
        let node = record.node("use").unwrap();
        assert!(node.input["compatibility"]["score"].as_f64().unwrap() < 0.5);

        match policy {
            SchemaPolicy::Halt => {
                assert_eq!(execution.status, ExecutionStatus::Failed);
                assert!(node.error.as_deref().unwrap().starts_with("[schema]"));
                assert_eq!(consumer_calls.load(Ordering::SeqCst), 0);
            }
            SchemaPolicy::Warn => {
                assert_eq!(execution.status, ExecutionStatus::Completed);
                assert_eq!(consumer_calls.load(Ordering::SeqCst), 1);
            }
        }
    }
}

#[tokio::test]
async fn empty_workflow_completes_immediately() {
    let h = Harness::new(builtin(), EngineConfig::default());
    h.publish(workflow(vec![], vec![])).await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(h.engine.get_run(&execution.id).await.unwrap().nodes.is_empty());
}

#[tokio::test]
async fn fan_out_respects_parallel_limit() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (leaf, leaf_calls) = CountingBlock::new("leaf", &log, json!({}));
    let mut handlers = builtin();
    handlers.register(Arc::new(leaf));

    let config = EngineConfig {
        max_parallel_nodes: 1,
        ..EngineConfig::default()
    };
    let h = Harness::new(handlers, config);

    let mut nodes = vec![trigger(json!({}))];
    let mut edges = Vec::new();
    let ids: Vec<String> = (0..5).map(|i| format!("leaf{}", i)).collect();
    for id in &ids {
        nodes.push(Node::new(id, "leaf", json!({})));
        edges.push(("t", id.as_str()));
    }
    h.publish(workflow(nodes, edges)).await;

    let execution = h.engine.run_workflow("wf").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(leaf_calls.load(Ordering::SeqCst), 5);
    // With one slot, leaves run in declaration order
    assert_eq!(*log.lock(), ids);
}
