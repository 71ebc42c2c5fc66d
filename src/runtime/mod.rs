/// Runtime execution layer
///
/// - `engine`: the coordinator that drives runs through the DAG
/// - `inputs`: upstream merge, template interpolation and schema reconciliation
/// - `context`: per-run node outputs
/// - `state` / `sqlite_store`: execution state models and stores
/// - `notify`: status transition events

pub mod context;
pub mod engine;
pub mod inputs;
pub mod notify;
pub mod sqlite_store;
pub mod state;

pub use context::ExecutionContext;
pub use engine::{ExecutionEngine, RunTask};
pub use notify::{BroadcastNotifier, Notifier, StatusEvent};
pub use sqlite_store::SqliteExecutionStore;
pub use state::{
    ExecutionRecord, ExecutionStatus, ExecutionStore, MemoryExecutionStore, NodeExecution,
    NodeStatus, WorkflowExecution,
};
