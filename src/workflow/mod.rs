/// Workflow Management Layer
///
/// Workflow definitions, graph validation, persistence and the hot-reload
/// registry the coordinator loads snapshots from:
/// - Type definitions (Workflow, Node, Edge)
/// - Execution planning over a petgraph DAG
/// - SQLite persistence with sqlx
/// - Lock-free snapshot registry using ArcSwap

// Core workflow type definitions
pub mod types;

// DAG validation and dependency queries
pub mod graph;

// SQLite persistence layer for workflow storage
pub mod storage;

// Hot-reload registry; implements the graph loader
pub mod registry;

pub use graph::ExecutionPlan;
pub use registry::{GraphLoader, WorkflowRegistry};
pub use types::{Edge, Node, Workflow};
