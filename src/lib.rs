/// blockflow: DAG execution engine for block-based automation workflows
///
/// Workflows are graphs of typed blocks (triggers, market reads, swaps,
/// comparators, transforms). The engine validates the graph, dispatches nodes
/// as their predecessors complete, persists every transition and supports
/// pause, resume and partial retry.

// Core configuration and error taxonomy
pub mod config;
pub mod error;

// Shared value helpers: dotted paths, conditions, schema inference
pub mod path;
pub mod condition;
pub mod schema;

// Workflow definitions, graph validation, storage and hot-reload registry
pub mod workflow;

// Block handlers and the registry the engine dispatches through
pub mod blocks;

// Runtime execution engine and execution state
pub mod runtime;

// HTTP API layer
pub mod api;

// Server setup and initialization
pub mod server;

pub use error::{EngineError, NodeError};
pub use runtime::{ExecutionEngine, ExecutionStatus, NodeStatus};
pub use server::start_server;
pub use workflow::{Edge, Node, Workflow};
