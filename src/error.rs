/// Error taxonomy for the blockflow engine
///
/// Run-level failures (`EngineError`) are kept apart from node-level failures
/// (`NodeError`): a node error is recorded on its `NodeExecution` and fails the
/// run, while an engine error escapes the dispatch boundary.

use thiserror::Error;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Run-level engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Structural problem with the workflow graph (duplicate ids, malformed edges)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The graph contains a cycle that passes through the named node
    #[error("Workflow contains a cycle through node '{0}' - must be a DAG")]
    CycleDetected(String),

    /// A node references a block type with no registered handler
    #[error("Node '{node_id}' uses unregistered block type '{block_type}'")]
    UnknownBlockType { node_id: String, block_type: String },

    /// A node's configuration was rejected by its handler at graph-load time
    #[error("Node '{node_id}' has invalid configuration: {message}")]
    InvalidConfig { node_id: String, message: String },

    /// Workflow or execution does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Run control requested in a state that does not allow it
    #[error("Execution '{execution_id}' is {status}, cannot {action}")]
    InvalidState {
        execution_id: String,
        status: String,
        action: String,
    },

    /// Retry named a node that did not fail
    #[error("Node '{node_id}' is {status}, only failed nodes can be retried")]
    NodeNotRetryable { node_id: String, status: String },

    /// Persistence failure; run state is no longer observable
    #[error("State store error: {0}")]
    Store(String),

    /// Graph loader failure
    #[error("Workflow loader error: {0}")]
    Loader(String),
}

impl EngineError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::CycleDetected(_) => "CYCLE_DETECTED",
            EngineError::UnknownBlockType { .. } => "UNKNOWN_BLOCK_TYPE",
            EngineError::InvalidConfig { .. } => "INVALID_CONFIG",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::InvalidState { .. } => "INVALID_STATE",
            EngineError::NodeNotRetryable { .. } => "NODE_NOT_RETRYABLE",
            EngineError::Store(_) => "STORE_ERROR",
            EngineError::Loader(_) => "LOADER_ERROR",
        }
    }

    /// True for errors raised while validating the graph before dispatch
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::CycleDetected(_)
                | EngineError::UnknownBlockType { .. }
                | EngineError::InvalidConfig { .. }
        )
    }

    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        EngineError::Store(err.to_string())
    }
}

/// Node-level errors raised by block handlers or by input resolution
#[derive(Error, Debug)]
pub enum NodeError {
    /// Handler configuration is missing or malformed
    #[error("{0}")]
    Config(String),

    /// An external call exceeded its time budget
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Condition evaluation failed (bad operator, bad regex, missing operand)
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Upstream data did not satisfy the node's declared input schema
    #[error("input schema compatibility {score:.2} below threshold {threshold:.2}")]
    SchemaRejected { score: f64, threshold: f64 },

    /// Any other handler failure, including collaborator I/O errors
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl NodeError {
    /// Short error kind used to tell timeouts apart from business failures
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::Config(_) => "config",
            NodeError::Timeout { .. } => "timeout",
            NodeError::Condition(_) => "condition",
            NodeError::SchemaRejected { .. } => "schema",
            NodeError::Failed(_) => "handler",
        }
    }

    /// Message persisted on the `NodeExecution` row
    pub fn to_record(&self) -> String {
        format!("[{}] {}", self.kind(), self)
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        NodeError::Config(message.into())
    }
}

/// Errors from the condition evaluator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("unknown comparison operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown logical operator '{0}'")]
    UnknownLogicalOperator(String),

    #[error("operator '{operator}' requires operand '{operand}'")]
    MissingOperand { operator: String, operand: String },

    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("no comparison operator found in expression '{0}'")]
    MalformedExpression(String),
}
