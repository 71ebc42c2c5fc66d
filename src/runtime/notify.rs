/// Status notifications
///
/// The coordinator emits one event per run or node status transition and never
/// waits on delivery. `BroadcastNotifier` fans events out to any number of
/// subscribers (socket bridges, pollers, tests); with no subscriber the event
/// is dropped.

use crate::runtime::state::{ExecutionStatus, NodeStatus};
use serde::Serialize;
use tokio::sync::broadcast;

/// A status transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StatusEvent {
    #[serde(rename_all = "camelCase")]
    Execution {
        execution_id: String,
        workflow_id: String,
        status: ExecutionStatus,
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Node {
        execution_id: String,
        node_id: String,
        status: NodeStatus,
        error: Option<String>,
    },
}

/// Fire-and-forget event sink
pub trait Notifier: Send + Sync {
    fn notify(&self, event: StatusEvent);
}

#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<StatusEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: StatusEvent) {
        tracing::debug!("📣 {:?}", event);
        // No receivers is not an error
        let _ = self.sender.send(event);
    }
}
