/// Entry-point blocks: emit the configured payload and the trigger time

use super::{BlockHandler, BlockInput, NodeContext};
use crate::error::NodeError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

pub struct TriggerBlock {
    block_type: &'static str,
    description: &'static str,
}

impl TriggerBlock {
    pub fn manual() -> Self {
        Self {
            block_type: "manual_trigger",
            description: "Starts a workflow on demand",
        }
    }

    pub fn webhook() -> Self {
        Self {
            block_type: "webhook_trigger",
            description: "Starts a workflow from an incoming webhook payload",
        }
    }
}

#[async_trait]
impl BlockHandler for TriggerBlock {
    fn block_type(&self) -> &str {
        self.block_type
    }

    fn description(&self) -> &str {
        self.description
    }

    fn validate_config(&self, config: &Value) -> Result<(), NodeError> {
        match config.get("payload") {
            None | Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(NodeError::config(format!("'payload' must be an object, got {}", other))),
        }
    }

    async fn execute(&self, input: &BlockInput, _ctx: &NodeContext) -> Result<Value, NodeError> {
        let payload = input.config.get("payload").cloned().unwrap_or_else(|| json!({}));
        Ok(json!({
            "payload": payload,
            "triggeredAt": Utc::now().to_rfc3339(),
        }))
    }
}
