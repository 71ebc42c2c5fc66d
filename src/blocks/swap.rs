/// Token swap block
///
/// The only built-in block with an irreversible external effect. A swap is
/// submitted under the idempotency key `<executionId>:<nodeId>`; when a retried
/// node finds a transaction already recorded under that key it reports that
/// transaction instead of submitting again.

use super::services::{GasOracle, SwapReceipt, SwapRequest, TransactionSubmitter};
use super::{check_numeric, check_string, with_timeout, BlockHandler, BlockInput, NodeContext};
use crate::error::NodeError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_SLIPPAGE_BPS: u32 = 50;
const MAX_SLIPPAGE_BPS: f64 = 10_000.0;

pub struct TokenSwapBlock {
    transactions: Arc<dyn TransactionSubmitter>,
    gas: Arc<dyn GasOracle>,
}

impl TokenSwapBlock {
    pub fn new(transactions: Arc<dyn TransactionSubmitter>, gas: Arc<dyn GasOracle>) -> Self {
        Self { transactions, gas }
    }

    fn request(input: &BlockInput) -> Result<SwapRequest, NodeError> {
        let amount = input.require_number("amount")?;
        if amount <= 0.0 {
            return Err(NodeError::config(format!("'amount' must be positive, got {}", amount)));
        }

        let slippage = input
            .number_field("slippageBps")?
            .unwrap_or(DEFAULT_SLIPPAGE_BPS as f64);
        if !(0.0..=MAX_SLIPPAGE_BPS).contains(&slippage) {
            return Err(NodeError::config(format!("'slippageBps' out of range: {}", slippage)));
        }

        Ok(SwapRequest {
            from_token: input.require_str("fromToken")?.to_string(),
            to_token: input.require_str("toToken")?.to_string(),
            amount,
            slippage_bps: slippage.round() as u32,
        })
    }
}

fn receipt_output(request: &SwapRequest, receipt: &SwapReceipt, reused: bool) -> Value {
    json!({
        "fromToken": request.from_token,
        "toToken": request.to_token,
        "amount": request.amount,
        "txHash": receipt.tx_hash,
        "amountOut": receipt.amount_out,
        "reused": reused,
    })
}

#[async_trait]
impl BlockHandler for TokenSwapBlock {
    fn block_type(&self) -> &str {
        "token_swap"
    }

    fn description(&self) -> &str {
        "Swaps one token for another through the configured transaction submitter"
    }

    fn validate_config(&self, config: &Value) -> Result<(), NodeError> {
        check_string(config, "fromToken")?;
        check_string(config, "toToken")?;
        check_numeric(config, "amount", true)?;
        check_numeric(config, "slippageBps", false)?;
        check_numeric(config, "maxGasGwei", false)
    }

    fn irreversible(&self) -> bool {
        true
    }

    async fn execute(&self, input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        let request = Self::request(input)?;
        let key = ctx.idempotency_key();

        if let Some(receipt) =
            with_timeout(ctx.timeout_secs, self.transactions.find_submitted(&key)).await?
        {
            tracing::info!("♻️ Swap for {} already submitted as {}, not resubmitting", key, receipt.tx_hash);
            return Ok(receipt_output(&request, &receipt, true));
        }

        if let Some(max_gas) = input.number_field("maxGasGwei")? {
            let gas = with_timeout(ctx.timeout_secs, self.gas.gas_price_gwei()).await?;
            if gas > max_gas {
                return Err(NodeError::Failed(anyhow::anyhow!(
                    "gas price {} gwei exceeds limit {} gwei",
                    gas,
                    max_gas
                )));
            }
        }

        tracing::info!("💱 Submitting swap {} {} -> {} ({})",
            request.amount, request.from_token, request.to_token, key);

        let receipt =
            with_timeout(ctx.timeout_secs, self.transactions.submit_swap(&key, &request)).await?;

        Ok(receipt_output(&request, &receipt, false))
    }
}
