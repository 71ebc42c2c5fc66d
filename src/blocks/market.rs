/// Monitoring blocks: asset prices, wallet portfolios and protocol health
///
/// Each block reads one collaborator and reports what it saw. Thresholds turn
/// into boolean fields (`conditionMet`, `healthy`); a threshold that is not met
/// is still a successful result.

use super::services::{PortfolioService, PriceFeed, ProtocolService};
use super::{check_numeric, check_string, with_timeout, BlockHandler, BlockInput, NodeContext};
use crate::error::NodeError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Which side of the target price satisfies the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Above,
    Below,
}

impl Direction {
    fn parse(raw: Option<&str>) -> Result<Self, NodeError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("above") => Ok(Direction::Above),
            Some("below") => Ok(Direction::Below),
            Some(other) => Err(NodeError::config(format!(
                "'direction' must be 'above' or 'below', got '{}'",
                other
            ))),
        }
    }

    fn met(self, current: f64, target: f64) -> bool {
        match self {
            Direction::Above => current >= target,
            Direction::Below => current <= target,
        }
    }
}

pub struct PriceMonitorBlock {
    prices: Arc<dyn PriceFeed>,
}

impl PriceMonitorBlock {
    pub fn new(prices: Arc<dyn PriceFeed>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl BlockHandler for PriceMonitorBlock {
    fn block_type(&self) -> &str {
        "price_monitor"
    }

    fn description(&self) -> &str {
        "Reads the current price of an asset and checks it against a target"
    }

    fn validate_config(&self, config: &Value) -> Result<(), NodeError> {
        check_string(config, "asset")?;
        check_numeric(config, "targetPrice", false)?;
        Direction::parse(config.get("direction").and_then(Value::as_str))?;
        Ok(())
    }

    async fn execute(&self, input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        let asset = input.require_str("asset")?;
        let target = input.number_field("targetPrice")?;
        let direction = Direction::parse(input.str_field("direction"))?;

        let current = with_timeout(ctx.timeout_secs, self.prices.price(asset)).await?;
        let condition_met = target.map(|t| direction.met(current, t)).unwrap_or(false);

        tracing::debug!("📈 {} price {} (target {:?}, met: {})", asset, current, target, condition_met);

        Ok(json!({
            "asset": asset,
            "currentPrice": current,
            "targetPrice": target,
            "conditionMet": condition_met,
        }))
    }
}

pub struct PortfolioTrackerBlock {
    portfolio: Arc<dyn PortfolioService>,
}

impl PortfolioTrackerBlock {
    pub fn new(portfolio: Arc<dyn PortfolioService>) -> Self {
        Self { portfolio }
    }
}

#[async_trait]
impl BlockHandler for PortfolioTrackerBlock {
    fn block_type(&self) -> &str {
        "portfolio_tracker"
    }

    fn description(&self) -> &str {
        "Lists the positions of a wallet and their total value"
    }

    fn validate_config(&self, config: &Value) -> Result<(), NodeError> {
        check_string(config, "wallet")
    }

    async fn execute(&self, input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        let wallet = input.require_str("wallet")?;
        let positions = with_timeout(ctx.timeout_secs, self.portfolio.positions(wallet)).await?;
        let total_value: f64 = positions.iter().map(|p| p.value_usd).sum();

        Ok(json!({
            "wallet": wallet,
            "totalValue": total_value,
            "positions": positions,
        }))
    }
}

pub struct ProtocolHealthBlock {
    protocols: Arc<dyn ProtocolService>,
}

impl ProtocolHealthBlock {
    pub fn new(protocols: Arc<dyn ProtocolService>) -> Self {
        Self { protocols }
    }
}

#[async_trait]
impl BlockHandler for ProtocolHealthBlock {
    fn block_type(&self) -> &str {
        "protocol_health"
    }

    fn description(&self) -> &str {
        "Checks a protocol's health factor against a minimum"
    }

    fn validate_config(&self, config: &Value) -> Result<(), NodeError> {
        check_string(config, "protocol")?;
        check_numeric(config, "minHealthFactor", true)
    }

    async fn execute(&self, input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        let protocol = input.require_str("protocol")?;
        let min_health = input.require_number("minHealthFactor")?;
        let health = with_timeout(ctx.timeout_secs, self.protocols.health(protocol)).await?;

        if health.health_factor < min_health {
            tracing::warn!("⚠️ {} health factor {} below {}", protocol, health.health_factor, min_health);
        }

        Ok(json!({
            "protocol": protocol,
            "healthFactor": health.health_factor,
            "tvl": health.tvl,
            "healthy": health.health_factor >= min_health,
        }))
    }
}
