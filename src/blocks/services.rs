/// Handler collaborators
///
/// Market data, protocol adapters, gas pricing and transaction submission are
/// reached only through these traits so handlers can be exercised without live
/// network access. `Services` bundles one implementation of each.

use crate::config::ServicesConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Spot price lookup
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn price(&self, asset: &str) -> Result<f64>;
}

/// Wallet positions lookup
#[async_trait]
pub trait PortfolioService: Send + Sync {
    async fn positions(&self, wallet: &str) -> Result<Vec<Position>>;
}

/// Lending/DEX protocol health lookup
#[async_trait]
pub trait ProtocolService: Send + Sync {
    async fn health(&self, protocol: &str) -> Result<ProtocolHealth>;
}

/// Current network gas price
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_price_gwei(&self) -> Result<f64>;
}

/// Blockchain transaction submission
///
/// Submissions are tagged with an idempotency key so a retried node can find
/// the transaction it already sent instead of sending a second one.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Transaction previously submitted under `key`, if any
    async fn find_submitted(&self, key: &str) -> Result<Option<SwapReceipt>>;

    async fn submit_swap(&self, key: &str, request: &SwapRequest) -> Result<SwapReceipt>;
}

/// One token position in a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub token: String,
    pub amount: f64,
    pub value_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolHealth {
    pub health_factor: f64,
    pub tvl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub from_token: String,
    pub to_token: String,
    pub amount: f64,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapReceipt {
    pub tx_hash: String,
    pub amount_out: Option<f64>,
}

/// Collaborators injected into the built-in handlers
#[derive(Clone)]
pub struct Services {
    pub prices: Arc<dyn PriceFeed>,
    pub portfolio: Arc<dyn PortfolioService>,
    pub protocols: Arc<dyn ProtocolService>,
    pub gas: Arc<dyn GasOracle>,
    pub transactions: Arc<dyn TransactionSubmitter>,
}

impl Services {
    /// Every collaborator answers with an error naming what is missing
    pub fn unconfigured() -> Self {
        Self {
            prices: Arc::new(Unconfigured("price feed")),
            portfolio: Arc::new(Unconfigured("portfolio service")),
            protocols: Arc::new(Unconfigured("protocol service")),
            gas: Arc::new(Unconfigured("gas oracle")),
            transactions: Arc::new(Unconfigured("transaction submitter")),
        }
    }

    /// Collaborators available from configuration; the rest stay unconfigured
    pub fn from_config(config: &ServicesConfig) -> Self {
        let mut services = Self::unconfigured();
        if let Some(base_url) = &config.price_feed_url {
            tracing::info!("💱 Using HTTP price feed at {}", base_url);
            services.prices = Arc::new(HttpPriceFeed::new(base_url));
        }
        services
    }
}

/// Placeholder for a collaborator that was not wired up
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
    fn error(&self) -> anyhow::Error {
        anyhow::anyhow!("{} is not configured", self.0)
    }
}

#[async_trait]
impl PriceFeed for Unconfigured {
    async fn price(&self, _asset: &str) -> Result<f64> {
        Err(self.error())
    }
}

#[async_trait]
impl PortfolioService for Unconfigured {
    async fn positions(&self, _wallet: &str) -> Result<Vec<Position>> {
        Err(self.error())
    }
}

#[async_trait]
impl ProtocolService for Unconfigured {
    async fn health(&self, _protocol: &str) -> Result<ProtocolHealth> {
        Err(self.error())
    }
}

#[async_trait]
impl GasOracle for Unconfigured {
    async fn gas_price_gwei(&self) -> Result<f64> {
        Err(self.error())
    }
}

#[async_trait]
impl TransactionSubmitter for Unconfigured {
    async fn find_submitted(&self, _key: &str) -> Result<Option<SwapReceipt>> {
        Err(self.error())
    }

    async fn submit_swap(&self, _key: &str, _request: &SwapRequest) -> Result<SwapReceipt> {
        Err(self.error())
    }
}

/// Price feed over HTTP: `GET {base}/price/{asset}` answering `{"price": <number>}`
#[derive(Debug, Clone)]
pub struct HttpPriceFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceFeed {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn price(&self, asset: &str) -> Result<f64> {
        let url = format!("{}/price/{}", self.base_url, asset);
        tracing::debug!("🚀 Fetching price: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Price request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Price feed returned {} for {}", status, asset));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read price response: {}", e))?;

        body.get("price")
            .and_then(crate::blocks::as_number)
            .ok_or_else(|| anyhow::anyhow!("Price feed response has no numeric 'price': {}", body))
    }
}
