/// Block handler registry
///
/// Maps block-type identifiers to handlers. Built once at startup, then shared
/// read-only by every run through an `Arc`.

use super::{
    comparator::ComparatorBlock,
    market::{PortfolioTrackerBlock, PriceMonitorBlock, ProtocolHealthBlock},
    swap::TokenSwapBlock,
    transform::DataTransformBlock,
    trigger::TriggerBlock,
    BlockHandler, Services,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available block handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn BlockHandler>>,
}

impl HandlerRegistry {
    /// Empty registry (tests register their own handlers)
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in block type wired to `services`
    pub fn with_builtin(services: Services) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(TriggerBlock::manual()));
        registry.register(Arc::new(TriggerBlock::webhook()));
        registry.register(Arc::new(PriceMonitorBlock::new(services.prices.clone())));
        registry.register(Arc::new(PortfolioTrackerBlock::new(services.portfolio.clone())));
        registry.register(Arc::new(ProtocolHealthBlock::new(services.protocols.clone())));
        registry.register(Arc::new(TokenSwapBlock::new(
            services.transactions.clone(),
            services.gas.clone(),
        )));
        registry.register(Arc::new(ComparatorBlock::new("comparator")));
        registry.register(Arc::new(ComparatorBlock::new("condition")));
        registry.register(Arc::new(DataTransformBlock));

        tracing::debug!("🧩 Registered {} built-in block types", registry.handlers.len());
        registry
    }

    /// Register a handler under its own block type; replaces an existing one
    pub fn register(&mut self, handler: Arc<dyn BlockHandler>) {
        self.handlers.insert(handler.block_type().to_string(), handler);
    }

    /// Exact lookup first, then case-insensitive
    pub fn get(&self, block_type: &str) -> Option<Arc<dyn BlockHandler>> {
        if let Some(handler) = self.handlers.get(block_type) {
            return Some(handler.clone());
        }
        self.handlers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(block_type))
            .map(|(_, handler)| handler.clone())
    }

    pub fn has(&self, block_type: &str) -> bool {
        self.get(block_type).is_some()
    }

    /// Registered block types, sorted
    pub fn block_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// `(block type, description)` pairs, sorted by type
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        let mut described: Vec<(&str, &str)> = self
            .handlers
            .iter()
            .map(|(name, handler)| (name.as_str(), handler.description()))
            .collect();
        described.sort_unstable();
        described
    }
}
