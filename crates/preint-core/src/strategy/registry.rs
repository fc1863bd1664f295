//! Explicit strategy registry: maps configured names to factories.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StrategyConfig;
use crate::domain::error::{PreintError, Result};
use crate::strategy::{accumulated, squash, AccumulatedStrategy, IntegrationStrategy, SquashStrategy};

/// Builds a strategy from its configuration.
pub type StrategyFactory = Arc<dyn Fn(&StrategyConfig) -> Arc<dyn IntegrationStrategy> + Send + Sync>;

/// Name → factory table handed to the orchestrator at construction.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `squash` and `accumulated`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(squash::NAME, |cfg: &StrategyConfig| {
            let mut s = SquashStrategy::new();
            if let Some(msg) = &cfg.commit_message {
                s = s.with_commit_message(msg.clone());
            }
            Arc::new(s) as Arc<dyn IntegrationStrategy>
        });
        registry.register(accumulated::NAME, |cfg: &StrategyConfig| {
            let mut s = AccumulatedStrategy::new();
            if let Some(msg) = &cfg.commit_message {
                s = s.with_commit_message(msg.clone());
            }
            Arc::new(s) as Arc<dyn IntegrationStrategy>
        });
        registry
    }

    /// Register (or replace) a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&StrategyConfig) -> Arc<dyn IntegrationStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the strategy named by `config`.
    pub fn create(&self, config: &StrategyConfig) -> Result<Arc<dyn IntegrationStrategy>> {
        let factory = self
            .factories
            .get(config.name.as_str())
            .ok_or_else(|| PreintError::UnknownStrategy(config.name.clone()))?;
        Ok(factory(config))
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("names", &self.names())
            .finish()
    }
}
