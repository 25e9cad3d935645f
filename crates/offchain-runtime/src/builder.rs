//! Node Builder API
//!
//! Provides a builder-style API for embedding applications and tests to
//! wire a [`Node`] to its store, messenger, ledger and app logic.

use std::sync::Arc;

use tracing::info;

use offchain_core::{
    Address, AppLogic, AppRegistry, EngineConfig, Ledger, Messenger, OffchainError, Result,
    SigningKeyPair, Store,
};

use crate::node::Node;
use crate::store::MemoryStore;

// ----------------------------------------------------------------------------
// Node Builder
// ----------------------------------------------------------------------------

pub struct NodeBuilder {
    key: SigningKeyPair,
    config: EngineConfig,
    store: Option<Arc<dyn Store>>,
    messenger: Option<Arc<dyn Messenger>>,
    ledger: Option<Arc<dyn Ledger>>,
    apps: Vec<(Address, Arc<dyn AppLogic>)>,
}

impl NodeBuilder {
    /// Start a builder for the party holding `key`
    pub fn new(key: SigningKeyPair) -> Self {
        Self {
            key,
            config: EngineConfig::default(),
            store: None,
            messenger: None,
            ledger: None,
            apps: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `store` instead of a fresh [`MemoryStore`]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    /// Ledger for deposits and withdrawal submission
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Register off-chain logic for the app definition at `app_definition`
    pub fn with_app(mut self, app_definition: Address, logic: Arc<dyn AppLogic>) -> Self {
        self.apps.push((app_definition, logic));
        self
    }

    pub fn build(self) -> Result<Node> {
        self.config.validate()?;
        let messenger = self
            .messenger
            .ok_or_else(|| OffchainError::config_error("a node needs a messenger"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn Store>);

        let mut apps = AppRegistry::with_builtins(&self.config.network);
        for (app_definition, logic) in self.apps {
            apps.register(app_definition, logic);
        }

        let address = self.key.address();
        info!(node = %address, ledger = self.ledger.is_some(), "node built");
        Ok(Node::new(
            self.key,
            self.config,
            apps,
            store,
            messenger,
            self.ledger,
        ))
    }
}
