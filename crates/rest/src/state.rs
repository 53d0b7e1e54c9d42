//! Shared application state.

use std::sync::Arc;

use vireo_persistence::Store;

use crate::config::ServerConfig;

/// State available to every request handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Store, config: ServerConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Base URL for Location headers and Bundle fullUrl values.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}
