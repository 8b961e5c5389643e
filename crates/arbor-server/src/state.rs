use std::sync::Arc;

use arbor_store::ChunkStore;
use arbor_values::{BatchStore, ValueStore};

use crate::config::ServerConfig;

/// Shared by every request: one validating batch layer over the store.
#[derive(Clone)]
pub struct AppState {
    pub values: Arc<ValueStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn ChunkStore>, config: ServerConfig) -> Self {
        Self {
            values: Arc::new(ValueStore::new(store, config.batch.clone())),
            config: Arc::new(config),
        }
    }

    pub fn batch(&self) -> &Arc<BatchStore> {
        self.values.batch()
    }

    /// The store behind the batch layer.
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        self.values.batch().store()
    }
}
