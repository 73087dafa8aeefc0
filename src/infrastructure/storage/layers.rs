//! In-memory layer store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::messaging::HandlerLayer;
use crate::domain::traits::LayerStore;

/// Pending layers keyed by chat id
#[derive(Default)]
pub struct MemoryLayerStore {
    layers: RwLock<HashMap<i64, Arc<HandlerLayer>>>,
}

impl MemoryLayerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LayerStore for MemoryLayerStore {
    async fn put(&self, chat_id: i64, layer: Arc<HandlerLayer>) {
        let mut layers = self.layers.write().await;
        layers.insert(chat_id, layer);
    }

    async fn take_and_clear(&self, chat_id: i64) -> Option<Arc<HandlerLayer>> {
        let mut layers = self.layers.write().await;
        let layer = layers.remove(&chat_id)?;
        if layer.is_expired() {
            tracing::debug!(chat_id, "pending layer expired");
            return None;
        }
        Some(layer)
    }

    async fn sweep(&self) -> usize {
        let mut layers = self.layers.write().await;
        let before = layers.len();
        layers.retain(|_, layer| !layer.is_expired());
        before - layers.len()
    }

    async fn pending(&self) -> usize {
        self.layers.read().await.len()
    }
}
