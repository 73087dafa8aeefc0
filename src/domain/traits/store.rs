use async_trait::async_trait;
use std::sync::Arc;

use crate::application::messaging::HandlerLayer;

/// Per-chat pending layers
///
/// A chat maps to at most one layer; `put` replaces whatever was pending.
#[async_trait]
pub trait LayerStore: Send + Sync {
    async fn put(&self, chat_id: i64, layer: Arc<HandlerLayer>);

    /// Remove and return the chat's pending layer. Expired entries count as absent.
    async fn take_and_clear(&self, chat_id: i64) -> Option<Arc<HandlerLayer>>;

    /// Evict expired layers, returning how many were dropped
    async fn sweep(&self) -> usize;

    async fn pending(&self) -> usize;
}
