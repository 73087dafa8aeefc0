//! In-memory chat busy set

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::domain::traits::{BusyMark, ChatGate};

#[derive(Debug, Clone, Copy)]
struct Entry {
    since: DateTime<Utc>,
    generation: u64,
}

/// Marks chats with a running reaction so only one runs per chat
pub struct MemoryChatGate {
    in_work: RwLock<HashMap<i64, Entry>>,
    next_generation: AtomicU64,
    stale_after: Duration,
}

impl MemoryChatGate {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            in_work: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            stale_after,
        }
    }

    pub async fn is_busy(&self, chat_id: i64) -> bool {
        self.in_work.read().await.contains_key(&chat_id)
    }
}

impl Default for MemoryChatGate {
    fn default() -> Self {
        Self::new(Duration::minutes(1))
    }
}

#[async_trait]
impl ChatGate for MemoryChatGate {
    async fn try_enter(&self, chat_id: i64) -> Option<BusyMark> {
        let mut in_work = self.in_work.write().await;
        if in_work.contains_key(&chat_id) {
            return None;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        in_work.insert(
            chat_id,
            Entry {
                since: Utc::now(),
                generation,
            },
        );
        Some(BusyMark {
            chat_id,
            generation,
        })
    }

    async fn exit(&self, mark: BusyMark) {
        let mut in_work = self.in_work.write().await;
        match in_work.get(&mark.chat_id) {
            Some(entry) if entry.generation == mark.generation => {
                in_work.remove(&mark.chat_id);
            }
            Some(_) => {
                tracing::debug!(chat_id = mark.chat_id, "busy mark was reclaimed, keeping newer one");
            }
            None => {}
        }
    }

    async fn sweep(&self) -> usize {
        let cutoff = Utc::now() - self.stale_after;
        let mut in_work = self.in_work.write().await;
        let before = in_work.len();
        in_work.retain(|chat_id, entry| {
            let keep = entry.since >= cutoff;
            if !keep {
                tracing::warn!(chat_id, "reclaiming stale busy mark");
            }
            keep
        });
        before - in_work.len()
    }
}
