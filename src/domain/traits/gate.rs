use async_trait::async_trait;

/// Admission of one reaction into a chat.
///
/// Each admission gets a fresh generation, so releasing a mark that was
/// already reclaimed as stale leaves a newer mark for the same chat intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyMark {
    pub chat_id: i64,
    pub generation: u64,
}

/// Tracks chats whose reaction is still running
#[async_trait]
pub trait ChatGate: Send + Sync {
    /// Mark the chat busy. Returns `None` if it already was, in which case
    /// the caller drops the event.
    async fn try_enter(&self, chat_id: i64) -> Option<BusyMark>;

    /// Release `mark` if it is still the chat's current one
    async fn exit(&self, mark: BusyMark);

    /// Reclaim marks older than the staleness bound
    async fn sweep(&self) -> usize;
}
