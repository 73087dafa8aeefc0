//! In-memory session storage and its periodic cleanup

pub mod busy;
pub mod layers;

pub use busy::MemoryChatGate;
pub use layers::MemoryLayerStore;

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Run `job` every `every` until `cancel` fires. The first run happens one
/// period after spawning.
pub fn spawn_sweeper<F, Fut>(
    name: &'static str,
    every: Duration,
    cancel: CancellationToken,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = usize> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(sweeper = name, "sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let removed = job().await;
                    if removed > 0 {
                        tracing::debug!(sweeper = name, removed, "sweep finished");
                    }
                }
            }
        }
    })
}
