//! Loading indicator - a message whose text cycles while work is in progress

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::domain::traits::{OutgoingMessage, Transport};

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub tick: Duration,
    /// Ticks after which the loader gives up on its own
    pub max_ticks: u32,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(2000),
            max_ticks: 20,
        }
    }
}

/// Send `screens[0]` and keep editing it to the following screens.
///
/// The caller must cancel the returned token once the work is done.
pub(crate) fn spawn_loader(
    transport: Arc<dyn Transport>,
    chat_id: i64,
    screens: Vec<String>,
    settings: LoaderSettings,
    debug: bool,
) -> CancellationToken {
    let cancel = CancellationToken::new();
    if screens.is_empty() {
        tracing::warn!(chat_id, "loader started without screens");
        cancel.cancel();
        return cancel;
    }

    let token = cancel.clone();
    tokio::spawn(async move {
        let sent = transport
            .send_message(OutgoingMessage::text(chat_id, screens[0].clone()))
            .await;
        let message_id = match sent {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("failed to send loader message: {}", e);
                token.cancel();
                return;
            }
        };

        let mut ticker = interval_at(Instant::now() + settings.tick, settings.tick);
        let mut count = 0usize;
        let mut full_count = 0u32;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {
                    count += 1;
                    full_count += 1;

                    if full_count > settings.max_ticks {
                        if debug {
                            edit(&*transport, chat_id, message_id, "Load screen timeout").await;
                        }
                        token.cancel();
                        return;
                    }

                    count %= screens.len();
                    // nothing to animate with a single screen
                    if screens.len() != 1 {
                        edit(&*transport, chat_id, message_id, &screens[count]).await;
                    }
                }
            }
        }
    });

    cancel
}

async fn edit(transport: &dyn Transport, chat_id: i64, message_id: i64, text: &str) {
    if let Err(e) = transport.edit_message(chat_id, message_id, text).await {
        tracing::error!("failed to edit loader message: {}", e);
    }
}
