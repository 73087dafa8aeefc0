//! Message dispatcher - Routes events to the reaction of the chat's active layer

use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::layer::HandlerLayer;
use super::middleware::{compose, Context, ErrorHandler, Middleware, Reaction};
use crate::application::errors::{BotError, StartupError};
use crate::domain::entities::{Event, Update};
use crate::domain::traits::{ChatGate, LayerStore};

/// Bot-wide registrations: the default layer, middlewares and the error handler
pub struct Registry {
    default_layer: RwLock<Arc<HandlerLayer>>,
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl Registry {
    pub fn new(default_layer: HandlerLayer) -> Self {
        Self {
            default_layer: RwLock::new(Arc::new(default_layer)),
            middlewares: RwLock::new(Vec::new()),
            error_handler: RwLock::new(None),
        }
    }

    /// Snapshot of the default layer. Dispatch keeps using the snapshot even
    /// if registrations happen while a reaction runs.
    pub fn default_layer(&self) -> Arc<HandlerLayer> {
        self.default_layer.read().clone()
    }

    pub fn update_default_layer(&self, update: impl FnOnce(&mut HandlerLayer)) {
        let mut guard = self.default_layer.write();
        update(Arc::make_mut(&mut guard));
    }

    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middlewares.write().push(middleware);
    }

    pub fn middlewares(&self) -> Vec<Arc<dyn Middleware>> {
        self.middlewares.read().clone()
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.write() = Some(handler);
    }

    pub fn error_handler(&self) -> Option<ErrorHandler> {
        self.error_handler.read().clone()
    }

    pub fn validate(&self) -> Result<(), StartupError> {
        if self.error_handler.read().is_none() {
            return Err(StartupError::MissingErrorHandler);
        }
        if self.default_layer.read().default_reaction().is_none() {
            return Err(StartupError::MissingDefaultHandler);
        }
        Ok(())
    }
}

/// Pick the reaction for `event`.
///
/// Order: the chat layer's keyed match, the chat layer's own default, the
/// default layer's keyed match, the default layer's default.
pub fn resolve(
    event: &Event,
    chat_layer: Option<&HandlerLayer>,
    default_layer: &HandlerLayer,
) -> Option<Reaction> {
    chat_layer
        .and_then(|layer| layer.handler(event).or_else(|| layer.default_reaction()))
        .or_else(|| default_layer.handler(event))
        .or_else(|| default_layer.default_reaction())
}

/// Event dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    layers: Arc<dyn LayerStore>,
    gate: Arc<dyn ChatGate>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, layers: Arc<dyn LayerStore>, gate: Arc<dyn ChatGate>) -> Self {
        Self {
            registry,
            layers,
            gate,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn layers(&self) -> &Arc<dyn LayerStore> {
        &self.layers
    }

    pub fn gate(&self) -> &Arc<dyn ChatGate> {
        &self.gate
    }

    /// Consume updates until the channel closes or the context is cancelled.
    /// Every update is dispatched on its own task.
    pub async fn run(&self, ctx: Context, mut updates: mpsc::Receiver<Update>) {
        let cancel = ctx.cancellation().clone();
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("dispatch loop cancelled");
                    break;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                update = updates.recv() => {
                    let Some(update) = update else {
                        tracing::debug!("update channel closed");
                        break;
                    };
                    let this = self.clone();
                    let ctx = ctx.clone();
                    in_flight.spawn(async move {
                        this.dispatch(ctx, update).await;
                    });
                }
            }
        }

        if !in_flight.is_empty() {
            tracing::debug!(pending = in_flight.len(), "waiting for running reactions");
        }
        while in_flight.join_next().await.is_some() {}
    }

    /// Process one update to completion
    pub async fn dispatch(&self, ctx: Context, update: Update) {
        let Some(mut event) = Event::from_update(&update) else {
            tracing::debug!(update_id = update.update_id, "unparsed update");
            self.report(ctx, Event::unparsed(&update), BotError::UnparsedEvent)
                .await;
            return;
        };

        let chat_id = event.chat_id;
        tracing::debug!(chat_id, kind = %event.kind, "got event");

        // Chat stays locked until the reaction finishes; anything arriving
        // meanwhile is skipped.
        let Some(mark) = self.gate.try_enter(chat_id).await else {
            tracing::debug!(chat_id, kind = %event.kind, "chat busy, skipping event");
            return;
        };

        let chat_layer = self.layers.take_and_clear(chat_id).await;
        let default_layer = self.registry.default_layer();
        let active = chat_layer.clone().unwrap_or_else(|| default_layer.clone());
        tracing::debug!(
            chat_id,
            chat_specific = chat_layer.is_some(),
            layer = ?active,
            "got layer"
        );
        event.set_last_layer(&active);

        let failure = match resolve(&event, chat_layer.as_deref(), &default_layer) {
            Some(reaction) => {
                let reaction = compose(reaction, &self.registry.middlewares());
                match tokio::spawn(reaction.call(ctx.clone(), event.clone())).await {
                    Ok(result) => result.err(),
                    Err(join_err) if join_err.is_panic() => {
                        let msg = panic_message(join_err.into_panic());
                        tracing::error!(chat_id, "reaction panicked: {}", msg);
                        Some(BotError::Panicked(msg))
                    }
                    Err(join_err) => {
                        tracing::debug!(chat_id, "reaction task cancelled: {}", join_err);
                        None
                    }
                }
            }
            None => Some(StartupError::MissingDefaultHandler.into()),
        };

        // `active` is still alive here, so the error handler can retry it.
        if let Some(err) = failure {
            self.report(ctx, event, err).await;
        }
        self.gate.exit(mark).await;
        drop(active);
    }

    async fn report(&self, ctx: Context, event: Event, err: BotError) {
        match self.registry.error_handler() {
            Some(handler) => handler.call(ctx, event, err).await,
            None => tracing::error!(error = %err, ?event, "no error handler registered"),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
