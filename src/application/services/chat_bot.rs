//! Bot facade - registration API, layer sending and the main loop

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::loader::{spawn_loader, LoaderSettings};
use crate::application::errors::BotError;
use crate::application::messaging::{
    keyboard, layer, Context, Dispatcher, ErrorHandler, HandlerLayer, IntoReaction, Middleware,
    Reaction, Registry,
};
use crate::domain::entities::{Event, Update};
use crate::domain::traits::{ChatGate, LayerStore, OutgoingMessage, ParseMode, Transport};
use crate::infrastructure::storage::{spawn_sweeper, MemoryChatGate, MemoryLayerStore};

/// Deadline offset for the default layer, far enough to never expire
const DEFAULT_LAYER_TTL_DAYS: i64 = 365 * 100;

/// Runtime knobs of a bot
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub debug: bool,
    pub parse_mode: Option<ParseMode>,
    /// Lifetime of a layer sent with `send_msg`
    pub layer_ttl: Duration,
    pub layer_sweep_every: std::time::Duration,
    /// Age at which a busy mark is reclaimed by the sweeper. Must exceed the
    /// longest reaction, otherwise a second event for the same chat may run
    /// while the first is still in flight.
    pub busy_stale_after: Duration,
    pub busy_sweep_every: std::time::Duration,
    pub loader: LoaderSettings,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            debug: false,
            parse_mode: Some(ParseMode::Html),
            layer_ttl: Duration::hours(24),
            layer_sweep_every: std::time::Duration::from_secs(10 * 60),
            busy_stale_after: Duration::minutes(1),
            busy_sweep_every: std::time::Duration::from_secs(60),
            loader: LoaderSettings::default(),
        }
    }
}

/// Builder for [`ChatBot`]
pub struct BotBuilder {
    transport: Arc<dyn Transport>,
    settings: BotSettings,
    layers: Option<Arc<dyn LayerStore>>,
    gate: Option<Arc<dyn ChatGate>>,
    install_defaults: bool,
}

impl BotBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            settings: BotSettings::default(),
            layers: None,
            gate: None,
            install_defaults: true,
        }
    }

    pub fn settings(mut self, settings: BotSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.settings.debug = debug;
        self
    }

    pub fn parse_mode(mut self, parse_mode: Option<ParseMode>) -> Self {
        self.settings.parse_mode = parse_mode;
        self
    }

    pub fn layer_store(mut self, layers: Arc<dyn LayerStore>) -> Self {
        self.layers = Some(layers);
        self
    }

    pub fn chat_gate(mut self, gate: Arc<dyn ChatGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Skip the logging error handler and the default reaction
    pub fn without_defaults(mut self) -> Self {
        self.install_defaults = false;
        self
    }

    pub fn build(self) -> ChatBot {
        let default_layer = HandlerLayer::with_ttl(Duration::days(DEFAULT_LAYER_TTL_DAYS));
        let registry = Arc::new(Registry::new(default_layer));
        let layers = self
            .layers
            .unwrap_or_else(|| Arc::new(MemoryLayerStore::new()) as Arc<dyn LayerStore>);
        let gate = self.gate.unwrap_or_else(|| {
            Arc::new(MemoryChatGate::new(self.settings.busy_stale_after)) as Arc<dyn ChatGate>
        });

        let bot = ChatBot {
            inner: Arc::new(BotInner {
                transport: self.transport,
                dispatcher: Dispatcher::new(registry, layers, gate),
                settings: self.settings,
            }),
        };

        if self.install_defaults {
            bot.registry().set_error_handler(ErrorHandler::logging());
            bot.register_default_handler(unknown_event_reaction());
        }
        bot
    }
}

struct BotInner {
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    settings: BotSettings,
}

/// Conversational bot. Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct ChatBot {
    inner: Arc<BotInner>,
}

impl ChatBot {
    pub fn builder(transport: Arc<dyn Transport>) -> BotBuilder {
        BotBuilder::new(transport)
    }

    pub fn settings(&self) -> &BotSettings {
        &self.inner.settings
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn layer_store(&self) -> &Arc<dyn LayerStore> {
        self.inner.dispatcher.layers()
    }

    fn registry(&self) -> &Registry {
        self.inner.dispatcher.registry()
    }

    pub fn context(&self, cancel: CancellationToken) -> Context {
        Context::new(self.clone(), cancel)
    }

    /// Empty layer valid for the configured layer lifetime
    pub fn new_layer(&self) -> HandlerLayer {
        tracing::debug!("creating new layer");
        HandlerLayer::with_ttl(self.settings().layer_ttl)
            .with_middlewares(self.registry().middlewares())
    }

    pub fn register_command(&self, command: impl Into<String>, reaction: impl IntoReaction) {
        self.registry()
            .update_default_layer(move |layer| layer.register_command(command, reaction));
    }

    pub fn register_text(&self, text: impl Into<String>, reaction: impl IntoReaction) {
        self.registry()
            .update_default_layer(move |layer| layer.register_text(text, reaction));
    }

    pub fn register_button(&self, text: impl Into<String>, reaction: impl IntoReaction) {
        self.registry()
            .update_default_layer(move |layer| layer.register_button(text, reaction));
    }

    /// Register an inline button on the default layer, returning its callback id
    pub fn register_ibutton(&self, label: impl Into<String>, reaction: impl IntoReaction) -> String {
        let mut id = String::new();
        self.registry()
            .update_default_layer(|layer| id = layer.register_ibutton(label, reaction));
        id
    }

    pub fn register_default_handler(&self, reaction: impl IntoReaction) {
        self.registry()
            .update_default_layer(move |layer| layer.register_default_handler(reaction));
    }

    pub fn register_error_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Context, Event, BotError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry().set_error_handler(ErrorHandler::new(handler));
    }

    /// Applies to every reaction dispatched from now on, including ones
    /// registered earlier
    pub fn register_middleware(&self, middleware: impl Middleware + 'static) {
        self.registry().add_middleware(Arc::new(middleware));
    }

    /// Send plain text. Pending layers are left alone.
    pub async fn send_text(&self, chat_id: i64, text: impl Into<String>) -> Result<i64, BotError> {
        let text = text.into();
        tracing::debug!(chat_id, "sending text: {}", text);
        self.transport()
            .send_message(OutgoingMessage::text(chat_id, text))
            .await
    }

    /// Send the layer's text and keyboard, and make the layer answer the
    /// chat's next event
    pub async fn send_msg(&self, chat_id: i64, layer: HandlerLayer) -> Result<i64, BotError> {
        let keyboard = keyboard::render(&layer)?;
        if layer.is_empty() {
            tracing::debug!(chat_id, "sending layer without reactions");
        }

        let message = OutgoingMessage::text(chat_id, layer.text())
            .with_keyboard(keyboard)
            .with_parse_mode(self.settings().parse_mode);

        self.layer_store().put(chat_id, Arc::new(layer)).await;
        self.transport().send_message(message).await
    }

    /// Send the layer that was active for `event` again, optionally with new text
    pub async fn retry_last_layer(&self, event: &Event, new_text: &str) -> Result<i64, BotError> {
        let previous = event
            .last_layer()
            .ok_or(BotError::NoPreviousLayer(event.chat_id))?;

        let mut layer = (*previous).clone();
        if !new_text.is_empty() {
            layer.set_text(new_text);
        }
        layer.set_expires_at(layer::deadline(self.settings().layer_ttl));

        self.send_msg(event.chat_id, layer).await
    }

    pub async fn file_url(&self, file_id: &str) -> Result<String, BotError> {
        self.transport().file_url(file_id).await
    }

    pub fn self_user_name(&self) -> String {
        self.transport().bot_info().username
    }

    /// Show `screens` one after another in a single message until the
    /// returned token is cancelled.
    pub fn loader_button(&self, chat_id: i64, screens: Vec<String>) -> CancellationToken {
        spawn_loader(
            self.transport().clone(),
            chat_id,
            screens,
            self.settings().loader.clone(),
            self.settings().debug,
        )
    }

    /// Dispatch a single update and wait for its reaction
    pub async fn handle_update(&self, update: Update) {
        let ctx = self.context(CancellationToken::new());
        self.inner.dispatcher.dispatch(ctx, update).await;
    }

    /// Validate the configuration, then consume updates until the feed
    /// closes or `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), BotError> {
        tracing::debug!("starting bot");
        self.registry().validate()?;

        let updates = self.transport().start(cancel.child_token()).await?;

        let sweep_cancel = cancel.child_token();
        let layers = self.layer_store().clone();
        let layer_sweeper = spawn_sweeper(
            "layers",
            self.settings().layer_sweep_every,
            sweep_cancel.clone(),
            move || {
                let layers = layers.clone();
                async move { layers.sweep().await }
            },
        );
        let gate = self.inner.dispatcher.gate().clone();
        let gate_sweeper = spawn_sweeper(
            "busy-chats",
            self.settings().busy_sweep_every,
            sweep_cancel.clone(),
            move || {
                let gate = gate.clone();
                async move { gate.sweep().await }
            },
        );

        tracing::info!("Bot started: @{}", self.self_user_name());
        self.inner
            .dispatcher
            .run(self.context(cancel.clone()), updates)
            .await;

        sweep_cancel.cancel();
        let (layers_done, gate_done) = tokio::join!(layer_sweeper, gate_sweeper);
        if let Err(e) = layers_done.and(gate_done) {
            tracing::warn!("sweeper task failed: {}", e);
        }
        tracing::info!("Bot stopped");
        Ok(())
    }
}

/// Default reaction: in debug mode, echo the event back as JSON
fn unknown_event_reaction() -> Reaction {
    Reaction::new(|ctx: Context, event: Event| async move {
        if !ctx.bot().settings().debug {
            return Ok(());
        }
        let json = event
            .to_json()
            .map_err(|e| BotError::Parse(format!("failed to marshal event to json: {e}")))?;
        ctx.bot()
            .send_text(
                event.chat_id,
                format!("I don't know what to do with this event: \n{json}\n"),
            )
            .await?;
        Ok(())
    })
}
