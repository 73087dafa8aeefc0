//! Reactions, error handlers and the middleware that wraps them

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::application::services::ChatBot;
use crate::domain::entities::Event;

/// Result of a reaction
pub type HandlerResult = Result<(), BotError>;

/// Context passed to every reaction
#[derive(Clone)]
pub struct Context {
    bot: ChatBot,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(bot: ChatBot, cancel: CancellationToken) -> Self {
        Self { bot, cancel }
    }

    pub fn bot(&self) -> &ChatBot {
        &self.bot
    }

    /// Fires when the bot's main loop is asked to stop
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

type ReactionFn = dyn Fn(Context, Event) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Application logic run for a matched event
#[derive(Clone)]
pub struct Reaction(Arc<ReactionFn>);

impl Reaction {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Reaction(Arc::new(move |ctx, event| f(ctx, event).boxed()))
    }

    pub fn call(&self, ctx: Context, event: Event) -> BoxFuture<'static, HandlerResult> {
        (self.0)(ctx, event)
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reaction")
    }
}

/// Anything usable where a [`Reaction`] is expected
pub trait IntoReaction {
    fn into_reaction(self) -> Reaction;
}

impl IntoReaction for Reaction {
    fn into_reaction(self) -> Reaction {
        self
    }
}

impl<F, Fut> IntoReaction for F
where
    F: Fn(Context, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_reaction(self) -> Reaction {
        Reaction::new(self)
    }
}

type ErrorFn = dyn Fn(Context, Event, BotError) -> BoxFuture<'static, ()> + Send + Sync;

/// Receives every unparsed update and every failed reaction
#[derive(Clone)]
pub struct ErrorHandler(Arc<ErrorFn>);

impl ErrorHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Event, BotError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        ErrorHandler(Arc::new(move |ctx, event, err| f(ctx, event, err).boxed()))
    }

    pub fn call(&self, ctx: Context, event: Event, err: BotError) -> BoxFuture<'static, ()> {
        (self.0)(ctx, event, err)
    }

    /// Logs the failure and the event
    pub fn logging() -> Self {
        ErrorHandler::new(|_ctx, event: Event, err: BotError| async move {
            tracing::error!(error = %err, ?event, "failed to process event");
        })
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler")
    }
}

/// Middleware trait - transforms a reaction into one that wraps it
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Reaction) -> Reaction;
}

impl<F> Middleware for F
where
    F: Fn(Reaction) -> Reaction + Send + Sync,
{
    fn wrap(&self, next: Reaction) -> Reaction {
        self(next)
    }
}

/// Wrap `reaction` with every middleware in registration order, so the
/// last one registered ends up outermost.
pub fn compose(reaction: Reaction, middlewares: &[Arc<dyn Middleware>]) -> Reaction {
    middlewares
        .iter()
        .fold(reaction, |acc, middleware| middleware.wrap(acc))
}

/// Logging middleware for debugging
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: Reaction) -> Reaction {
        Reaction::new(move |ctx, event: Event| {
            let next = next.clone();
            async move {
                let chat_id = event.chat_id;
                let preview = match event.kind {
                    crate::domain::entities::EventKind::Command => format!("/{}", event.command),
                    crate::domain::entities::EventKind::InlineButton => format!("[{}]", event.button_text),
                    _ => event.text.chars().take(50).collect(),
                };
                tracing::debug!("[{}] {} {}", chat_id, event.kind, preview);

                let started = Instant::now();
                let result = next.call(ctx, event).await;

                match &result {
                    Ok(()) => {
                        tracing::debug!("[{}] Processed OK in {:?}", chat_id, started.elapsed());
                    }
                    Err(e) => {
                        tracing::warn!("[{}] Error after {:?}: {}", chat_id, started.elapsed(), e);
                    }
                }

                result
            }
        })
    }
}
