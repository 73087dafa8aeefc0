//! chatlayer - conversational Telegram bots built from one-shot handler layers
//!
//! Every reply may carry a [`HandlerLayer`]: the reactions for the chat's next
//! event. Events with no pending layer fall through to the bot's default layer.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::errors::{BotError, ConfigError, StartupError};
pub use application::messaging::{
    Context, ErrorHandler, HandlerLayer, HandlerResult, IntoReaction, LoggingMiddleware,
    Middleware, Reaction, ANY_TEXT,
};
pub use application::services::{BotBuilder, BotSettings, ChatBot, LoaderSettings};
pub use domain::entities::{Event, EventKind, Media, MediaKind, Update};
pub use domain::traits::{ChatGate, LayerStore, ParseMode, Transport};
