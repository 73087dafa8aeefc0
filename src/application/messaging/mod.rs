//! Messaging module - Layers, middleware and event dispatch

pub mod dispatcher;
pub mod keyboard;
pub mod layer;
pub mod middleware;

pub use dispatcher::{resolve, Dispatcher, Registry};
pub use layer::{ButtonAction, HandlerLayer, InlineButton, TextKind, ANY_TEXT};
pub use middleware::{
    compose, Context, ErrorHandler, HandlerResult, IntoReaction, LoggingMiddleware, Middleware,
    Reaction,
};
