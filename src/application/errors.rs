//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    /// The platform sent an update shape the normalizer does not model.
    #[error("unparsed event")]
    UnparsedEvent,

    #[error("can't send both inline and regular buttons")]
    MixedKeyboard,

    #[error("RetryLastLayer: no previous layer for chat {0}")]
    NoPreviousLayer(i64),

    #[error("Invalid configuration: {0}")]
    Startup(#[from] StartupError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Telegram API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl BotError {
    /// Shorthand for reactions that fail with a plain message.
    pub fn handler(msg: impl Into<String>) -> Self {
        BotError::Handler(msg.into())
    }
}

/// Reasons `ChatBot::start` refuses to run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error("error handler is not set")]
    MissingErrorHandler,

    #[error("default handler is not set")]
    MissingDefaultHandler,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
