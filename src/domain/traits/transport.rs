use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::domain::entities::{InlineKeyboardButton, Update};

/// Transport trait - abstraction for messaging platform adapters
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin pulling updates. The channel closes once `cancel` fires or the feed dies.
    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Update>, BotError>;

    /// Send a message, returning the platform message id
    async fn send_message(&self, message: OutgoingMessage) -> Result<i64, BotError>;

    /// Replace the text of a message sent earlier
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), BotError>;

    /// Resolve a direct download URL for an attachment
    async fn file_url(&self, file_id: &str) -> Result<String, BotError>;

    /// Get bot info
    fn bot_info(&self) -> BotInfo;
}

/// Text formatting mode applied by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ParseMode {
    #[default]
    #[serde(rename = "HTML")]
    Html,
    Markdown,
    MarkdownV2,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Html => "HTML",
            ParseMode::Markdown => "Markdown",
            ParseMode::MarkdownV2 => "MarkdownV2",
        }
    }
}

/// Keyboard attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    Inline(Vec<Vec<InlineKeyboardButton>>),
    Reply(Vec<Vec<String>>),
}

/// Outbound send request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
    pub parse_mode: Option<ParseMode>,
}

impl OutgoingMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
            parse_mode: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Option<Keyboard>) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn with_parse_mode(mut self, parse_mode: Option<ParseMode>) -> Self {
        self.parse_mode = parse_mode;
        self
    }
}

/// Bot information
#[derive(Debug, Clone, Default)]
pub struct BotInfo {
    pub id: i64,
    pub name: String,
    pub username: String,
}
