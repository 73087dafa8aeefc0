//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chatlayer::domain::entities::{
    CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, User,
};
use chatlayer::domain::traits::{BotInfo, Keyboard, OutgoingMessage};
use chatlayer::{BotError, ChatBot, Transport};

/// Transport fed from a channel the test holds, recording every send
pub struct MockTransport {
    feed: Mutex<Option<mpsc::Receiver<Update>>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    next_id: AtomicI64,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::Sender<Update>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            feed: Mutex::new(Some(rx)),
            sent: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        });
        (transport, tx)
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.text.clone()).collect()
    }

    /// Inline buttons of the last message, as (label, callback data)
    pub fn last_inline_buttons(&self) -> Vec<(String, String)> {
        let sent = self.sent.lock();
        match sent.last().and_then(|m| m.keyboard.as_ref()) {
            Some(Keyboard::Inline(rows)) => rows
                .iter()
                .flatten()
                .map(|b| (b.text.clone(), b.callback_data.clone().unwrap_or_default()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&self, _cancel: CancellationToken) -> Result<mpsc::Receiver<Update>, BotError> {
        self.feed
            .lock()
            .take()
            .ok_or_else(|| BotError::Network("feed already taken".to_string()))
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<i64, BotError> {
        self.sent.lock().push(message);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_message(&self, _chat_id: i64, _message_id: i64, _text: &str) -> Result<(), BotError> {
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String, BotError> {
        Ok(format!("https://files.test/{file_id}"))
    }

    fn bot_info(&self) -> BotInfo {
        BotInfo {
            id: 99,
            name: "Mock".to_string(),
            username: "mock_bot".to_string(),
        }
    }
}

pub fn bot() -> (ChatBot, Arc<MockTransport>, mpsc::Sender<Update>) {
    let (transport, feed) = MockTransport::new();
    let bot = ChatBot::builder(transport.clone()).build();
    (bot, transport, feed)
}

fn user() -> User {
    User::new(7, "Ann").with_username("ann")
}

pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        message: Some(Message::text(chat_id, user(), text)),
        ..Update::default()
    }
}

pub fn command_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        message: Some(Message::command(chat_id, user(), text)),
        ..Update::default()
    }
}

pub fn callback_update(update_id: i64, chat_id: i64, label: &str, data: &str) -> Update {
    Update {
        update_id,
        callback_query: Some(CallbackQuery {
            id: format!("cb-{update_id}"),
            from: Some(user()),
            message: Some(Message {
                message_id: 1,
                chat: Chat { id: chat_id },
                reply_markup: Some(InlineKeyboardMarkup {
                    inline_keyboard: vec![vec![InlineKeyboardButton::callback(label, data)]],
                }),
                ..Message::default()
            }),
            data: Some(data.to_string()),
        }),
        ..Update::default()
    }
}
