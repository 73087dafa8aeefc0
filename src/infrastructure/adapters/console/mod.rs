//! Console adapter for development/testing
//!
//! Every stdin line becomes an update for a single local chat:
//! `/cmd args` is a command, `!Label` presses a button of the last keyboard,
//! anything else is plain text.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::domain::entities::{
    CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, User,
};
use crate::domain::traits::{BotInfo, Keyboard, OutgoingMessage, Transport};

pub const CONSOLE_CHAT_ID: i64 = 1;

type InlineRows = Vec<Vec<InlineKeyboardButton>>;

/// State shared between the stdin reader and the send path
#[derive(Debug)]
struct Session {
    user: User,
    next_update: AtomicI64,
    next_message: AtomicI64,
    /// Last inline keyboard shown, with the id of the message carrying it
    last_inline: Mutex<Option<(i64, InlineRows)>>,
}

impl Session {
    fn message_id(&self) -> i64 {
        self.next_message.fetch_add(1, Ordering::SeqCst)
    }

    fn parse_line(&self, line: &str) -> Option<Update> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let update_id = self.next_update.fetch_add(1, Ordering::SeqCst);
        let mut update = Update {
            update_id,
            ..Update::default()
        };

        let message = if let Some(label) = line.strip_prefix('!') {
            let label = label.trim();
            match self.press(label, update_id) {
                Some(query) => {
                    update.callback_query = Some(query);
                    return Some(update);
                }
                // reply keyboards answer with their label as plain text
                None => Message::text(CONSOLE_CHAT_ID, self.user.clone(), label),
            }
        } else if line.starts_with('/') {
            Message::command(CONSOLE_CHAT_ID, self.user.clone(), line)
        } else {
            Message::text(CONSOLE_CHAT_ID, self.user.clone(), line)
        };

        update.message = Some(Message {
            message_id: self.message_id(),
            ..message
        });
        Some(update)
    }

    fn press(&self, label: &str, update_id: i64) -> Option<CallbackQuery> {
        let guard = self.last_inline.lock();
        let (message_id, rows) = guard.as_ref()?;
        let button = rows.iter().flatten().find(|b| b.text == label)?;

        Some(CallbackQuery {
            id: format!("console-{update_id}"),
            from: Some(self.user.clone()),
            message: Some(Message {
                message_id: *message_id,
                chat: Chat { id: CONSOLE_CHAT_ID },
                reply_markup: Some(InlineKeyboardMarkup {
                    inline_keyboard: rows.clone(),
                }),
                ..Message::default()
            }),
            data: button.callback_data.clone(),
        })
    }
}

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
    session: Arc<Session>,
}

impl ConsoleAdapter {
    pub fn new() -> Self {
        let login = std::env::var("USER").unwrap_or_else(|_| "console".to_string());
        Self {
            info: BotInfo {
                id: 0,
                name: "chatlayer".to_string(),
                username: "console".to_string(),
            },
            session: Arc::new(Session {
                user: User::new(CONSOLE_CHAT_ID, login.clone()).with_username(login),
                next_update: AtomicI64::new(1),
                next_message: AtomicI64::new(1),
                last_inline: Mutex::new(None),
            }),
        }
    }

    /// Turn one input line into an update. Blank lines yield nothing.
    pub fn parse_line(&self, line: &str) -> Option<Update> {
        self.session.parse_line(line)
    }

    fn print_keyboard(keyboard: &Keyboard) {
        match keyboard {
            Keyboard::Inline(rows) => {
                for row in rows {
                    let labels: Vec<String> = row.iter().map(|b| format!("[{}]", b.text)).collect();
                    println!("  {}", labels.join(" "));
                }
            }
            Keyboard::Reply(rows) => {
                for row in rows {
                    println!("  ({})", row.join(" | "));
                }
            }
        }
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ConsoleAdapter {
    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Update>, BotError> {
        tracing::info!("Starting console bot (dev mode)");
        println!("Type /command, !Button or any text. Ctrl-C to quit.");

        let (tx, rx) = mpsc::channel(16);
        let session = self.session.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => return,
                    line = lines.next_line() => line,
                };

                match line {
                    Ok(Some(line)) => {
                        let Some(update) = session.parse_line(&line) else {
                            continue;
                        };
                        if tx.send(update).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("stdin closed");
                        return;
                    }
                    Err(e) => {
                        tracing::error!("Failed to read stdin: {}", e);
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<i64, BotError> {
        let message_id = self.session.message_id();
        println!("[BOT] {}", message.text);

        if let Some(keyboard) = &message.keyboard {
            Self::print_keyboard(keyboard);
            if let Keyboard::Inline(rows) = keyboard {
                *self.session.last_inline.lock() = Some((message_id, rows.clone()));
            }
        }
        Ok(message_id)
    }

    async fn edit_message(&self, _chat_id: i64, message_id: i64, text: &str) -> Result<(), BotError> {
        println!("[BOT #{}] {}", message_id, text);
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String, BotError> {
        Err(BotError::Api(format!("console has no file storage ({file_id})")))
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
