//! Telegram adapter

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::domain::entities::{InlineKeyboardButton, Update};
use crate::domain::traits::{BotInfo, Keyboard, OutgoingMessage, Transport};
use crate::infrastructure::config::TelegramConfig;

/// Pause before polling again after a failed `getUpdates`
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Buffered updates between the poller and the dispatcher
const UPDATE_BUFFER: usize = 100;

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReplyMarkup {
    Inline {
        inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
    },
    Reply {
        keyboard: Vec<Vec<ReplyButton>>,
        resize_keyboard: bool,
        one_time_keyboard: bool,
    },
}

#[derive(Debug, Serialize)]
struct ReplyButton {
    text: String,
}

impl From<Keyboard> for ReplyMarkup {
    fn from(keyboard: Keyboard) -> Self {
        match keyboard {
            Keyboard::Inline(rows) => ReplyMarkup::Inline {
                inline_keyboard: rows,
            },
            Keyboard::Reply(rows) => ReplyMarkup::Reply {
                keyboard: rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|text| ReplyButton { text }).collect())
                    .collect(),
                resize_keyboard: true,
                one_time_keyboard: true,
            },
        }
    }
}

/// Telegram bot adapter
pub struct TelegramAdapter {
    token: String,
    api_base: String,
    poll_timeout: u64,
    client: Client,
    info: RwLock<BotInfo>,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>, config: &TelegramConfig) -> Self {
        Self {
            token: token.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_timeout: config.poll_timeout_secs,
            client: Client::new(),
            info: RwLock::new(BotInfo::default()),
        }
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// POST a Bot API method and unwrap its envelope
    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, BotError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(request)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let status = response.status();
        let data: ApiResponse<Resp> = response
            .json()
            .await
            .map_err(|e| BotError::Parse(format!("{method}: {e}")))?;

        if !data.ok || !status.is_success() {
            let reason = data.description.unwrap_or_else(|| status.to_string());
            return Err(BotError::Api(format!("{method}: {reason}")));
        }

        data.result
            .ok_or_else(|| BotError::Parse(format!("{method}: empty result")))
    }

    /// Fetch bot info from Telegram API
    pub async fn fetch_bot_info(&self) -> Result<BotInfo, BotError> {
        #[derive(Deserialize)]
        struct Me {
            id: i64,
            first_name: String,
            #[serde(default)]
            username: String,
        }

        let me: Me = self.call("getMe", &serde_json::json!({})).await?;
        let info = BotInfo {
            id: me.id,
            name: me.first_name,
            username: me.username,
        };
        *self.info.write() = info.clone();
        Ok(info)
    }

    /// Get updates from Telegram using getUpdates API
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotError> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: u64,
            allowed_updates: Vec<&'static str>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout,
            allowed_updates: vec!["message", "callback_query"],
        };
        self.call("getUpdates", &request).await
    }

    /// Get the next update offset
    pub fn next_offset(current: i64, updates: &[Update]) -> i64 {
        updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(current)
            .max(current)
    }

    /// Stop the button spinner on the user's side
    pub async fn answer_callback(&self, callback_id: &str) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct AnswerRequest<'a> {
            callback_query_id: &'a str,
        }

        let _: bool = self
            .call("answerCallbackQuery", &AnswerRequest { callback_query_id: callback_id })
            .await?;
        Ok(())
    }

    async fn poll(self: std::sync::Arc<Self>, tx: mpsc::Sender<Update>, cancel: CancellationToken) {
        let mut offset = 0;
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => return,
                batch = self.get_updates(offset) => batch,
            };

            let updates = match batch {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Failed to get updates: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(RETRY_DELAY) => continue,
                    }
                }
            };

            offset = Self::next_offset(offset, &updates);
            for update in updates {
                if let Some(query) = &update.callback_query {
                    let this = self.clone();
                    let id = query.id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.answer_callback(&id).await {
                            tracing::debug!("Failed to answer callback: {}", e);
                        }
                    });
                }
                if tx.send(update).await.is_err() {
                    tracing::debug!("update receiver dropped, stopping poller");
                    return;
                }
            }
        }
    }
}

/// Cheap handle so the poller can outlive the `start` call
pub struct TelegramTransport {
    adapter: std::sync::Arc<TelegramAdapter>,
}

impl TelegramTransport {
    pub fn new(adapter: TelegramAdapter) -> Self {
        Self {
            adapter: std::sync::Arc::new(adapter),
        }
    }

    pub fn adapter(&self) -> &TelegramAdapter {
        &self.adapter
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Update>, BotError> {
        let info = self.adapter.fetch_bot_info().await?;
        tracing::info!(
            "Starting Telegram bot @{} (token: {}...)",
            info.username,
            self.adapter.token.chars().take(8).collect::<String>()
        );

        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        tokio::spawn(self.adapter.clone().poll(tx, cancel));
        Ok(rx)
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<i64, BotError> {
        #[derive(Serialize)]
        struct SendMessageRequest {
            chat_id: i64,
            text: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            parse_mode: Option<&'static str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply_markup: Option<ReplyMarkup>,
        }

        #[derive(Deserialize)]
        struct MessageResult {
            message_id: i64,
        }

        tracing::debug!("Sending to {}: {}", message.chat_id, message.text);
        let request = SendMessageRequest {
            chat_id: message.chat_id,
            text: message.text,
            parse_mode: message.parse_mode.map(|mode| mode.as_str()),
            reply_markup: message.keyboard.map(ReplyMarkup::from),
        };

        let result: MessageResult = self.adapter.call("sendMessage", &request).await?;
        Ok(result.message_id)
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct EditRequest<'a> {
            chat_id: i64,
            message_id: i64,
            text: &'a str,
        }

        // Bot API returns the edited message; only success matters here.
        let _: serde_json::Value = self
            .adapter
            .call(
                "editMessageText",
                &EditRequest {
                    chat_id,
                    message_id,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String, BotError> {
        #[derive(Serialize)]
        struct GetFileRequest<'a> {
            file_id: &'a str,
        }

        #[derive(Deserialize)]
        struct File {
            file_path: Option<String>,
        }

        let file: File = self
            .adapter
            .call("getFile", &GetFileRequest { file_id })
            .await?;
        let path = file
            .file_path
            .ok_or_else(|| BotError::Api(format!("getFile: no path for {file_id}")))?;

        Ok(format!(
            "{}/file/bot{}/{}",
            self.adapter.api_base, self.adapter.token, path
        ))
    }

    fn bot_info(&self) -> BotInfo {
        self.adapter.info.read().clone()
    }
}
