//! Platform update model
//!
//! Mirrors the subset of the Telegram Bot API JSON that the normalizer reads.
//! Unknown fields are ignored on deserialization.

use serde::{Deserialize, Serialize};

use super::User;

/// One raw update from the long-polling feed
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<MessageEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

impl Message {
    pub fn text(chat_id: i64, from: User, text: impl Into<String>) -> Self {
        Self {
            chat: Chat { id: chat_id },
            from: Some(from),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Builds a message whose text starts with a `bot_command` entity.
    pub fn command(chat_id: i64, from: User, text: impl Into<String>) -> Self {
        let text = text.into();
        let length = text.split_whitespace().next().map(|w| w.chars().count()).unwrap_or(0);
        let mut message = Self::text(chat_id, from, text);
        message.entities = Some(vec![MessageEntity {
            kind: "bot_command".to_string(),
            offset: 0,
            length: length as i64,
        }]);
        message
    }

    /// Command name and arguments, when the text opens with a `bot_command` entity.
    pub fn command_parts(&self) -> Option<(String, String)> {
        let text = self.text.as_deref()?;
        let entity = self
            .entities
            .as_ref()?
            .iter()
            .find(|e| e.kind == "bot_command" && e.offset == 0)?;

        let head: String = text.chars().take(entity.length.max(0) as usize).collect();
        let name = head.trim_start_matches('/');
        let name = name.split('@').next().unwrap_or_default().to_string();
        let args = text[head.len()..].trim().to_string();
        Some((name, args))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: i64,
    pub length: i64,
}

/// File attachment (voice, audio, document or video)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileRef {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_inline_query: Option<String>,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            switch_inline_query: None,
        }
    }

    pub fn switch_inline(text: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            switch_inline_query: Some(query.into()),
        }
    }
}
