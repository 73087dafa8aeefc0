//! Canonical events and the update normalizer

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};

use super::update::{CallbackQuery, Message, Update};
use super::User;
use crate::application::messaging::HandlerLayer;

/// Shape of an incoming interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Command,
    Text,
    #[serde(rename = "buttonInline")]
    InlineButton,
    Media,
    /// Placeholder kind for updates the normalizer could not model.
    #[default]
    Unrecognized,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Command => "command",
            EventKind::Text => "text",
            EventKind::InlineButton => "buttonInline",
            EventKind::Media => "media",
            EventKind::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Voice,
    Audio,
    Photo,
    Document,
    Video,
}

/// Attachment carried by a media event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub kind: MediaKind,
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// One normalized interaction from a chat
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub text: String,
    pub command: String,
    pub command_arguments: String,
    pub button: String,
    pub button_text: String,
    pub chat_id: i64,
    pub user_tg_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(skip)]
    pub(crate) last_layer: Weak<HandlerLayer>,
}

impl Event {
    /// Normalizes a platform update.
    ///
    /// Returns `None` when the update carries none of the modelled payloads.
    /// Recognition order is media, command, text, inline button.
    pub fn from_update(update: &Update) -> Option<Event> {
        if let Some(message) = &update.message {
            return Some(Self::from_message(message));
        }
        if let Some(query) = &update.callback_query {
            return Self::from_callback(query);
        }
        None
    }

    /// Best-effort event for an update that could not be normalized.
    pub fn unparsed(update: &Update) -> Event {
        let chat_id = update
            .message
            .as_ref()
            .or_else(|| update.callback_query.as_ref().and_then(|q| q.message.as_ref()))
            .map(|m| m.chat.id)
            .unwrap_or_default();
        Event {
            chat_id,
            ..Event::default()
        }
    }

    fn from_message(message: &Message) -> Event {
        let mut event = Event {
            chat_id: message.chat.id,
            ..Event::default()
        };

        if let Some(media) = media_of(message) {
            event.kind = EventKind::Media;
            event.media = Some(media);
        } else if let Some((command, args)) = message.command_parts() {
            event.kind = EventKind::Command;
            event.command = command;
            event.command_arguments = args;
        } else {
            event.kind = EventKind::Text;
            event.text = message.text.clone().unwrap_or_default();
        }

        event.fill_sender(message.from.as_ref());
        event
    }

    fn from_callback(query: &CallbackQuery) -> Option<Event> {
        // Without the originating message there is no chat to answer in.
        let message = query.message.as_ref()?;
        let data = query.data.clone().unwrap_or_default();

        let button_text = message
            .reply_markup
            .iter()
            .flat_map(|markup| markup.inline_keyboard.iter().flatten())
            .find(|button| button.callback_data.as_deref() == Some(data.as_str()))
            .map(|button| button.text.clone())
            .unwrap_or_default();

        let mut event = Event {
            kind: EventKind::InlineButton,
            button: data,
            button_text,
            chat_id: message.chat.id,
            ..Event::default()
        };
        event.fill_sender(query.from.as_ref());
        Some(event)
    }

    fn fill_sender(&mut self, from: Option<&User>) {
        let Some(from) = from else {
            return;
        };
        self.user_tg_id = from.id;
        self.first_name = from.first_name.clone();
        self.last_name = from.last_name.clone().unwrap_or_default();
        self.username = from.username.clone().unwrap_or_default();
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Layer that was active when this event was dispatched.
    ///
    /// Only resolvable while the dispatcher still runs the event's reaction.
    pub fn last_layer(&self) -> Option<Arc<HandlerLayer>> {
        self.last_layer.upgrade()
    }

    pub(crate) fn set_last_layer(&mut self, layer: &Arc<HandlerLayer>) {
        self.last_layer = Arc::downgrade(layer);
    }
}

fn media_of(message: &Message) -> Option<Media> {
    let file = |kind, file: &super::update::FileRef| Media {
        kind,
        file_id: file.file_id.clone(),
        mime_type: file.mime_type.clone(),
        duration: file.duration,
    };

    if let Some(voice) = &message.voice {
        return Some(file(MediaKind::Voice, voice));
    }
    if let Some(audio) = &message.audio {
        return Some(file(MediaKind::Audio, audio));
    }
    if let Some(video) = &message.video {
        return Some(file(MediaKind::Video, video));
    }
    if let Some(document) = &message.document {
        return Some(file(MediaKind::Document, document));
    }
    let photo = message
        .photo
        .as_ref()?
        .iter()
        .max_by_key(|p| u64::from(p.width) * u64::from(p.height))?;
    Some(Media {
        kind: MediaKind::Photo,
        file_id: photo.file_id.clone(),
        mime_type: None,
        duration: None,
    })
}
