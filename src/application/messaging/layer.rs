//! Handler layers
//!
//! A layer bundles the reactions for one conversational step. It is used in
//! two ways:
//! 1. Built by a reaction and handed to `ChatBot::send_msg`. The layer then
//!    answers the next event from that chat only and is dropped afterwards.
//! 2. As the bot's default layer, which handles every event that has no
//!    chat-specific layer and anything a one-shot layer does not match.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::middleware::{IntoReaction, Middleware, Reaction};
use crate::domain::entities::{Event, EventKind, InlineKeyboardButton};

/// Text key matching any free-text message without a literal registration
pub const ANY_TEXT: &str = "*";

/// Whether a text registration also renders as a reply-keyboard button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Text,
    Button,
}

#[derive(Clone)]
struct TextEntry {
    text: String,
    kind: TextKind,
    reaction: Reaction,
    order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Callback,
    /// Opens an inline query with the given text instead of calling back
    SwitchInlineQuery(String),
}

/// Inline button registered on a layer
#[derive(Clone)]
pub struct InlineButton {
    id: Uuid,
    label: String,
    action: ButtonAction,
    reaction: Reaction,
    order: u32,
}

impl InlineButton {
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Wire representation of this button
    pub fn to_markup(&self) -> InlineKeyboardButton {
        match &self.action {
            ButtonAction::Callback => InlineKeyboardButton::callback(&self.label, self.id()),
            ButtonAction::SwitchInlineQuery(query) => {
                InlineKeyboardButton::switch_inline(&self.label, query)
            }
        }
    }
}

impl fmt::Debug for InlineButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineButton")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("action", &self.action)
            .field("order", &self.order)
            .finish()
    }
}

/// `now + ttl`, clamped to the latest representable instant
pub(crate) fn deadline(ttl: Duration) -> DateTime<Utc> {
    Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Reactions for events from one chat
#[derive(Clone)]
pub struct HandlerLayer {
    text: String,
    commands: HashMap<String, Reaction>,
    texts: HashMap<String, TextEntry>,
    buttons: HashMap<String, InlineButton>,
    default_reaction: Option<Reaction>,
    expires_at: DateTime<Utc>,
    row_mode: bool,
    next_order: u32,
    /// Bot middlewares at creation time. Inspection only: dispatch always
    /// wraps reactions in the bot's current chain.
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl HandlerLayer {
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            text: String::new(),
            commands: HashMap::new(),
            texts: HashMap::new(),
            buttons: HashMap::new(),
            default_reaction: None,
            expires_at,
            row_mode: false,
            next_order: 0,
            middlewares: Vec::new(),
        }
    }

    /// Layer valid for `ttl` from now
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(deadline(ttl))
    }

    pub(crate) fn with_middlewares(mut self, middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        self.middlewares = middlewares;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Append a line to the reply text
    pub fn add_text(&mut self, line: impl AsRef<str>) {
        if self.text.is_empty() {
            self.text = line.as_ref().to_string();
            return;
        }
        self.text.push('\n');
        self.text.push_str(line.as_ref());
    }

    /// Register a command reaction. The leading `/` is optional.
    pub fn register_command(&mut self, command: impl Into<String>, reaction: impl IntoReaction) {
        let command = command.into();
        let key = if command.starts_with('/') {
            command
        } else {
            format!("/{command}")
        };
        self.commands.insert(key, reaction.into_reaction());
    }

    /// Register a reaction for an exact text, or [`ANY_TEXT`] for everything else
    pub fn register_text(&mut self, text: impl Into<String>, reaction: impl IntoReaction) {
        self.insert_text(text.into(), TextKind::Text, reaction.into_reaction());
    }

    /// Like [`register_text`](Self::register_text), and also shows the text as a reply-keyboard button
    pub fn register_button(&mut self, text: impl Into<String>, reaction: impl IntoReaction) {
        self.insert_text(text.into(), TextKind::Button, reaction.into_reaction());
    }

    fn insert_text(&mut self, text: String, kind: TextKind, reaction: Reaction) {
        let order = self.bump_order();
        self.texts.insert(
            text.clone(),
            TextEntry {
                text,
                kind,
                reaction,
                order,
            },
        );
    }

    /// Register an inline button and return its generated callback id
    pub fn register_ibutton(&mut self, label: impl Into<String>, reaction: impl IntoReaction) -> String {
        self.insert_button(label.into(), ButtonAction::Callback, reaction.into_reaction())
    }

    /// Register an inline button that switches the user to an inline query
    pub fn register_ibutton_switch(
        &mut self,
        label: impl Into<String>,
        query: impl Into<String>,
        reaction: impl IntoReaction,
    ) -> String {
        self.insert_button(
            label.into(),
            ButtonAction::SwitchInlineQuery(query.into()),
            reaction.into_reaction(),
        )
    }

    fn insert_button(&mut self, label: String, action: ButtonAction, reaction: Reaction) -> String {
        let id = Uuid::new_v4();
        let order = self.bump_order();
        self.buttons.insert(
            id.to_string(),
            InlineButton {
                id,
                label,
                action,
                reaction,
                order,
            },
        );
        id.to_string()
    }

    pub fn register_default_handler(&mut self, reaction: impl IntoReaction) {
        self.default_reaction = Some(reaction.into_reaction());
    }

    /// Lay out all inline buttons but the last in one row, the last one below
    pub fn set_row_mode(&mut self, row_mode: bool) {
        self.row_mode = row_mode;
    }

    pub fn row_mode(&self) -> bool {
        self.row_mode
    }

    fn bump_order(&mut self) -> u32 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    /// Reaction registered for this event's key, without any fallback
    pub fn handler(&self, event: &Event) -> Option<Reaction> {
        match event.kind {
            EventKind::Command => self
                .commands
                .get(&format!("/{}", event.command))
                .cloned(),
            EventKind::Text => self
                .texts
                .get(&event.text)
                .or_else(|| self.texts.get(ANY_TEXT))
                .map(|entry| entry.reaction.clone()),
            EventKind::InlineButton => self
                .buttons
                .get(&event.button)
                .map(|button| button.reaction.clone()),
            EventKind::Media | EventKind::Unrecognized => None,
        }
    }

    pub fn default_reaction(&self) -> Option<Reaction> {
        self.default_reaction.clone()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn set_expires_at(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = expires_at;
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// No reactions at all; such a layer never matches anything
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
            && self.texts.is_empty()
            && self.buttons.is_empty()
            && self.default_reaction.is_none()
    }

    /// Inline buttons in registration order
    pub fn inline_buttons(&self) -> Vec<&InlineButton> {
        let mut buttons: Vec<&InlineButton> = self.buttons.values().collect();
        buttons.sort_by_key(|b| b.order);
        buttons
    }

    /// Reply-keyboard button labels in registration order
    pub fn reply_buttons(&self) -> Vec<&str> {
        let mut entries: Vec<&TextEntry> = self
            .texts
            .values()
            .filter(|entry| entry.kind == TextKind::Button)
            .collect();
        entries.sort_by_key(|entry| entry.order);
        entries.into_iter().map(|entry| entry.text.as_str()).collect()
    }

    /// Middlewares the bot had when this layer was created. Not consulted
    /// by dispatch.
    pub fn middleware_count(&self) -> usize {
        self.middlewares.len()
    }
}

impl fmt::Debug for HandlerLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<&String> = self.commands.keys().collect();
        commands.sort();
        f.debug_struct("HandlerLayer")
            .field("text", &self.text)
            .field("commands", &commands)
            .field("texts", &self.texts.len())
            .field("buttons", &self.inline_buttons())
            .field("has_default", &self.default_reaction.is_some())
            .field("expires_at", &self.expires_at)
            .field("row_mode", &self.row_mode)
            .finish()
    }
}
