//! Domain entities - Platform updates and the normalized events built from them

pub mod event;
pub mod update;
pub mod user;

pub use event::{Event, EventKind, Media, MediaKind};
pub use update::{
    CallbackQuery, Chat, FileRef, InlineKeyboardButton, InlineKeyboardMarkup, Message,
    MessageEntity, PhotoSize, Update,
};
pub use user::User;
