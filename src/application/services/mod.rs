//! Application services - The bot facade and helpers built on it

pub mod chat_bot;
pub mod loader;


pub use chat_bot::{BotBuilder, BotSettings, ChatBot};
pub use loader::LoaderSettings;
