//! Transports: where updates come from and where messages go

pub mod console;
pub mod telegram;

pub use console::ConsoleAdapter;
pub use telegram::{TelegramAdapter, TelegramTransport};
