//! Domain traits - Abstractions for infrastructure implementations

pub mod gate;
pub mod store;
pub mod transport;

pub use gate::{BusyMark, ChatGate};
pub use store::LayerStore;
pub use transport::{BotInfo, Keyboard, OutgoingMessage, ParseMode, Transport};
