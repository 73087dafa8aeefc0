//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: YAML configuration loading
//! - Storage: In-memory pending layers, busy-chat marks and their sweepers
//! - Adapters: Transports (Telegram long polling, console)

pub mod adapters;
pub mod config;
pub mod storage;
