//! Domain layer - Platform model and service seams
//! 
//! This layer contains:
//! - Entities: Platform updates, users and normalized events
//! - Traits: Abstractions for infrastructure (Transport, LayerStore, ChatGate)

pub mod entities;
pub mod traits;
