//! Application layer - Session logic
//! 
//! This layer contains:
//! - Services: The bot facade and the loading indicator
//! - Errors: Bot, startup and configuration errors
//! - Messaging: Layers, middleware, dispatching

pub mod errors;
pub mod services;
pub mod messaging;
