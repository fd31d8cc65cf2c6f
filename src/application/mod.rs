//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Fragment loading and the bot runtime
//! - Errors: Error taxonomy shared by every layer
//! - Messaging: Registry, trigger parsing, dispatching

pub mod errors;
pub mod services;
pub mod messaging;
