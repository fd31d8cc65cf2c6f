//! Domain layer - Core types with no knowledge of transports or storage engines
//!
//! This layer contains:
//! - Entities: Events, users, triggers, namespaces
//! - Traits: Abstractions for infrastructure (EventSource, KvBackend) and
//!   for fragments (Fragment, Handler)

pub mod entities;
pub mod traits;
