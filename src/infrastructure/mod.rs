//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: YAML configuration loading
//! - Storage: Key/value persistence (SQLite, in-memory)
//! - Adapters: Event sources (console, in-process channel)

pub mod config;
pub mod storage;
pub mod adapters;
