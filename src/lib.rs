//! fragbot - a chat bot built from self-contained fragments
//!
//! Fragments register commands and listeners into a [`Registry`] during a
//! single build phase. The [`Dispatcher`] then routes inbound events to them
//! concurrently, and each fragment persists state through its own namespace
//! of the shared [`PersistenceStore`].
//!
//! [`Registry`]: application::messaging::Registry
//! [`Dispatcher`]: application::messaging::Dispatcher
//! [`PersistenceStore`]: infrastructure::storage::PersistenceStore

pub mod application;
pub mod domain;
pub mod fragments;
pub mod infrastructure;
