//! Domain traits - Abstractions for infrastructure and fragments

pub mod fragment;
pub mod handler;
pub mod source;
pub mod store;

pub use fragment::Fragment;
pub use handler::{Handler, HandlerResult};
pub use source::EventSource;
pub use store::KvBackend;
