//! Platform adapters - event sources the dispatcher can run against

pub mod channel;
pub mod console;

pub use channel::{ChannelSource, SentMessage};
pub use console::ConsoleAdapter;
