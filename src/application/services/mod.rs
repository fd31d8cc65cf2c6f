//! Application services - Fragment loading, settings and bot lifecycle

pub mod loader;
pub mod runtime;
pub mod settings;

pub use loader::{FragmentContext, FragmentLoader, LoadedFragments};
pub use runtime::{BotRuntime, RunningBot};
pub use settings::{Gated, Setting, Settings};
