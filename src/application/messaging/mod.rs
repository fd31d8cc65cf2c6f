//! Event handling - trigger parsing, the routing registry and the dispatcher

pub mod context;
pub mod dispatcher;
pub mod parser;
pub mod registry;

pub use context::{Invocation, Replier};
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher, DispatcherConfig};
pub use parser::{Arguments, TriggerParser};
pub use registry::{CommandMatch, Registry, RegistryState};
