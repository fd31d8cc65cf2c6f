//! Invocation context handed to fragment handlers

use std::sync::Arc;

use super::parser::Arguments;
use super::registry::Registry;
use crate::application::errors::HandlerError;
use crate::domain::entities::{InboundEvent, Origin, TriggerKind, User};
use crate::domain::traits::EventSource;
use crate::infrastructure::storage::NamespaceHandle;

/// Reply capability bound to the channel an event came from
#[derive(Clone)]
pub struct Replier {
    source: Arc<dyn EventSource>,
    origin: Origin,
}

impl Replier {
    pub fn new(source: Arc<dyn EventSource>, origin: Origin) -> Self {
        Self { source, origin }
    }

    pub async fn send(&self, content: impl AsRef<str>) -> Result<(), HandlerError> {
        self.source
            .send(&self.origin, content.as_ref())
            .await
            .map_err(|e| HandlerError::Reply(e.to_string()))
    }
}

/// Everything a handler gets for one matched event
#[derive(Clone)]
pub struct Invocation {
    pub event: Arc<InboundEvent>,
    /// The owning fragment's namespaced store
    pub store: NamespaceHandle,
    pub reply: Replier,
    /// Whether a command or a listener matched
    pub kind: TriggerKind,
    /// Matched trigger, or the listener name for raw events
    pub trigger: String,
    pub args: Arguments,
    /// Read-only view of the routing table
    pub registry: Arc<Registry>,
}

impl Invocation {
    pub fn sender(&self) -> Option<&User> {
        self.event.sender()
    }

    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.args.words.get(idx).map(String::as_str)
    }

    /// Reply with a usage error if the required argument is missing
    pub fn require_arg(&self, idx: usize, usage: &str) -> Result<&str, HandlerError> {
        self.arg(idx)
            .ok_or_else(|| HandlerError::Usage(format!("Usage: {}", usage)))
    }
}
