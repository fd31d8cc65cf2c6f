use super::EventKind;
use crate::domain::traits::Handler;
use std::fmt;
use std::sync::Arc;

/// What a registration listens for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerKind {
    /// A text command carried by a message event
    Command,
    /// Every event of the given kind, under a listener name
    Event(EventKind),
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Command => f.write_str("command"),
            TriggerKind::Event(kind) => write!(f, "{} listener", kind),
        }
    }
}

/// Text that routes an event to a handler
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Matches only when the whole message equals the trigger
    Exact(String),
    /// Matches when the message starts with the trigger's words
    Prefix(String),
}

impl Trigger {
    pub fn text(&self) -> &str {
        match self {
            Trigger::Exact(s) | Trigger::Prefix(s) => s,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Trigger::Exact(_))
    }

    /// Lowercased, whitespace-collapsed form. Exact and prefix triggers share
    /// this key space.
    pub fn normalized(&self) -> String {
        normalize(self.text())
    }

    pub fn word_count(&self) -> usize {
        self.text().split_whitespace().count()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One row of the registry's routing table
#[derive(Clone)]
pub struct RegistrationEntry {
    pub kind: TriggerKind,
    pub trigger: Trigger,
    pub owner: String,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub handler: Arc<dyn Handler>,
}

impl RegistrationEntry {
    pub fn new(
        kind: TriggerKind,
        trigger: Trigger,
        owner: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            kind,
            trigger,
            owner: owner.into(),
            description: None,
            usage: None,
            handler,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn key(&self) -> (TriggerKind, String) {
        (self.kind.clone(), self.trigger.normalized())
    }
}

impl fmt::Debug for RegistrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationEntry")
            .field("kind", &self.kind)
            .field("trigger", &self.trigger)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
