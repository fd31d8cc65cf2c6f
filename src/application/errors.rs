//! Application layer errors

use std::fmt;
use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fragment '{fragment}' failed to load: {reason}")]
    FragmentLoad { fragment: String, reason: String },

    #[error("Event source error: {0}")]
    Source(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    pub fn fragment_load(fragment: impl Into<String>, reason: impl fmt::Display) -> Self {
        BotError::FragmentLoad {
            fragment: fragment.into(),
            reason: reason.to_string(),
        }
    }
}

/// Two registrations (or namespaces) claimed by the same key.
///
/// Owners are kept sorted so the message reads the same whichever fragment
/// happened to load first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} '{trigger}' claimed by both '{}' and '{}'", owners[0], owners[1])]
pub struct CollisionError {
    pub kind: String,
    pub trigger: String,
    pub owners: [String; 2],
}

impl CollisionError {
    pub fn new(
        kind: impl Into<String>,
        trigger: impl Into<String>,
        a: impl Into<String>,
        b: impl Into<String>,
    ) -> Self {
        let mut owners = [a.into(), b.into()];
        owners.sort();
        Self {
            kind: kind.into(),
            trigger: trigger.into(),
            owners,
        }
    }

    pub fn involves(&self, owner: &str) -> bool {
        self.owners.iter().any(|o| o == owner)
    }
}

/// Registry used outside of its build phase
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Registry is serving; cannot {0}")]
pub struct LifecycleError(pub String);

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Collision(#[from] CollisionError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Invalid trigger: {0:?}")]
    InvalidTrigger(String),

    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),
}

/// Handler execution errors
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The user invoked the command wrongly; the text is shown to them
    #[error("{0}")]
    Usage(String),

    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Storage error: {0}")]
    Store(#[from] StorageError),

    #[error("Reply failed: {0}")]
    Reply(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

/// Storage errors
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Namespace '{0}' not granted to this fragment")]
    Forbidden(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
