//! Scoped settings - per-server and per-channel values fragments declare
//!
//! Values live in the base layer's own `settings` namespace, keyed by
//! setting, scope and target id. A read looks at the channel value first
//! (for settings that allow one), then the server-wide value, then the
//! declared default. Events from platforms without servers share one
//! server-wide scope.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::application::errors::{HandlerError, StorageError};
use crate::application::messaging::Invocation;
use crate::domain::entities::setting::truthy;
use crate::domain::entities::{InboundEvent, Namespace, SettingScope, SettingSpec, TriggerKind};
use crate::domain::traits::{Handler, HandlerResult};
use crate::infrastructure::storage::{NamespaceHandle, PersistenceStore};

/// Server id used when the platform has no notion of servers
pub const NO_SERVER: &str = "-";

/// Read and write access to every setting value
#[derive(Clone)]
pub struct Settings {
    store: NamespaceHandle,
}

impl Settings {
    pub fn new(store: Arc<PersistenceStore>) -> Result<Self, StorageError> {
        let namespace = Namespace::system("settings")
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self {
            store: NamespaceHandle::new(store, namespace),
        })
    }

    fn key(spec: &SettingSpec, scope: SettingScope, event: &InboundEvent) -> String {
        let server = event.server().unwrap_or(NO_SERVER);
        match scope {
            SettingScope::Server => format!("{}:server:{}", spec.name, server),
            SettingScope::Channel => {
                format!("{}:channel:{}/{}", spec.name, server, event.channel())
            }
        }
    }

    /// The value stored at exactly `scope`, without fallback or default
    pub async fn value_at(
        &self,
        spec: &SettingSpec,
        scope: SettingScope,
        event: &InboundEvent,
    ) -> Result<Option<String>, StorageError> {
        if !spec.supports(scope) {
            return Ok(None);
        }
        self.store.get(&Self::key(spec, scope, event)).await
    }

    /// The value that applies to `event`
    pub async fn get(
        &self,
        spec: &SettingSpec,
        event: &InboundEvent,
    ) -> Result<Option<String>, StorageError> {
        for scope in SettingScope::FALLBACK {
            if let Some(value) = self.value_at(spec, scope, event).await? {
                debug!(setting = %spec.name, %scope, %value, "Setting resolved");
                return Ok(Some(value));
            }
        }
        Ok(spec.default.clone())
    }

    /// Whether a toggle is on for `event`; unset and unparsable values are off
    pub async fn enabled(
        &self,
        spec: &SettingSpec,
        event: &InboundEvent,
    ) -> Result<bool, StorageError> {
        Ok(self
            .get(spec, event)
            .await?
            .is_some_and(|value| truthy(&value).unwrap_or(false)))
    }

    /// Store a value at `scope` for the server or channel `event` came from.
    /// `None` clears it so reads fall back again.
    pub async fn set(
        &self,
        spec: &SettingSpec,
        scope: SettingScope,
        event: &InboundEvent,
        value: Option<&str>,
    ) -> Result<Option<String>, HandlerError> {
        if !spec.supports(scope) {
            return Err(HandlerError::Usage(format!(
                "{} can only be set for the whole server",
                spec.name
            )));
        }

        let key = Self::key(spec, scope, event);
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => {
                let value = spec.normalize(raw).map_err(HandlerError::Usage)?;
                self.store.put(&key, &value).await?;
                debug!(setting = %spec.name, %scope, %value, "Setting stored");
                Ok(Some(value))
            }
            None => {
                self.store.delete(&key).await?;
                debug!(setting = %spec.name, %scope, "Setting cleared");
                Ok(None)
            }
        }
    }
}

/// A setting declared by a fragment, bound to the settings store
#[derive(Clone)]
pub struct Setting {
    spec: Arc<SettingSpec>,
    settings: Settings,
}

impl Setting {
    pub(crate) fn new(spec: SettingSpec, settings: Settings) -> Self {
        Self {
            spec: Arc::new(spec),
            settings,
        }
    }

    pub fn spec(&self) -> &SettingSpec {
        &self.spec
    }

    pub async fn get(&self, event: &InboundEvent) -> Result<Option<String>, StorageError> {
        self.settings.get(&self.spec, event).await
    }

    pub async fn enabled(&self, event: &InboundEvent) -> Result<bool, StorageError> {
        self.settings.enabled(&self.spec, event).await
    }

    /// Only run `handler` where this toggle is on. A gated command answers
    /// with a usage message when it is off; a gated listener stays silent.
    pub fn gate<H: Handler>(&self, handler: H) -> Gated<H> {
        Gated {
            toggle: self.clone(),
            inner: handler,
        }
    }
}

/// Handler that checks a toggle before running
pub struct Gated<H> {
    toggle: Setting,
    inner: H,
}

#[async_trait]
impl<H: Handler> Handler for Gated<H> {
    async fn handle(&self, invocation: Invocation) -> HandlerResult {
        if self.toggle.enabled(&invocation.event).await? {
            return self.inner.handle(invocation).await;
        }

        debug!(
            setting = %self.toggle.spec.name,
            trigger = %invocation.trigger,
            channel = %invocation.event.channel(),
            "Handler switched off here"
        );
        if invocation.kind == TriggerKind::Command {
            return Err(HandlerError::Usage(format!(
                "{} is switched off here ({})",
                invocation.trigger, self.toggle.spec.name
            )));
        }
        Ok(())
    }
}
