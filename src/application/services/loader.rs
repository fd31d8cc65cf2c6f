//! Fragment loader - the build phase
//!
//! Fragments are set up one at a time in the declared order. Each gets a
//! [`FragmentContext`] through which it registers handlers, declares shared
//! namespaces and settings, and obtains its store handle. Any error aborts
//! startup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::application::errors::{BotError, CollisionError, RegistryError};
use crate::application::messaging::Registry;
use super::settings::{Setting, Settings};
use crate::domain::entities::{
    EventKind, Namespace, RegistrationEntry, SettingSpec, Trigger, TriggerKind,
};
use crate::domain::traits::{Fragment, Handler};
use crate::infrastructure::storage::{NamespaceHandle, PersistenceStore};

/// What a fragment sees while it is being loaded
pub struct FragmentContext<'a> {
    registry: &'a mut Registry,
    owner: String,
    prefix: &'a str,
    handle: NamespaceHandle,
    shares: Vec<String>,
    settings: Settings,
}

impl<'a> FragmentContext<'a> {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn prefix(&self) -> &str {
        self.prefix
    }

    /// `name` with the configured command prefix
    pub fn prefixed(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Register a handler under an explicit kind and trigger
    pub fn register<H: Handler + 'static>(
        &mut self,
        kind: TriggerKind,
        trigger: Trigger,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.registry.register(kind, trigger, &self.owner, Arc::new(handler))
    }

    /// Build a prefix-command entry for `name`; finish it with [`Self::add`]
    pub fn command<H: Handler + 'static>(&self, name: &str, handler: H) -> RegistrationEntry {
        RegistrationEntry::new(
            TriggerKind::Command,
            Trigger::Prefix(self.prefixed(name)),
            self.owner.clone(),
            Arc::new(handler),
        )
    }

    pub fn add(&mut self, entry: RegistrationEntry) -> Result<(), RegistryError> {
        if entry.owner != self.owner {
            return Err(RegistryError::InvalidTrigger(format!(
                "entry for '{}' added by '{}'",
                entry.owner, self.owner
            )));
        }
        self.registry.register_entry(entry)
    }

    /// Listen to every event of `kind` under a listener name
    pub fn listen<H: Handler + 'static>(
        &mut self,
        kind: EventKind,
        name: &str,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register(TriggerKind::Event(kind), Trigger::Exact(name.to_string()), handler)
    }

    /// Opt in to a shared namespace. Every fragment that wants to use it must
    /// declare it; a namespace only one fragment declares fails the load.
    pub fn share(&mut self, name: &str) -> Result<NamespaceHandle, RegistryError> {
        Namespace::shared(name)?;
        if !self.shares.iter().any(|s| s == name) {
            self.shares.push(name.to_string());
        }
        self.handle.grant(name);
        self.handle
            .shared(name)
            .map_err(|_| RegistryError::InvalidNamespace(name.to_string()))
    }

    /// This fragment's own namespaced store
    pub fn namespace(&self) -> NamespaceHandle {
        self.handle.clone()
    }

    /// Declare a setting owned by this fragment
    pub fn setting(&mut self, spec: SettingSpec) -> Result<Setting, RegistryError> {
        let spec = SettingSpec {
            owner: self.owner.clone(),
            ..spec
        };
        self.registry.declare_setting(spec.clone())?;
        let declared = self.registry.setting(&spec.name).cloned().unwrap_or(spec);
        Ok(Setting::new(declared, self.settings.clone()))
    }

    /// Declare an on/off switch, on unless an admin turns it off
    pub fn toggle(&mut self, name: &str, description: &str) -> Result<Setting, RegistryError> {
        self.setting(
            SettingSpec::toggle(name)
                .with_description(description)
                .with_default("1"),
        )
    }

    /// Every setting value, for fragments that manage settings themselves
    pub fn settings(&self) -> Settings {
        self.settings.clone()
    }
}

/// Output of a successful build phase
pub struct LoadedFragments {
    pub registry: Arc<Registry>,
    pub handles: HashMap<String, NamespaceHandle>,
    /// Fragment names in load order
    pub order: Vec<String>,
}

pub struct FragmentLoader {
    prefix: String,
    store: Arc<PersistenceStore>,
}

impl FragmentLoader {
    pub fn new(prefix: impl Into<String>, store: Arc<PersistenceStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }

    /// Set up every fragment, validate shared namespaces and finalize the
    /// registry. The first error is returned and nothing is served.
    pub fn load(&self, fragments: &[Box<dyn Fragment>]) -> Result<LoadedFragments, BotError> {
        let mut registry = Registry::new();
        let mut handles: HashMap<String, NamespaceHandle> = HashMap::new();
        let mut order = Vec::new();
        let mut shares: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let settings = Settings::new(Arc::clone(&self.store))?;

        for fragment in fragments {
            let name = fragment.name().to_string();
            let namespace = Namespace::fragment(&name)
                .map_err(|e| BotError::fragment_load(&name, e))?;

            if handles.contains_key(&name) {
                let collision = CollisionError::new("namespace", &name, &name, &name);
                return Err(RegistryError::from(collision).into());
            }

            let handle = NamespaceHandle::new(Arc::clone(&self.store), namespace);
            let mut ctx = FragmentContext {
                registry: &mut registry,
                owner: name.clone(),
                prefix: &self.prefix,
                handle: handle.clone(),
                shares: Vec::new(),
                settings: settings.clone(),
            };

            fragment.setup(&mut ctx).map_err(|e| match e {
                BotError::Registry(_) | BotError::FragmentLoad { .. } => e,
                other => BotError::fragment_load(&name, other),
            })?;

            for shared in ctx.shares {
                shares.entry(shared).or_default().push(name.clone());
            }

            info!(fragment = %name, description = fragment.description(), "Loaded fragment");
            handles.insert(name.clone(), handle);
            order.push(name);
        }

        for (shared, declarers) in &shares {
            if handles.contains_key(shared) {
                return Err(RegistryError::from(CollisionError::new(
                    "shared namespace",
                    shared,
                    shared,
                    &declarers[0],
                ))
                .into());
            }
            if declarers.len() < 2 {
                return Err(BotError::fragment_load(
                    &declarers[0],
                    format!("shared namespace '{}' is not declared by any other fragment", shared),
                ));
            }
            info!(namespace = %shared, fragments = ?declarers, "Shared namespace agreed");
        }

        registry.finalize()?;

        Ok(LoadedFragments {
            registry: Arc::new(registry),
            handles,
            order,
        })
    }
}
