//! Registry - routing table from triggers to fragment handlers
//!
//! Two phases: while `Building`, fragments add entries and collisions are
//! reported immediately. `finalize()` re-checks the whole table and switches
//! to `Serving`, after which the table never changes and can be read from
//! any task without locking.
//!
//! The registry also keeps the catalog of settings fragments declare, so the
//! same build-phase rules apply to setting names.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::application::errors::{CollisionError, LifecycleError, RegistryError};
use crate::domain::entities::registration::normalize;
use crate::domain::entities::{EventKind, RegistrationEntry, SettingSpec, Trigger, TriggerKind};
use crate::domain::traits::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Building,
    Serving,
}

/// A command entry that matched some message text
#[derive(Debug)]
pub struct CommandMatch<'a> {
    pub entry: &'a RegistrationEntry,
    /// Number of words the trigger consumed
    pub words: usize,
}

pub struct Registry {
    state: RegistryState,
    entries: Vec<RegistrationEntry>,
    index: HashMap<(TriggerKind, String), usize>,
    listeners: BTreeMap<EventKind, Vec<usize>>,
    settings: BTreeMap<String, SettingSpec>,
    max_command_words: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: RegistryState::Building,
            entries: Vec::new(),
            index: HashMap::new(),
            listeners: BTreeMap::new(),
            settings: BTreeMap::new(),
            max_command_words: 0,
        }
    }

    pub fn state(&self) -> RegistryState {
        self.state
    }

    /// Record a handler for `(kind, trigger)` on behalf of `owner`
    pub fn register(
        &mut self,
        kind: TriggerKind,
        trigger: Trigger,
        owner: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        self.register_entry(RegistrationEntry::new(kind, trigger, owner, handler))
    }

    pub fn register_entry(&mut self, entry: RegistrationEntry) -> Result<(), RegistryError> {
        if self.state == RegistryState::Serving {
            return Err(LifecycleError(format!(
                "register {} '{}' for '{}'",
                entry.kind, entry.trigger, entry.owner
            ))
            .into());
        }

        let normalized = entry.trigger.normalized();
        if normalized.is_empty() {
            return Err(RegistryError::InvalidTrigger(entry.trigger.text().to_string()));
        }

        let key = (entry.kind.clone(), normalized);
        if let Some(&existing) = self.index.get(&key) {
            let existing = &self.entries[existing];
            return Err(CollisionError::new(
                entry.kind.to_string(),
                key.1,
                existing.owner.clone(),
                entry.owner.clone(),
            )
            .into());
        }

        tracing::debug!(
            kind = %entry.kind,
            trigger = %entry.trigger,
            owner = %entry.owner,
            "Registered handler"
        );

        let idx = self.entries.len();
        if let TriggerKind::Event(event_kind) = &entry.kind {
            self.listeners.entry(event_kind.clone()).or_default().push(idx);
        }
        self.index.insert(key, idx);
        self.entries.push(entry);
        Ok(())
    }

    /// Add a setting to the catalog. Names are global; a second declaration
    /// of the same name is a collision whoever makes it.
    pub fn declare_setting(&mut self, spec: SettingSpec) -> Result<(), RegistryError> {
        if self.state == RegistryState::Serving {
            return Err(LifecycleError(format!("declare setting '{}'", spec.name)).into());
        }
        let name = normalize(&spec.name);
        if name.is_empty() || name.contains(' ') {
            return Err(RegistryError::InvalidTrigger(spec.name.clone()));
        }
        if let Some(existing) = self.settings.get(&name) {
            return Err(
                CollisionError::new("setting", name, existing.owner.clone(), spec.owner).into(),
            );
        }

        tracing::debug!(setting = %name, owner = %spec.owner, "Declared setting");
        self.settings.insert(name.clone(), SettingSpec { name, ..spec });
        Ok(())
    }

    /// Declared settings, by name
    pub fn settings(&self) -> impl Iterator<Item = &SettingSpec> {
        self.settings.values()
    }

    pub fn setting(&self, name: &str) -> Option<&SettingSpec> {
        self.settings.get(&normalize(name))
    }

    /// Leave the build phase. Rebuilds the index from scratch so the result
    /// does not depend on the order fragments registered in.
    pub fn finalize(&mut self) -> Result<(), RegistryError> {
        if self.state == RegistryState::Serving {
            return Err(LifecycleError("finalize twice".to_string()).into());
        }

        let mut index: HashMap<(TriggerKind, String), usize> = HashMap::new();
        let mut collisions = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if let Some(&prev) = index.get(&entry.key()) {
                collisions.push(CollisionError::new(
                    entry.kind.to_string(),
                    entry.trigger.normalized(),
                    self.entries[prev].owner.clone(),
                    entry.owner.clone(),
                ));
            } else {
                index.insert(entry.key(), idx);
            }
        }
        collisions.sort_by(|a, b| {
            (&a.kind, &a.trigger, &a.owners).cmp(&(&b.kind, &b.trigger, &b.owners))
        });
        if let Some(first) = collisions.into_iter().next() {
            return Err(first.into());
        }

        self.max_command_words = self
            .commands()
            .map(|e| e.trigger.word_count())
            .max()
            .unwrap_or(0);
        self.index = index;
        self.state = RegistryState::Serving;

        tracing::info!(
            commands = self.commands().count(),
            listeners = self.listeners.values().map(Vec::len).sum::<usize>(),
            settings = self.settings.len(),
            "Registry finalized"
        );
        Ok(())
    }

    /// Find the entry for `candidate`.
    ///
    /// Commands match on the longest run of leading words equal to a
    /// trigger; exact triggers also need the whole text to match. Listeners
    /// match their name exactly.
    pub fn lookup(&self, kind: &TriggerKind, candidate: &str) -> Option<CommandMatch<'_>> {
        if let TriggerKind::Event(_) = kind {
            let idx = self.index.get(&(kind.clone(), normalize(candidate)))?;
            return Some(CommandMatch {
                entry: &self.entries[*idx],
                words: 0,
            });
        }

        let words: Vec<String> = candidate.split_whitespace().map(|w| w.to_lowercase()).collect();
        let longest = self.max_trigger_words().min(words.len());
        for n in (1..=longest).rev() {
            let key = (TriggerKind::Command, words[..n].join(" "));
            if let Some(&idx) = self.index.get(&key) {
                let entry = &self.entries[idx];
                if entry.trigger.is_exact() && n != words.len() {
                    continue;
                }
                return Some(CommandMatch { entry, words: n });
            }
        }
        None
    }

    /// Listeners for an event kind, in registration order
    pub fn listeners<'a>(
        &'a self,
        kind: &EventKind,
    ) -> impl Iterator<Item = &'a RegistrationEntry> + 'a {
        self.listeners
            .get(kind)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.entries[idx])
    }

    pub fn commands(&self) -> impl Iterator<Item = &RegistrationEntry> {
        self.entries.iter().filter(|e| e.kind == TriggerKind::Command)
    }

    /// Find a command by trigger text, with or without its prefix
    pub fn command(&self, name: &str) -> Option<&RegistrationEntry> {
        let wanted = normalize(name);
        self.commands().find(|e| {
            let trigger = e.trigger.normalized();
            trigger == wanted
                || trigger
                    .strip_prefix(|c: char| !c.is_alphanumeric())
                    .is_some_and(|t| t == wanted)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn max_trigger_words(&self) -> usize {
        match self.state {
            RegistryState::Serving => self.max_command_words,
            RegistryState::Building => {
                self.commands().map(|e| e.trigger.word_count()).max().unwrap_or(0)
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::HandlerResult;
    use crate::application::messaging::Invocation;

    fn noop() -> Arc<dyn Handler> {
        Arc::new(|_inv: Invocation| async { HandlerResult::Ok(()) })
    }

    fn prefix(text: &str) -> Trigger {
        Trigger::Prefix(text.to_string())
    }

    #[test]
    fn test_collision_names_both_owners() {
        let mut registry = Registry::new();
        registry.register(TriggerKind::Command, prefix("!roll"), "dice", noop()).unwrap();
        let err = registry
            .register(TriggerKind::Command, prefix("!roll"), "roll", noop())
            .unwrap_err();

        match err {
            RegistryError::Collision(c) => {
                assert_eq!(c.trigger, "!roll");
                assert!(c.involves("dice") && c.involves("roll"));
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn test_collision_ignores_case_and_exactness() {
        let mut registry = Registry::new();
        registry
            .register(TriggerKind::Command, Trigger::Exact("!Ping".into()), "a", noop())
            .unwrap();
        let err = registry.register(TriggerKind::Command, prefix("!ping"), "b", noop());
        assert!(matches!(err, Err(RegistryError::Collision(_))));
    }

    #[test]
    fn test_same_owner_reregistration_rejected() {
        let mut registry = Registry::new();
        registry.register(TriggerKind::Command, prefix("!poll"), "poll", noop()).unwrap();
        let err = registry
            .register(TriggerKind::Command, prefix("!poll"), "poll", noop())
            .unwrap_err();
        match err {
            RegistryError::Collision(c) => assert_eq!(c.owners, ["poll", "poll"]),
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn test_same_trigger_different_kinds_do_not_collide() {
        let mut registry = Registry::new();
        registry.register(TriggerKind::Command, prefix("vote"), "a", noop()).unwrap();
        registry
            .register(TriggerKind::Event(EventKind::ReactionAdd), prefix("vote"), "b", noop())
            .unwrap();
        registry
            .register(TriggerKind::Event(EventKind::ReactionRemove), prefix("vote"), "c", noop())
            .unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_after_finalize_is_lifecycle_error() {
        let mut registry = Registry::new();
        registry.finalize().unwrap();
        assert_eq!(registry.state(), RegistryState::Serving);

        let err = registry.register(TriggerKind::Command, prefix("!late"), "late", noop());
        assert!(matches!(err, Err(RegistryError::Lifecycle(_))));
        assert!(matches!(registry.finalize(), Err(RegistryError::Lifecycle(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_trigger_rejected() {
        let mut registry = Registry::new();
        let err = registry.register(TriggerKind::Command, prefix("   "), "a", noop());
        assert!(matches!(err, Err(RegistryError::InvalidTrigger(_))));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut registry = Registry::new();
        registry.register(TriggerKind::Command, prefix("!karma"), "karma", noop()).unwrap();
        registry.register(TriggerKind::Command, prefix("!karma give"), "karma", noop()).unwrap();
        registry.finalize().unwrap();

        let m = registry.lookup(&TriggerKind::Command, "!karma give alice").unwrap();
        assert_eq!(m.entry.trigger.text(), "!karma give");
        assert_eq!(m.words, 2);

        let m = registry.lookup(&TriggerKind::Command, "!KARMA alice").unwrap();
        assert_eq!(m.entry.trigger.text(), "!karma");
        assert_eq!(m.words, 1);

        // whole words only
        assert!(registry.lookup(&TriggerKind::Command, "!karmagive").is_none());
    }

    #[test]
    fn test_exact_trigger_needs_whole_text() {
        let mut registry = Registry::new();
        registry
            .register(TriggerKind::Command, Trigger::Exact("good bot".into()), "misc", noop())
            .unwrap();
        registry.finalize().unwrap();

        assert!(registry.lookup(&TriggerKind::Command, "Good  Bot").is_some());
        assert!(registry.lookup(&TriggerKind::Command, "good bot indeed").is_none());
        assert!(registry.lookup(&TriggerKind::Command, "hello there").is_none());
    }

    #[test]
    fn test_listeners_in_registration_order() {
        let mut registry = Registry::new();
        let kind = TriggerKind::Event(EventKind::Message);
        registry.register(kind.clone(), prefix("inline_roll"), "roll", noop()).unwrap();
        registry.register(kind.clone(), prefix("dad"), "dad", noop()).unwrap();
        registry.finalize().unwrap();

        let owners: Vec<_> = registry
            .listeners(&EventKind::Message)
            .map(|e| e.owner.as_str())
            .collect();
        assert_eq!(owners, vec!["roll", "dad"]);
        assert_eq!(registry.listeners(&EventKind::MemberJoin).count(), 0);
        assert_eq!(registry.lookup(&kind, "DAD").unwrap().entry.owner, "dad");
    }

    #[test]
    fn test_command_lookup_by_bare_name() {
        let mut registry = Registry::new();
        registry.register(TriggerKind::Command, prefix("!roll"), "roll", noop()).unwrap();
        registry.finalize().unwrap();
        assert!(registry.command("roll").is_some());
        assert!(registry.command("!roll").is_some());
        assert!(registry.command("poll").is_none());
    }

    fn owned(spec: SettingSpec, owner: &str) -> SettingSpec {
        SettingSpec {
            owner: owner.to_string(),
            ..spec
        }
    }

    #[test]
    fn test_setting_names_collide_across_fragments() {
        let mut registry = Registry::new();
        registry
            .declare_setting(owned(SettingSpec::toggle("Enable_Poll"), "poll"))
            .unwrap();
        let err = registry
            .declare_setting(owned(SettingSpec::text("enable_poll"), "vote"))
            .unwrap_err();
        match err {
            RegistryError::Collision(c) => {
                assert_eq!(c.kind, "setting");
                assert!(c.involves("poll") && c.involves("vote"));
            }
            other => panic!("expected collision, got {other:?}"),
        }

        assert!(registry.setting("ENABLE_POLL").is_some());
        assert!(registry.declare_setting(owned(SettingSpec::toggle("two words"), "x")).is_err());

        registry.finalize().unwrap();
        let late = registry.declare_setting(owned(SettingSpec::toggle("late"), "x"));
        assert!(matches!(late, Err(RegistryError::Lifecycle(_))));
        assert_eq!(registry.settings().count(), 1);
    }
}
