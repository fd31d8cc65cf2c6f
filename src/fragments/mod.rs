//! Built-in fragments
//!
//! Each fragment is self-contained: it only talks to the bot through the
//! [`FragmentContext`](crate::application::services::FragmentContext) it is
//! given during setup.

pub mod help;
pub mod karma;
pub mod poll;
pub mod roll;
pub mod settings;

use crate::application::errors::BotError;
use crate::domain::traits::Fragment;

pub use help::HelpFragment;
pub use karma::KarmaFragment;
pub use poll::PollFragment;
pub use roll::RollFragment;
pub use settings::SettingsFragment;

/// Names of every fragment that ships with the bot
pub const BUILTIN: &[&str] = &["help", "settings", "roll", "karma", "poll"];

/// Construct a built-in fragment by name
pub fn create(name: &str) -> Option<Box<dyn Fragment>> {
    match name {
        "help" => Some(Box::new(HelpFragment)),
        "settings" => Some(Box::new(SettingsFragment)),
        "roll" => Some(Box::new(RollFragment::default())),
        "karma" => Some(Box::new(KarmaFragment)),
        "poll" => Some(Box::new(PollFragment)),
        _ => None,
    }
}

/// Resolve configured names, keeping their order
pub fn resolve(names: &[String]) -> Result<Vec<Box<dyn Fragment>>, BotError> {
    names
        .iter()
        .map(|name| create(name).ok_or_else(|| BotError::fragment_load(name, "unknown fragment")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_resolves() {
        let names: Vec<String> = BUILTIN.iter().map(|s| s.to_string()).collect();
        let fragments = resolve(&names).unwrap();
        let resolved: Vec<&str> = fragments.iter().map(|f| f.name()).collect();
        assert_eq!(resolved, BUILTIN);
    }

    #[test]
    fn test_unknown_fragment_fails() {
        let err = resolve(&["roll".to_string(), "weather".to_string()]).err().unwrap();
        match err {
            BotError::FragmentLoad { fragment, .. } => assert_eq!(fragment, "weather"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
