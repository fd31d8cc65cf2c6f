//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::errors::ConfigError;
use crate::application::messaging::DispatcherConfig;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    /// Fragments to load, in load order
    pub fragments: Vec<String>,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fragbot.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DispatcherSettings {
    pub workers: usize,
    pub shutdown_timeout_secs: u64,
    pub failure_reply: Option<String>,
    pub ignore_bots: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: 16,
            shutdown_timeout_secs: 10,
            failure_reply: Some("Something went wrong running that command.".to_string()),
            ignore_bots: true,
        }
    }
}

impl DispatcherSettings {
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.workers,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            failure_reply: self.failure_reply.clone(),
            ignore_bots: self.ignore_bots,
            ..DispatcherConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptersConfig {
    pub console: Option<ConsoleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "fragbot".to_string(),
                prefix: "!".to_string(),
            },
            storage: StorageConfig::default(),
            dispatcher: DispatcherSettings::default(),
            fragments: vec![
                "help".to_string(),
                "settings".to_string(),
                "roll".to_string(),
                "karma".to_string(),
                "poll".to_string(),
            ],
            adapters: AdaptersConfig {
                console: Some(ConsoleConfig { enabled: true }),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }

        if let Ok(path) = std::env::var("FRAGBOT_DB") {
            config.storage.path = PathBuf::from(path);
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.prefix".to_string()));
        }
        if self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(format!(
                "bot.prefix may not contain whitespace: {:?}",
                self.bot.prefix
            )));
        }
        if self.dispatcher.workers == 0 {
            return Err(ConfigError::InvalidValue(
                "dispatcher.workers must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.fragments {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::InvalidValue(format!("fragment '{}' listed twice", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_yaml() {
        let yaml = Config::default().to_yaml().unwrap();
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.fragments, vec!["help", "settings", "roll", "karma", "poll"]);
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let config = Config::from_yaml(
            "bot:\n  name: test\n  prefix: \"?\"\nfragments: [roll]\n",
        )
        .unwrap();
        assert_eq!(config.dispatcher.workers, 16);
        assert_eq!(config.storage.path, PathBuf::from("fragbot.db"));
        assert_eq!(
            config.dispatcher.to_dispatcher_config().shutdown_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_rejects_duplicate_fragments() {
        let yaml = "bot:\n  name: t\n  prefix: \"!\"\nfragments: [roll, roll]\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = Config::default();
        config.dispatcher.workers = 0;
        assert!(config.validate().is_err());
    }
}
