use std::fmt;

/// Where a setting value applies. A channel value wins over the server-wide
/// one for events in that channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingScope {
    Server,
    Channel,
}

impl SettingScope {
    /// Lookup order for a read
    pub const FALLBACK: [SettingScope; 2] = [SettingScope::Channel, SettingScope::Server];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "server" => Some(SettingScope::Server),
            "channel" => Some(SettingScope::Channel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingScope::Server => "server",
            SettingScope::Channel => "channel",
        }
    }
}

impl fmt::Display for SettingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// On or off; stored as `1` / `0`
    Toggle,
    /// Free text
    Text,
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingKind::Toggle => f.write_str("toggle"),
            SettingKind::Text => f.write_str("text"),
        }
    }
}

/// A setting a fragment declares during setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingSpec {
    pub name: String,
    pub kind: SettingKind,
    pub description: Option<String>,
    /// Accepts channel values as well as server-wide ones
    pub per_channel: bool,
    /// Value used when no scope has one
    pub default: Option<String>,
    /// Declaring fragment; filled in by the loader
    pub owner: String,
}

impl SettingSpec {
    pub fn toggle(name: impl Into<String>) -> Self {
        Self::new(name, SettingKind::Toggle)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, SettingKind::Text)
    }

    fn new(name: impl Into<String>, kind: SettingKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            per_channel: false,
            default: None,
            owner: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn per_channel(mut self) -> Self {
        self.per_channel = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn supports(&self, scope: SettingScope) -> bool {
        scope == SettingScope::Server || self.per_channel
    }

    /// Check and canonicalise a user-supplied value
    pub fn normalize(&self, raw: &str) -> Result<String, String> {
        match self.kind {
            SettingKind::Toggle => truthy(raw).map(|on| if on { "1" } else { "0" }.to_string()),
            SettingKind::Text => Ok(raw.trim().to_string()),
        }
    }
}

/// Parse a yes/no style value: integers (non-zero is on), `true`/`yes`/`y`/`on`
/// and `false`/`no`/`n`/`off`, case-insensitively.
pub fn truthy(raw: &str) -> Result<bool, String> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n != 0);
    }
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "y" | "on" => Ok(true),
        "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(format!("Not a yes/no value: {:?}", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy() {
        assert_eq!(truthy("1"), Ok(true));
        assert_eq!(truthy("0"), Ok(false));
        assert_eq!(truthy("-3"), Ok(true));
        assert_eq!(truthy("Yes"), Ok(true));
        assert_eq!(truthy(" off "), Ok(false));
        assert!(truthy("maybe").is_err());
    }

    #[test]
    fn test_toggle_values_are_canonical() {
        let spec = SettingSpec::toggle("enable_poll");
        assert_eq!(spec.normalize("yes").unwrap(), "1");
        assert_eq!(spec.normalize("FALSE").unwrap(), "0");
        assert!(spec.normalize("sometimes").is_err());
        assert_eq!(SettingSpec::text("greeting").normalize("  hi  ").unwrap(), "hi");
    }

    #[test]
    fn test_server_only_by_default() {
        let spec = SettingSpec::toggle("enable_poll");
        assert!(spec.supports(SettingScope::Server));
        assert!(!spec.supports(SettingScope::Channel));
        assert!(spec.per_channel().supports(SettingScope::Channel));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(SettingScope::parse("Channel"), Some(SettingScope::Channel));
        assert_eq!(SettingScope::parse("server"), Some(SettingScope::Server));
        assert_eq!(SettingScope::parse("category"), None);
    }
}
