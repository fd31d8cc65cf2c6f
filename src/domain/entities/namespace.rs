use crate::application::errors::RegistryError;
use std::fmt;

/// Partition of the persistence store owned by one fragment, shared by an
/// explicit agreement between several, or kept by the base layer itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Fragment(String),
    Shared(String),
    System(String),
}

impl Namespace {
    pub fn fragment(name: &str) -> Result<Self, RegistryError> {
        validate(name).map(|n| Namespace::Fragment(n.to_string()))
    }

    pub fn shared(name: &str) -> Result<Self, RegistryError> {
        validate(name).map(|n| Namespace::Shared(n.to_string()))
    }

    /// Base layer state such as settings; never handed to a fragment directly
    pub(crate) fn system(name: &str) -> Result<Self, RegistryError> {
        validate(name).map(|n| Namespace::System(n.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            Namespace::Fragment(n) | Namespace::Shared(n) | Namespace::System(n) => n,
        }
    }

    /// Physical prefix used by storage backends; the three kinds never
    /// overlap each other.
    pub fn storage_key(&self) -> String {
        match self {
            Namespace::Fragment(n) => n.clone(),
            Namespace::Shared(n) => format!("@{}", n),
            Namespace::System(n) => format!("#{}", n),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

fn validate(name: &str) -> Result<&str, RegistryError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if ok {
        Ok(name)
    } else {
        Err(RegistryError::InvalidNamespace(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_and_fragment_namespaces_never_alias() {
        let own = Namespace::fragment("karma").unwrap();
        let shared = Namespace::shared("karma").unwrap();
        assert_ne!(own.storage_key(), shared.storage_key());
        let system = Namespace::system("karma").unwrap();
        assert_ne!(own.storage_key(), system.storage_key());
        assert_ne!(shared.storage_key(), system.storage_key());
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(Namespace::fragment("").is_err());
        assert!(Namespace::fragment("Karma").is_err());
        assert!(Namespace::shared("a/b").is_err());
        assert!(Namespace::fragment("poll_v2").is_ok());
    }
}
