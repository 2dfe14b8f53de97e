//! Core identity types shared across the reload engine.

use std::fmt;
use std::num::NonZeroU64;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of a tracked module.
///
/// Modules registered by logical name keep that name as their identity even
/// after the name is resolved to a backing file; modules registered by raw
/// path use the canonicalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleRef {
    /// Logical module name, resolved through the host (e.g. `bot.plugins.mod`).
    Name(String),
    /// Raw filesystem path registered directly.
    Path(PathBuf),
}

impl ModuleRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Snowflake id of a guild, used when commands are declared per-guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(NonZeroU64);

impl GuildId {
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    pub fn value(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guild_id_creation() {
        assert!(GuildId::new(0).is_none());

        let id = GuildId::new(123456789).unwrap();
        assert_eq!(id.value(), 123456789);
    }

    #[test]
    fn test_module_ref_display() {
        let named = ModuleRef::name("bot.plugins.mod");
        assert_eq!(named.to_string(), "bot.plugins.mod");

        let pathed = ModuleRef::path("/plugins/mod.wasm");
        assert_eq!(pathed.to_string(), "/plugins/mod.wasm");
    }

    #[test]
    fn test_module_ref_equality_and_hash() {
        use std::collections::HashSet;

        let a = ModuleRef::name("plugins.a");
        let b = ModuleRef::name("plugins.a");
        let c = ModuleRef::path("plugins/a.wasm");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }
}
