//! Command snapshot model used for declaration syncing.
//!
//! The engine never builds commands itself: the host reports what is
//! currently registered as a list of [`CommandBuilder`] values, and the
//! declaration scheduler diffs snapshots of that list structurally to decide
//! whether the remote registry needs an update.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::GuildId;

/// Top-level command flavor, as understood by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Slash,
    User,
    Message,
}

/// One option of a slash command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Immutable description of one declarable command.
///
/// Equality is structural; two builders with the same content compare equal
/// regardless of how they were constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBuilder {
    pub kind: CommandKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<u64>,
    #[serde(default = "default_dm_enabled")]
    pub dm_enabled: bool,
}

fn default_dm_enabled() -> bool {
    true
}

impl CommandBuilder {
    /// Create a slash command with a description.
    pub fn slash(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Slash,
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            default_member_permissions: None,
            dm_enabled: true,
        }
    }

    /// Create a user context-menu command. These carry no description.
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::User,
            name: name.into(),
            description: String::new(),
            options: Vec::new(),
            default_member_permissions: None,
            dm_enabled: true,
        }
    }

    /// Create a message context-menu command. These carry no description.
    pub fn message(name: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Message,
            name: name.into(),
            description: String::new(),
            options: Vec::new(),
            default_member_permissions: None,
            dm_enabled: true,
        }
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_default_member_permissions(mut self, permissions: u64) -> Self {
        self.default_member_permissions = Some(permissions);
        self
    }

    pub fn with_dm_enabled(mut self, enabled: bool) -> Self {
        self.dm_enabled = enabled;
        self
    }
}

/// Commands are keyed by kind and name: the platform allows a slash command
/// and a context-menu command to share a name.
pub type CommandKey = (CommandKind, String);

/// Snapshot of declarable commands, keyed for structural comparison.
///
/// `IndexMap` equality ignores insertion order, so two snapshots taken from
/// hosts that enumerate commands differently still compare equal when their
/// content matches.
pub type BuilderMap = IndexMap<CommandKey, CommandBuilder>;

/// Key a list of builders reported by the host.
///
/// Later entries win on key collision, matching how the platform treats
/// duplicate declarations in one payload.
pub fn snapshot(builders: Vec<CommandBuilder>) -> BuilderMap {
    builders
        .into_iter()
        .map(|builder| ((builder.kind, builder.name.clone()), builder))
        .collect()
}

/// Where commands are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclareScope {
    /// Application-wide commands, visible everywhere.
    Global,
    /// Commands scoped to one guild. Guild declarations propagate
    /// immediately, which makes this the usual development setting.
    Guild(GuildId),
}

impl std::fmt::Display for DeclareScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Guild(id) => write!(f, "guild {id}"),
        }
    }
}
