//! Configuration for the reload engine.
//!
//! Settings are layered from three sources:
//! - Default values
//! - TOML configuration file (`.rekindle/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `REKINDLE_` and use double
//! underscores to separate nested levels:
//! - `REKINDLE_RELOAD__SCAN_INTERVAL_MS=250` sets `reload.scan_interval_ms`
//! - `REKINDLE_RELOAD__UNLOAD_ON_DELETE=false` sets `reload.unload_on_delete`
//! - `REKINDLE_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Reload engine configuration
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReloadConfig {
    /// Poll interval of the scan loop, in milliseconds
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// How long to wait after a change before redeclaring commands, in
    /// seconds. Zero disables command declaration entirely.
    #[serde(default = "default_redeclare_after_secs")]
    pub redeclare_after_secs: u64,

    /// Declare commands to this guild instead of globally. Guild commands
    /// propagate immediately, so this is the usual development setting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_guild: Option<u64>,

    /// Unload modules whose backing file disappears
    #[serde(default = "default_true")]
    pub unload_on_delete: bool,

    /// File extension that marks a directory entry as a module
    #[serde(default = "default_module_extension")]
    pub module_extension: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module log level overrides, e.g. `rekindle::reload = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_scan_interval_ms() -> u64 {
    500
}
fn default_redeclare_after_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_module_extension() -> String {
    "wasm".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            redeclare_after_secs: default_redeclare_after_secs(),
            commands_guild: None,
            unload_on_delete: true,
            module_extension: default_module_extension(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl ReloadConfig {
    /// Scan interval as a [`Duration`].
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Redeclare delay, or `None` when declaration is disabled.
    pub fn redeclare_delay(&self) -> Option<Duration> {
        (self.redeclare_after_secs > 0).then(|| Duration::from_secs(self.redeclare_after_secs))
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for a .rekindle directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".rekindle/settings.toml"));

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Layer in environment variables with REKINDLE_ prefix.
            // Double underscore (__) separates nested levels; single
            // underscore (_) remains as is within field names.
            .merge(Env::prefixed("REKINDLE_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the workspace config by looking for a .rekindle directory,
    /// searching from the current directory up to the filesystem root.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".rekindle");
            if config_dir.exists() && config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("REKINDLE_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.reload.scan_interval_ms, 500);
        assert_eq!(settings.reload.redeclare_after_secs, 10);
        assert!(settings.reload.unload_on_delete);
        assert_eq!(settings.reload.module_extension, "wasm");
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_interval_accessors() {
        let mut config = ReloadConfig::default();
        assert_eq!(config.scan_interval(), Duration::from_millis(500));
        assert_eq!(config.redeclare_delay(), Some(Duration::from_secs(10)));

        config.redeclare_after_secs = 0;
        assert_eq!(config.redeclare_delay(), None);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[reload]
scan_interval_ms = 250
redeclare_after_secs = 0
commands_guild = 123456789
module_extension = "so"

[logging]
default = "info"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.reload.scan_interval_ms, 250);
        assert_eq!(settings.reload.redeclare_after_secs, 0);
        assert_eq!(settings.reload.commands_guild, Some(123456789));
        assert_eq!(settings.reload.module_extension, "so");
        assert_eq!(settings.logging.default, "info");
        // Unspecified fields keep their defaults
        assert!(settings.reload.unload_on_delete);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.reload.scan_interval_ms = 100;
        settings.reload.commands_guild = Some(42);

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.reload.scan_interval_ms, 100);
        assert_eq!(loaded.reload.commands_guild, Some(42));
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        // Only specify a single setting
        let toml_content = r#"
[logging]
default = "debug"

[logging.modules]
"rekindle::reload" = "trace"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified values
        assert_eq!(settings.logging.default, "debug");
        assert_eq!(
            settings.logging.modules.get("rekindle::reload"),
            Some(&"trace".to_string())
        );

        // Default values should still be present
        assert_eq!(settings.reload.scan_interval_ms, 500);
        assert_eq!(settings.reload.redeclare_after_secs, 10);
    }
}
