//! Error types for the reload engine and its host interface.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from registering modules, paths, or directories.
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Cannot resolve module '{name}': {reason}")]
    Resolution { name: String, reason: String },

    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Registration task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Errors from reloader lifecycle control.
#[derive(Error, Debug)]
pub enum ReloaderError {
    #[error("Hot reloader is already running")]
    AlreadyRunning,

    #[error("Hot reloader is not running")]
    NotRunning,

    #[error("Scan worker failed: {reason}")]
    ScanFailed { reason: String },
}

/// Why the host could not map a logical module name to a file.
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct ResolveError {
    pub reason: String,
}

impl ResolveError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of a host `reload_module` call.
#[derive(Error, Debug)]
pub enum ReloadModuleError {
    /// State conflict: nothing is loaded for this module yet. The engine
    /// falls back to a fresh load.
    #[error("Module is not loaded")]
    NotLoaded,

    #[error("Failed to load module: {reason}")]
    LoadFailed { reason: String },

    #[error("Module has no entry points to load")]
    MissingLoaders,

    #[error("Failed to unload previous version: {reason}")]
    UnloadFailed { reason: String },

    #[error("Module has no entry points to unload")]
    MissingUnloaders,
}

impl ReloadModuleError {
    /// Whether this failure poisons the module: its unload side is broken,
    /// so retrying can only duplicate loaded state.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::UnloadFailed { .. } | Self::MissingUnloaders)
    }
}

/// Outcome of a host `load_module` call.
#[derive(Error, Debug)]
pub enum LoadModuleError {
    /// State conflict: the module is already loaded.
    #[error("Module is already loaded")]
    AlreadyLoaded,

    #[error("Failed to load module: {reason}")]
    LoadFailed { reason: String },

    #[error("Module has no entry points to load")]
    MissingLoaders,
}

/// Outcome of a host `unload_module` call.
#[derive(Error, Debug)]
pub enum UnloadModuleError {
    /// State conflict: nothing is loaded for this module.
    #[error("Module is not loaded")]
    NotLoaded,

    #[error("Failed to unload module: {reason}")]
    UnloadFailed { reason: String },

    #[error("Module has no entry points to unload")]
    MissingUnloaders,
}

/// Outcome of a host `declare_commands` call.
#[derive(Error, Debug)]
pub enum DeclareError {
    #[error("Rate limited by the commands API")]
    RateLimited,

    #[error("Failed to declare commands: {reason}")]
    Failed { reason: String },
}
