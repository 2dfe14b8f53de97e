//! Host capability interface.
//!
//! The engine never interprets loaded code: everything it needs from the
//! surrounding application is declared here and invoked by reported outcome.
//! Hosts implement [`ReloaderHost`]; the optional [`ReloadObserver`] surfaces
//! failures the engine otherwise only logs.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::commands::{CommandBuilder, DeclareScope};
use crate::error::{
    DeclareError, LoadModuleError, ReloadModuleError, ResolveError, UnloadModuleError,
};
use crate::types::ModuleRef;

/// Capabilities the host application provides to the reload engine.
#[async_trait]
pub trait ReloaderHost: Send + Sync {
    /// Map a logical module name to the file backing it.
    ///
    /// Called eagerly at registration time so unmappable names fail fast.
    fn resolve_module_path(&self, name: &str) -> Result<PathBuf, ResolveError>;

    /// Tear down the loaded version of a module and load the current one.
    ///
    /// A [`ReloadModuleError::NotLoaded`] conflict means nothing was loaded
    /// yet; the engine falls back to [`ReloaderHost::load_module`].
    async fn reload_module(&self, module: &ModuleRef) -> Result<(), ReloadModuleError>;

    /// Load a module that is not currently loaded.
    async fn load_module(&self, module: &ModuleRef) -> Result<(), LoadModuleError>;

    /// Unload a module, removing whatever it contributed to the host.
    async fn unload_module(&self, module: &ModuleRef) -> Result<(), UnloadModuleError>;

    /// Commands currently registered in the host, in host order.
    fn global_commands(&self) -> Vec<CommandBuilder>;

    /// Push a full command set to the remote registry.
    ///
    /// The declaration task is the only call site, and it spaces calls by
    /// the configured redeclare delay.
    async fn declare_commands(
        &self,
        commands: Vec<CommandBuilder>,
        scope: DeclareScope,
    ) -> Result<(), DeclareError>;
}

/// Hooks for failures the engine handles internally.
///
/// Declaration failures are swallowed fail-open and dead modules are only
/// logged; implement this to raise them to the operator instead.
pub trait ReloadObserver: Send + Sync {
    /// A module was quarantined after an unrecoverable unload failure.
    fn on_module_dead(&self, _module: &ModuleRef) {}

    /// A declaration attempt failed and the engine moved on fail-open.
    /// Not called for rate limits, which are retried.
    fn on_declare_failed(&self, _error: &DeclareError) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReloadObserver;

impl ReloadObserver for NoopReloadObserver {}
