//! Lifecycle applier: confirmed change events become host calls.
//!
//! Load, reload, and unload are opaque host operations; the engine acts only
//! on their reported outcome. Transient failures are retried on the next
//! confirmed change, unload-side failures quarantine the module.

use crate::error::{LoadModuleError, ReloadModuleError, UnloadModuleError};
use crate::host::ReloaderHost;
use crate::types::ModuleRef;

/// What one lifecycle application did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The module's loaded state changed; command declaration may be due.
    Changed,
    /// Nothing took effect. Transient failures land here and are retried
    /// on the next confirmed change.
    Unchanged,
    /// Unrecoverable: the module must be quarantined.
    Dead,
}

/// Apply a confirmed modification: reload, falling back to a fresh load when
/// nothing is loaded yet.
pub async fn apply_change(host: &dyn ReloaderHost, id: &ModuleRef) -> ApplyOutcome {
    match host.reload_module(id).await {
        Ok(()) => {
            crate::log_event!("reload", "reloaded", "{id}");
            ApplyOutcome::Changed
        }
        Err(ReloadModuleError::NotLoaded) => load_fresh(host, id).await,
        Err(e) if e.is_permanent() => {
            tracing::error!("[reload] cannot replace {id}, quarantining: {e}");
            ApplyOutcome::Dead
        }
        Err(e) => {
            tracing::warn!("[reload] reload of {id} failed: {e}");
            ApplyOutcome::Unchanged
        }
    }
}

async fn load_fresh(host: &dyn ReloaderHost, id: &ModuleRef) -> ApplyOutcome {
    match host.load_module(id).await {
        Ok(()) => {
            crate::log_event!("reload", "loaded", "{id}");
            ApplyOutcome::Changed
        }
        Err(LoadModuleError::AlreadyLoaded) => {
            // Lost a race with the host; harmless
            crate::debug_event!("reload", "load conflict", "{id}");
            ApplyOutcome::Unchanged
        }
        Err(e) => {
            tracing::warn!("[reload] load of {id} failed: {e}");
            ApplyOutcome::Unchanged
        }
    }
}

/// Apply a removal: unload the module, if configured to.
///
/// Removals never count as "changed": commands are only redeclared when
/// something loads.
pub async fn apply_removal(
    host: &dyn ReloaderHost,
    id: &ModuleRef,
    unload_on_delete: bool,
) -> ApplyOutcome {
    if !unload_on_delete {
        crate::debug_event!("reload", "removed, keeping loaded", "{id}");
        return ApplyOutcome::Unchanged;
    }

    match host.unload_module(id).await {
        Ok(()) => {
            crate::log_event!("reload", "unloaded", "{id}");
            ApplyOutcome::Unchanged
        }
        Err(UnloadModuleError::NotLoaded) => {
            // Nothing was loaded; removal is a no-op
            crate::debug_event!("reload", "unload conflict", "{id}");
            ApplyOutcome::Unchanged
        }
        Err(e) => {
            tracing::error!("[reload] cannot unload removed {id}, quarantining: {e}");
            ApplyOutcome::Dead
        }
    }
}
