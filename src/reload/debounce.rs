//! Debounce arbiter for raw modification signals.
//!
//! A modification only counts once the same mtime has been observed on two
//! consecutive scans. Partial writes keep moving the mtime, so their window
//! keeps resetting until the writer settles.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::types::ModuleRef;

/// Pending-change table keyed by module identity.
#[derive(Debug, Default)]
pub struct DebounceArbiter {
    /// Tentative mtimes seen on the previous scan, awaiting confirmation.
    pending: HashMap<ModuleRef, SystemTime>,
}

impl DebounceArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observation for an identity.
    ///
    /// Returns the confirmed mtime when the value has held stable across two
    /// consecutive scans. `committed` is the last value committed for this
    /// identity; `None` marks a unit whose baseline is still unknown, so its
    /// first reading always opens a window.
    pub fn observe(
        &mut self,
        id: &ModuleRef,
        current: SystemTime,
        committed: Option<SystemTime>,
    ) -> Option<SystemTime> {
        match self.pending.get(id) {
            Some(pending) if *pending == current => {
                self.pending.remove(id);
                Some(current)
            }
            Some(_) => {
                // Still moving: restart the window at the newest value
                self.pending.insert(id.clone(), current);
                None
            }
            None => {
                if committed != Some(current) {
                    self.pending.insert(id.clone(), current);
                }
                None
            }
        }
    }

    /// Drop any open window for an identity (used on removal or quarantine).
    pub fn clear(&mut self, id: &ModuleRef) {
        self.pending.remove(id);
    }

    /// Whether an identity currently has an open window.
    pub fn has_pending(&self, id: &ModuleRef) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
