//! Per-tick filesystem scanning.
//!
//! A scan runs in three phases:
//! 1. Snapshot what to look at (cheap, under the state lock)
//! 2. Hit the filesystem (blocking, on a worker thread)
//! 3. Fold raw readings into confirmed change events (under the state lock)
//!
//! Directory listings drive membership deltas and member observations;
//! standalone modules are checked with a per-file stat.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use super::debounce::DebounceArbiter;
use super::registry::{ModuleOrigin, PathRegistry};
use crate::types::ModuleRef;

/// A confirmed change produced by a scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The backing file settled at a new modification time.
    Modified(ModuleRef),
    /// The backing file disappeared. Emitted without debouncing.
    Removed(ModuleRef),
}

/// One file listed in a watched directory.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub id: ModuleRef,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Result of statting one standalone module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitReading {
    /// File exists with this modification time.
    Present(SystemTime),
    /// File does not exist.
    Missing,
    /// Stat failed for another reason; no signal this scan.
    Unreadable,
}

/// Result of listing one watched directory.
#[derive(Debug)]
pub enum DirReading {
    /// Directory exists; these are its module files.
    Listed(Vec<MemberInfo>),
    /// Directory does not exist. Every known member counts as removed.
    Missing,
    /// Listing failed for another reason; no signal this scan.
    Unreadable,
}

/// Raw filesystem readings for one scan.
#[derive(Debug)]
pub struct RawScan {
    pub units: Vec<(ModuleRef, UnitReading)>,
    pub dirs: Vec<(PathBuf, DirReading)>,
}

/// Snapshot of what one scan has to look at.
#[derive(Debug)]
pub struct ScanJob {
    units: Vec<(ModuleRef, PathBuf)>,
    dirs: Vec<(PathBuf, Option<String>)>,
    extension: String,
}

impl ScanJob {
    /// Capture the current scan surface. Cheap; called under the state lock.
    pub fn snapshot(registry: &PathRegistry, extension: &str) -> Self {
        Self {
            units: registry.standalone_units(),
            dirs: registry.watched_dirs(),
            extension: extension.to_string(),
        }
    }

    /// Read the filesystem. Blocking; run this on a worker thread.
    pub fn run(self) -> RawScan {
        let dirs = self
            .dirs
            .iter()
            .map(|(path, namespace)| {
                (
                    path.clone(),
                    read_members(path, namespace.as_deref(), &self.extension),
                )
            })
            .collect();

        let units = self
            .units
            .into_iter()
            .map(|(id, path)| {
                let reading = stat_unit(&path);
                (id, reading)
            })
            .collect();

        RawScan { units, dirs }
    }
}

/// List the module files of a directory.
///
/// Dotfiles, subdirectories, and files with other extensions are skipped.
/// Used for registration baselines; an unlistable directory yields an
/// empty baseline.
pub fn list_members(dir: &Path, namespace: Option<&str>, extension: &str) -> Vec<MemberInfo> {
    match read_members(dir, namespace, extension) {
        DirReading::Listed(members) => members,
        DirReading::Missing | DirReading::Unreadable => Vec::new(),
    }
}

/// Read one watched directory. Only a missing directory is a removal
/// signal; any other listing failure yields no signal this scan.
fn read_members(dir: &Path, namespace: Option<&str>, extension: &str) -> DirReading {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return DirReading::Missing,
        Err(e) => {
            warn!("[scan] cannot list {}: {e}", dir.display());
            return DirReading::Unreadable;
        }
    };

    let mut members = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let id = match namespace {
            Some(ns) => ModuleRef::name(format!("{ns}.{stem}")),
            None => ModuleRef::path(path.clone()),
        };
        members.push(MemberInfo { id, path, modified });
    }

    DirReading::Listed(members)
}

fn stat_unit(path: &Path) -> UnitReading {
    match fs::metadata(path) {
        Ok(meta) => match meta.modified() {
            Ok(modified) => UnitReading::Present(modified),
            Err(e) => {
                warn!("[scan] cannot read mtime of {}: {e}", path.display());
                UnitReading::Unreadable
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => UnitReading::Missing,
        Err(e) => {
            warn!("[scan] cannot stat {}: {e}", path.display());
            UnitReading::Unreadable
        }
    }
}

/// Fold raw readings into confirmed change events.
///
/// Mutates the registry (membership, baselines) and the arbiter (pending
/// windows). Called under the state lock; touches no filesystem.
pub fn fold_scan(
    raw: RawScan,
    registry: &mut PathRegistry,
    arbiter: &mut DebounceArbiter,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut observations: Vec<(ModuleRef, SystemTime)> = Vec::new();
    // Each identity contributes at most one observation per scan
    let mut observed: HashSet<ModuleRef> = HashSet::new();

    // Directory passes: membership deltas plus member observations
    for (dir_path, reading) in raw.dirs {
        let Some(dir) = registry.directory(&dir_path) else {
            continue;
        };
        let listing = match reading {
            DirReading::Listed(members) => members,
            // A vanished directory reads as empty: every member is removed
            DirReading::Missing => Vec::new(),
            // Membership stays untouched until the directory is listable again
            DirReading::Unreadable => continue,
        };
        let current: HashSet<ModuleRef> = listing.iter().map(|m| m.id.clone()).collect();
        let added: HashSet<ModuleRef> = current.difference(&dir.members).cloned().collect();
        let removed: Vec<ModuleRef> = dir.members.difference(&current).cloned().collect();
        registry.set_members(&dir_path, current);

        for member in listing {
            if registry.is_dead(&member.id) {
                continue;
            }
            if added.contains(&member.id) && registry.module(&member.id).is_none() {
                if registry.tracks_path(&member.path) {
                    // Same file already tracked under another identity
                    crate::debug_event!(
                        "scan",
                        "skipping duplicate",
                        "{}",
                        member.path.display()
                    );
                    continue;
                }
                crate::log_event!("scan", "discovered", "{}", member.id);
                registry.insert_discovered(member.id.clone(), member.path.clone());
            }
            if registry.module(&member.id).is_some() && observed.insert(member.id.clone()) {
                observations.push((member.id, member.modified));
            }
        }

        for id in removed {
            if registry.is_dead(&id) {
                // Quarantined members disappear without ceremony
                registry.remove_module(&id);
                continue;
            }
            let Some(module) = registry.module(&id) else {
                continue;
            };
            let had_baseline = module.committed.is_some();
            let explicit = module.origin == ModuleOrigin::Explicit;
            arbiter.clear(&id);
            if explicit {
                // Explicit registrations survive; a reappearing file is
                // treated like a fresh registration
                registry.reset_committed(&id);
            } else {
                registry.remove_module(&id);
            }
            if had_baseline {
                events.push(ChangeEvent::Removed(id));
            }
        }
    }

    // Standalone passes
    for (id, reading) in raw.units {
        match reading {
            UnitReading::Present(modified) => {
                if registry.module(&id).is_some() && observed.insert(id.clone()) {
                    observations.push((id, modified));
                }
            }
            UnitReading::Missing => {
                let Some(module) = registry.module(&id) else {
                    continue;
                };
                let had_baseline = module.committed.is_some();
                arbiter.clear(&id);
                registry.reset_committed(&id);
                if had_baseline {
                    events.push(ChangeEvent::Removed(id));
                }
            }
            UnitReading::Unreadable => {}
        }
    }

    // Debounce: only values stable across two scans confirm
    for (id, current) in observations {
        let Some(module) = registry.module(&id) else {
            continue;
        };
        if let Some(confirmed) = arbiter.observe(&id, current, module.committed) {
            registry.commit(&id, confirmed);
            events.push(ChangeEvent::Modified(id));
        }
    }

    events
}
