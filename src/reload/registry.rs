//! Path registry: tracked modules, tracked directories, and the dead set.
//!
//! The registry owns what the scanner looks at. Modules carry the last
//! committed modification time; directories carry the member identities seen
//! on the latest scan so membership deltas can be computed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::scanner::MemberInfo;
use crate::types::ModuleRef;

/// Where a tracked module came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Registered directly via `add_module` or `add_path`. Never destroyed
    /// by scans, only re-baselined.
    Explicit,
    /// Discovered as a member of a tracked directory. Destroyed when the
    /// directory stops listing it.
    Discovered,
}

/// A module under watch.
#[derive(Debug, Clone)]
pub struct TrackedModule {
    /// File backing the module.
    pub path: PathBuf,
    /// Last modification time committed through the debounce window.
    /// `None` means the baseline is unknown: the next stable reading
    /// triggers an initial load.
    pub committed: Option<SystemTime>,
    pub origin: ModuleOrigin,
}

/// A directory under watch with its known member identities.
#[derive(Debug, Clone)]
pub struct TrackedDir {
    pub namespace: Option<String>,
    /// Identities listed in the directory on the latest scan.
    pub members: HashSet<ModuleRef>,
}

/// Registry of everything the scanner looks at.
#[derive(Debug, Default)]
pub struct PathRegistry {
    modules: HashMap<ModuleRef, TrackedModule>,
    directories: HashMap<PathBuf, TrackedDir>,
    /// Identities quarantined after an unrecoverable failure. Only explicit
    /// re-registration removes entries.
    dead: HashSet<ModuleRef>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module explicitly, or re-register it.
    ///
    /// Re-registration resets the committed baseline to unknown and revives
    /// the identity from the dead set, so the next stable scan loads it.
    pub fn insert_module(&mut self, id: ModuleRef, path: PathBuf) {
        self.dead.remove(&id);
        self.modules.insert(
            id,
            TrackedModule {
                path,
                committed: None,
                origin: ModuleOrigin::Explicit,
            },
        );
    }

    /// Track a module discovered by a directory scan.
    ///
    /// Starts with an unknown baseline: the file must hold stable for two
    /// scans before its initial load fires.
    pub fn insert_discovered(&mut self, id: ModuleRef, path: PathBuf) {
        self.modules.insert(
            id,
            TrackedModule {
                path,
                committed: None,
                origin: ModuleOrigin::Discovered,
            },
        );
    }

    /// Register a directory, capturing the given listing as its baseline.
    ///
    /// Pre-existing members are committed at their current mtime so they do
    /// not fire an initial load; members already tracked keep their state;
    /// quarantined members are revived with a fresh current baseline. A
    /// listed file already tracked under a different identity stays with
    /// that identity and gets no second unit.
    pub fn insert_directory(
        &mut self,
        path: PathBuf,
        namespace: Option<String>,
        baseline: Vec<MemberInfo>,
    ) {
        let member_ids: HashSet<ModuleRef> = baseline.iter().map(|m| m.id.clone()).collect();

        // On re-registration, discovered members that fell out of the
        // listing are dropped unless another directory still claims them.
        if let Some(previous) = self.directories.get(&path) {
            let stale: Vec<ModuleRef> = previous.members.difference(&member_ids).cloned().collect();
            for id in stale {
                let explicit = self
                    .modules
                    .get(&id)
                    .is_some_and(|m| m.origin == ModuleOrigin::Explicit);
                let claimed_elsewhere = self
                    .directories
                    .iter()
                    .any(|(p, d)| *p != path && d.members.contains(&id));
                if !explicit && !claimed_elsewhere {
                    self.modules.remove(&id);
                }
            }
        }

        for member in baseline {
            let revived = self.dead.remove(&member.id);
            if !revived && self.modules.contains_key(&member.id) {
                continue;
            }
            // A file already registered under another identity keeps that
            // identity; the listing does not add a second unit for it
            if !revived && self.tracks_path(&member.path) {
                continue;
            }
            let origin = match self.modules.get(&member.id) {
                Some(existing) if existing.origin == ModuleOrigin::Explicit => {
                    ModuleOrigin::Explicit
                }
                _ => ModuleOrigin::Discovered,
            };
            self.modules.insert(
                member.id,
                TrackedModule {
                    path: member.path,
                    committed: Some(member.modified),
                    origin,
                },
            );
        }

        self.directories.insert(
            path,
            TrackedDir {
                namespace,
                members: member_ids,
            },
        );
    }

    pub fn module(&self, id: &ModuleRef) -> Option<&TrackedModule> {
        self.modules.get(id)
    }

    pub fn directory(&self, path: &Path) -> Option<&TrackedDir> {
        self.directories.get(path)
    }

    /// Replace a directory's known member set after a scan.
    pub fn set_members(&mut self, path: &Path, members: HashSet<ModuleRef>) {
        if let Some(dir) = self.directories.get_mut(path) {
            dir.members = members;
        }
    }

    /// Commit a confirmed modification time.
    pub fn commit(&mut self, id: &ModuleRef, modified: SystemTime) {
        if let Some(module) = self.modules.get_mut(id) {
            module.committed = Some(modified);
        }
    }

    /// Reset a module's baseline to unknown (file disappeared; a reappearing
    /// file is treated like a fresh registration).
    pub fn reset_committed(&mut self, id: &ModuleRef) {
        if let Some(module) = self.modules.get_mut(id) {
            module.committed = None;
        }
    }

    pub fn remove_module(&mut self, id: &ModuleRef) {
        self.modules.remove(id);
    }

    /// Quarantine an identity. The module entry is kept so an explicit
    /// re-registration can see its path, but scans skip it entirely.
    pub fn mark_dead(&mut self, id: ModuleRef) {
        self.dead.insert(id);
    }

    pub fn is_dead(&self, id: &ModuleRef) -> bool {
        self.dead.contains(id)
    }

    /// Whether any tracked module is backed by this file.
    ///
    /// Used to avoid tracking one file under two identities when a watched
    /// directory lists a file that was also registered explicitly.
    pub fn tracks_path(&self, path: &Path) -> bool {
        self.modules.values().any(|m| m.path == path)
    }

    fn directory_claims(&self, id: &ModuleRef) -> bool {
        self.directories.values().any(|d| d.members.contains(id))
    }

    /// Modules whose presence is checked by per-file stat: live modules not
    /// covered by any directory listing.
    pub fn standalone_units(&self) -> Vec<(ModuleRef, PathBuf)> {
        self.modules
            .iter()
            .filter(|(id, _)| !self.dead.contains(id) && !self.directory_claims(id))
            .map(|(id, module)| (id.clone(), module.path.clone()))
            .collect()
    }

    /// Directories to list on the next scan.
    pub fn watched_dirs(&self) -> Vec<(PathBuf, Option<String>)> {
        self.directories
            .iter()
            .map(|(path, dir)| (path.clone(), dir.namespace.clone()))
            .collect()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn dead_count(&self) -> usize {
        self.dead.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn t(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn member(name: &str, path: &str, modified: SystemTime) -> MemberInfo {
        MemberInfo {
            id: ModuleRef::name(name),
            path: PathBuf::from(path),
            modified,
        }
    }

    #[test]
    fn test_reregistration_resets_baseline_and_revives() {
        let mut registry = PathRegistry::new();
        let id = ModuleRef::name("plugins.mod");

        registry.insert_module(id.clone(), PathBuf::from("/plugins/mod.wasm"));
        registry.commit(&id, t(10));
        registry.mark_dead(id.clone());
        assert!(registry.is_dead(&id));

        registry.insert_module(id.clone(), PathBuf::from("/plugins/mod.wasm"));
        assert!(!registry.is_dead(&id));
        assert_eq!(registry.module(&id).unwrap().committed, None);
    }

    #[test]
    fn test_directory_baseline_commits_current_mtimes() {
        let mut registry = PathRegistry::new();

        registry.insert_directory(
            PathBuf::from("/plugins"),
            Some("plugins".to_string()),
            vec![
                member("plugins.a", "/plugins/a.wasm", t(10)),
                member("plugins.b", "/plugins/b.wasm", t(20)),
            ],
        );

        let a = registry.module(&ModuleRef::name("plugins.a")).unwrap();
        assert_eq!(a.committed, Some(t(10)));
        assert_eq!(a.origin, ModuleOrigin::Discovered);
        assert_eq!(registry.module_count(), 2);
        assert_eq!(registry.directory_count(), 1);
    }

    #[test]
    fn test_directory_keeps_tracked_member_state() {
        let mut registry = PathRegistry::new();
        let id = ModuleRef::name("plugins.a");

        registry.insert_module(id.clone(), PathBuf::from("/plugins/a.wasm"));
        registry.commit(&id, t(5));

        registry.insert_directory(
            PathBuf::from("/plugins"),
            Some("plugins".to_string()),
            vec![member("plugins.a", "/plugins/a.wasm", t(10))],
        );

        // Existing member keeps its committed state and explicit origin
        let a = registry.module(&id).unwrap();
        assert_eq!(a.committed, Some(t(5)));
        assert_eq!(a.origin, ModuleOrigin::Explicit);
    }

    #[test]
    fn test_directory_revives_dead_members() {
        let mut registry = PathRegistry::new();
        let id = ModuleRef::name("plugins.a");

        registry.insert_discovered(id.clone(), PathBuf::from("/plugins/a.wasm"));
        registry.mark_dead(id.clone());

        registry.insert_directory(
            PathBuf::from("/plugins"),
            Some("plugins".to_string()),
            vec![member("plugins.a", "/plugins/a.wasm", t(30))],
        );

        assert!(!registry.is_dead(&id));
        // Revived with a current baseline: only future edits fire
        assert_eq!(registry.module(&id).unwrap().committed, Some(t(30)));
    }

    #[test]
    fn test_reregistered_directory_drops_stale_members() {
        let mut registry = PathRegistry::new();
        let explicit = ModuleRef::name("plugins.keep");

        registry.insert_module(explicit.clone(), PathBuf::from("/plugins/keep.wasm"));
        registry.insert_directory(
            PathBuf::from("/plugins"),
            Some("plugins".to_string()),
            vec![
                member("plugins.keep", "/plugins/keep.wasm", t(10)),
                member("plugins.gone", "/plugins/gone.wasm", t(10)),
            ],
        );
        assert_eq!(registry.module_count(), 2);

        registry.insert_directory(
            PathBuf::from("/plugins"),
            Some("plugins".to_string()),
            vec![member("plugins.keep", "/plugins/keep.wasm", t(10))],
        );

        // Discovered member fell out of the listing and is gone
        assert!(registry.module(&ModuleRef::name("plugins.gone")).is_none());
        // Explicit member survives re-registration
        assert!(registry.module(&explicit).is_some());
    }

    #[test]
    fn test_standalone_units_skip_dead_and_claimed() {
        let mut registry = PathRegistry::new();
        let standalone = ModuleRef::name("plugins.solo");
        let dead = ModuleRef::name("plugins.dead");

        registry.insert_module(standalone.clone(), PathBuf::from("/solo.wasm"));
        registry.insert_module(dead.clone(), PathBuf::from("/dead.wasm"));
        registry.mark_dead(dead);
        registry.insert_directory(
            PathBuf::from("/plugins"),
            Some("plugins".to_string()),
            vec![member("plugins.a", "/plugins/a.wasm", t(10))],
        );

        let units = registry.standalone_units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, standalone);
        assert_eq!(registry.dead_count(), 1);
    }

    #[test]
    fn test_tracks_path() {
        let mut registry = PathRegistry::new();
        registry.insert_module(
            ModuleRef::name("plugins.a"),
            PathBuf::from("/plugins/a.wasm"),
        );

        assert!(registry.tracks_path(Path::new("/plugins/a.wasm")));
        assert!(!registry.tracks_path(Path::new("/plugins/b.wasm")));
    }

    #[test]
    fn test_directory_baseline_skips_files_tracked_under_other_identities() {
        let mut registry = PathRegistry::new();
        let explicit = ModuleRef::name("bot.plugins.alpha");
        registry.insert_module(explicit.clone(), PathBuf::from("/plugins/alpha.wasm"));

        // Un-namespaced listing would track the same file by path
        registry.insert_directory(
            PathBuf::from("/plugins"),
            None,
            vec![MemberInfo {
                id: ModuleRef::path("/plugins/alpha.wasm"),
                path: PathBuf::from("/plugins/alpha.wasm"),
                modified: t(10),
            }],
        );

        // One unit, still under the explicit identity, still pending its
        // initial load
        assert_eq!(registry.module_count(), 1);
        assert!(
            registry
                .module(&ModuleRef::path("/plugins/alpha.wasm"))
                .is_none()
        );
        assert_eq!(registry.module(&explicit).unwrap().committed, None);
    }
}
