//! Supervisor: the periodic scan task and the public registration surface.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::debounce::DebounceArbiter;
use super::declare::{DeclareDeps, DeclareScheduler};
use super::lifecycle::{self, ApplyOutcome};
use super::registry::PathRegistry;
use super::scanner::{self, ChangeEvent, MemberInfo, ScanJob};
use crate::commands::{DeclareScope, snapshot};
use crate::config::ReloadConfig;
use crate::error::{RegisterError, ReloaderError};
use crate::host::{NoopReloadObserver, ReloadObserver, ReloaderHost};
use crate::types::{GuildId, ModuleRef};

/// Scan-side state: what is tracked plus the open debounce windows.
#[derive(Debug, Default)]
struct ScanState {
    registry: PathRegistry,
    arbiter: DebounceArbiter,
}

impl ScanState {
    fn quarantine(&mut self, id: &ModuleRef) {
        self.arbiter.clear(id);
        self.registry.mark_dead(id.clone());
    }
}

/// Handle of the periodic tick task.
struct TickTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Snapshot of what the reloader is tracking.
#[derive(Debug, Clone)]
pub struct ReloaderStats {
    pub modules: usize,
    pub directories: usize,
    pub dead: usize,
    pub declaring: bool,
}

/// Watches registered modules, paths, and directories for changes and keeps
/// the host's loaded state and the declared command set in sync.
///
/// Construction is cheap; nothing touches the filesystem until registration,
/// and nothing runs until [`HotReloader::start`] spawns the periodic scan
/// task (or [`HotReloader::scan`] runs one pass manually).
pub struct HotReloader {
    host: Arc<dyn ReloaderHost>,
    observer: Arc<dyn ReloadObserver>,
    config: ReloadConfig,
    state: Arc<Mutex<ScanState>>,
    declare: Arc<Mutex<DeclareScheduler>>,
    tick: Option<TickTask>,
}

impl HotReloader {
    pub fn new(host: Arc<dyn ReloaderHost>, config: ReloadConfig) -> Self {
        if config.commands_guild == Some(0) {
            tracing::warn!("[reloader] commands_guild 0 is not a valid guild id; declaring globally");
        }
        Self {
            host,
            observer: Arc::new(NoopReloadObserver),
            config,
            state: Arc::new(Mutex::new(ScanState::default())),
            declare: Arc::new(Mutex::new(DeclareScheduler::new())),
            tick: None,
        }
    }

    /// Route quarantine and declaration failures to an observer.
    ///
    /// Configure before starting; a running scan task keeps the observer it
    /// was started with.
    pub fn with_observer(mut self, observer: Arc<dyn ReloadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Declare commands to one guild instead of globally.
    pub fn with_commands_guild(mut self, guild: GuildId) -> Self {
        self.config.commands_guild = Some(guild.value());
        self
    }

    /// Track a module by logical name, resolving it through the host.
    ///
    /// Re-registering a name resets its baseline and revives it from
    /// quarantine; the next stable scan loads it fresh.
    pub fn add_module(&self, name: impl Into<String>) -> Result<(), RegisterError> {
        let name = name.into();
        let path = self
            .host
            .resolve_module_path(&name)
            .map_err(|e| RegisterError::Resolution {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let path = canonical_file(path)?;
        crate::log_event!("reloader", "tracking module", "{name}");
        self.state
            .lock()
            .registry
            .insert_module(ModuleRef::Name(name), path);
        Ok(())
    }

    /// Track a file directly. Its canonicalized path is its identity.
    pub fn add_path(&self, path: impl Into<PathBuf>) -> Result<(), RegisterError> {
        let path = canonical_file(path.into())?;
        crate::log_event!("reloader", "tracking path", "{}", path.display());
        self.state
            .lock()
            .registry
            .insert_module(ModuleRef::Path(path.clone()), path);
        Ok(())
    }

    /// Track a directory of modules.
    ///
    /// Files already present are committed at their current state, so only
    /// future changes fire; files that appear later are loaded once stable.
    /// A namespace derives member identities as `{namespace}.{file_stem}`;
    /// without one, members are tracked by path.
    pub fn add_directory(
        &self,
        path: impl Into<PathBuf>,
        namespace: Option<&str>,
    ) -> Result<(), RegisterError> {
        let dir = canonical_dir(path.into())?;
        let baseline = scanner::list_members(&dir, namespace, &self.config.module_extension);
        crate::log_event!(
            "reloader",
            "tracking directory",
            "{} ({} modules)",
            dir.display(),
            baseline.len()
        );
        self.state
            .lock()
            .registry
            .insert_directory(dir, namespace.map(String::from), baseline);
        Ok(())
    }

    /// [`HotReloader::add_module`] with the blocking resolution and stat
    /// moved to a worker thread.
    pub async fn add_module_async(&self, name: impl Into<String>) -> Result<(), RegisterError> {
        let name = name.into();
        let host = Arc::clone(&self.host);
        let task_name = name.clone();
        let path = tokio::task::spawn_blocking(move || {
            let path =
                host.resolve_module_path(&task_name)
                    .map_err(|e| RegisterError::Resolution {
                        name: task_name.clone(),
                        reason: e.to_string(),
                    })?;
            canonical_file(path)
        })
        .await
        .map_err(|e| RegisterError::TaskFailed {
            reason: e.to_string(),
        })??;

        crate::log_event!("reloader", "tracking module", "{name}");
        self.state
            .lock()
            .registry
            .insert_module(ModuleRef::Name(name), path);
        Ok(())
    }

    /// [`HotReloader::add_path`] with the blocking stat moved to a worker
    /// thread.
    pub async fn add_path_async(&self, path: impl Into<PathBuf>) -> Result<(), RegisterError> {
        let path = path.into();
        let path = tokio::task::spawn_blocking(move || canonical_file(path))
            .await
            .map_err(|e| RegisterError::TaskFailed {
                reason: e.to_string(),
            })??;

        crate::log_event!("reloader", "tracking path", "{}", path.display());
        self.state
            .lock()
            .registry
            .insert_module(ModuleRef::Path(path.clone()), path);
        Ok(())
    }

    /// [`HotReloader::add_directory`] with the blocking listing moved to a
    /// worker thread.
    pub async fn add_directory_async(
        &self,
        path: impl Into<PathBuf>,
        namespace: Option<&str>,
    ) -> Result<(), RegisterError> {
        let path = path.into();
        let namespace = namespace.map(String::from);
        let task_namespace = namespace.clone();
        let extension = self.config.module_extension.clone();
        let (dir, baseline) = tokio::task::spawn_blocking(
            move || -> Result<(PathBuf, Vec<MemberInfo>), RegisterError> {
                let dir = canonical_dir(path)?;
                let baseline = scanner::list_members(&dir, task_namespace.as_deref(), &extension);
                Ok((dir, baseline))
            },
        )
        .await
        .map_err(|e| RegisterError::TaskFailed {
            reason: e.to_string(),
        })??;

        crate::log_event!(
            "reloader",
            "tracking directory",
            "{} ({} modules)",
            dir.display(),
            baseline.len()
        );
        self.state
            .lock()
            .registry
            .insert_directory(dir, namespace, baseline);
        Ok(())
    }

    /// Start the periodic scan task.
    ///
    /// The first scan runs one interval after start. Wiring this into a
    /// client's startup callbacks is the host's responsibility.
    pub fn start(&mut self) -> Result<(), ReloaderError> {
        if self.tick.is_some() {
            return Err(ReloaderError::AlreadyRunning);
        }

        let ctx = self.context();
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let interval = self.config.scan_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = child.cancelled() => {
                        crate::log_event!("reloader", "stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                if let Err(e) = ctx.scan_once().await {
                    // Fail-stop: restarts are the host's call
                    tracing::error!("[reloader] scan loop crashed: {e}");
                    return;
                }
            }
        });

        self.tick = Some(TickTask { handle, cancel });
        crate::log_event!("reloader", "started", "scanning every {interval:?}");
        Ok(())
    }

    /// Stop the periodic scan task.
    ///
    /// An in-flight declaration task keeps running to completion; use
    /// [`HotReloader::shutdown`] to stop that too.
    pub fn stop(&mut self) -> Result<(), ReloaderError> {
        let tick = self.tick.take().ok_or(ReloaderError::NotRunning)?;
        tick.cancel.cancel();
        Ok(())
    }

    /// Stop everything: the scan task and any in-flight declaration task,
    /// awaiting both. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(tick) = self.tick.take() {
            tick.cancel.cancel();
            let _ = tick.handle.await;
        }
        let task = self.declare.lock().take_task();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.handle.await;
        }
        crate::debug_event!("reloader", "shut down");
    }

    /// Run one scan pass immediately.
    pub async fn scan(&self) -> Result<(), ReloaderError> {
        self.context().scan_once().await
    }

    pub fn stats(&self) -> ReloaderStats {
        let state = self.state.lock();
        ReloaderStats {
            modules: state.registry.module_count(),
            directories: state.registry.directory_count(),
            dead: state.registry.dead_count(),
            declaring: self.declare.lock().is_running(),
        }
    }

    fn context(&self) -> TickContext {
        TickContext {
            host: Arc::clone(&self.host),
            observer: Arc::clone(&self.observer),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            declare: Arc::clone(&self.declare),
        }
    }
}

/// Everything one scan pass needs; owned by the tick task.
#[derive(Clone)]
struct TickContext {
    host: Arc<dyn ReloaderHost>,
    observer: Arc<dyn ReloadObserver>,
    config: ReloadConfig,
    state: Arc<Mutex<ScanState>>,
    declare: Arc<Mutex<DeclareScheduler>>,
}

impl TickContext {
    async fn scan_once(&self) -> Result<(), ReloaderError> {
        let job = {
            let state = self.state.lock();
            ScanJob::snapshot(&state.registry, &self.config.module_extension)
        };

        let raw = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| ReloaderError::ScanFailed {
                reason: e.to_string(),
            })?;

        let events = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            scanner::fold_scan(raw, &mut state.registry, &mut state.arbiter)
        };
        if events.is_empty() {
            return Ok(());
        }

        let mut any_changed = false;
        for event in events {
            match event {
                ChangeEvent::Modified(id) => {
                    match lifecycle::apply_change(self.host.as_ref(), &id).await {
                        ApplyOutcome::Changed => any_changed = true,
                        ApplyOutcome::Unchanged => {}
                        ApplyOutcome::Dead => self.quarantine(&id),
                    }
                }
                ChangeEvent::Removed(id) => {
                    let outcome = lifecycle::apply_removal(
                        self.host.as_ref(),
                        &id,
                        self.config.unload_on_delete,
                    )
                    .await;
                    if outcome == ApplyOutcome::Dead {
                        self.quarantine(&id);
                    }
                }
            }
        }

        if any_changed {
            self.schedule_declare();
        }
        Ok(())
    }

    fn quarantine(&self, id: &ModuleRef) {
        self.state.lock().quarantine(id);
        self.observer.on_module_dead(id);
    }

    fn schedule_declare(&self) {
        let Some(delay) = self.config.redeclare_delay() else {
            return;
        };
        let desired = snapshot(self.host.global_commands());
        let deps = DeclareDeps {
            host: Arc::clone(&self.host),
            observer: Arc::clone(&self.observer),
            scope: self.scope(),
            delay,
        };
        DeclareScheduler::trigger(&self.declare, desired, &deps);
    }

    fn scope(&self) -> DeclareScope {
        match self.config.commands_guild.and_then(GuildId::new) {
            Some(guild) => DeclareScope::Guild(guild),
            None => DeclareScope::Global,
        }
    }
}

fn canonical_file(path: PathBuf) -> Result<PathBuf, RegisterError> {
    match path.canonicalize() {
        Ok(canonical) if canonical.is_file() => Ok(canonical),
        Ok(canonical) => Err(RegisterError::NotFound { path: canonical }),
        Err(_) => Err(RegisterError::NotFound { path }),
    }
}

fn canonical_dir(path: PathBuf) -> Result<PathBuf, RegisterError> {
    match path.canonicalize() {
        Ok(canonical) if canonical.is_dir() => Ok(canonical),
        Ok(canonical) => Err(RegisterError::NotFound { path: canonical }),
        Err(_) => Err(RegisterError::NotFound { path }),
    }
}
