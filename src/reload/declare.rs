//! Command declaration scheduler.
//!
//! Confirmed changes never hit the rate-limited commands API directly. One
//! declaration task at a time sleeps out the redeclare delay, adopts whatever
//! newer state was scheduled while it slept, and declares only when the
//! desired snapshot differs from what was last declared. Rapid edits coalesce
//! into a single declaration of the final state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::commands::{BuilderMap, CommandBuilder, DeclareScope};
use crate::error::DeclareError;
use crate::host::{ReloadObserver, ReloaderHost};

/// Dependencies one declaration task runs against.
#[derive(Clone)]
pub struct DeclareDeps {
    pub host: Arc<dyn ReloaderHost>,
    pub observer: Arc<dyn ReloadObserver>,
    pub scope: DeclareScope,
    pub delay: Duration,
}

/// Handle of an in-flight declaration task.
#[derive(Debug)]
pub struct DeclareTask {
    pub handle: JoinHandle<()>,
    pub cancel: CancellationToken,
}

/// Schedules, coalesces, and retries declaration work.
///
/// Lives behind a mutex shared with the running task; the task re-checks
/// `scheduled` at every wake, so state set here is never lost.
#[derive(Debug, Default)]
pub struct DeclareScheduler {
    /// Last snapshot declared (successfully, fail-open, or on cancellation).
    declared: BuilderMap,
    /// Most recently computed desired snapshot.
    scheduled: BuilderMap,
    running: bool,
    task: Option<DeclareTask>,
}

/// What the task decided to do at a wake-up.
enum Step {
    Adopt,
    Declare,
    Finish,
}

impl DeclareScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the desired state after a tick that changed something.
    ///
    /// An in-flight task picks the new state up at its next wake; otherwise
    /// a task is spawned when the state differs from what was last declared.
    pub fn trigger(this: &Arc<Mutex<Self>>, desired: BuilderMap, deps: &DeclareDeps) {
        let mut scheduler = this.lock();
        if scheduler.running {
            crate::debug_event!("declare", "rescheduled", "{} commands", desired.len());
            scheduler.scheduled = desired;
            return;
        }
        if desired == scheduler.declared {
            return;
        }

        crate::debug_event!("declare", "scheduled", "{} commands", desired.len());
        scheduler.scheduled = desired.clone();
        scheduler.running = true;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(declare_task(
            deps.clone(),
            Arc::clone(this),
            cancel.clone(),
            desired,
        ));
        scheduler.task = Some(DeclareTask { handle, cancel });
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Take the in-flight task, for cancelling and awaiting outside the lock.
    pub fn take_task(&mut self) -> Option<DeclareTask> {
        self.task.take()
    }

    #[cfg(test)]
    fn declared(&self) -> &BuilderMap {
        &self.declared
    }
}

/// Clears `running` even if the task panics inside a host call, so a broken
/// host cannot wedge declaration until restart.
struct RunningGuard {
    scheduler: Arc<Mutex<DeclareScheduler>>,
    armed: bool,
}

impl RunningGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.lock().running = false;
        }
    }
}

/// Sleep out the delay. Returns true when cancelled instead.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = sleep(delay) => false,
    }
}

/// Adopt the working snapshot as declared and stop running.
///
/// Used on cancellation: an interrupted sync may already have reached the
/// remote side, so assuming it landed avoids a redundant redeclare later.
fn settle(scheduler: &Mutex<DeclareScheduler>, working: BuilderMap) {
    let mut guard = scheduler.lock();
    guard.declared = working;
    guard.running = false;
}

async fn declare_task(
    deps: DeclareDeps,
    scheduler: Arc<Mutex<DeclareScheduler>>,
    cancel: CancellationToken,
    mut working: BuilderMap,
) {
    let mut running = RunningGuard {
        scheduler: Arc::clone(&scheduler),
        armed: true,
    };

    if pause(deps.delay, &cancel).await {
        settle(&scheduler, working);
        running.disarm();
        return;
    }

    loop {
        let step = {
            let mut guard = scheduler.lock();
            if guard.scheduled != working {
                working = guard.scheduled.clone();
                Step::Adopt
            } else if guard.declared == working {
                guard.running = false;
                Step::Finish
            } else {
                Step::Declare
            }
        };

        match step {
            Step::Adopt => {
                // Newer state arrived while we slept: wait the delay out
                // again so a burst of edits still declares once
                if pause(deps.delay, &cancel).await {
                    settle(&scheduler, working);
                    running.disarm();
                    return;
                }
                continue;
            }
            Step::Finish => {
                running.disarm();
                return;
            }
            Step::Declare => {}
        }

        let builders: Vec<CommandBuilder> = working.values().cloned().collect();
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                settle(&scheduler, working);
                running.disarm();
                return;
            }
            result = deps.host.declare_commands(builders, deps.scope) => result,
        };

        match result {
            Ok(()) => {
                crate::log_event!(
                    "declare",
                    "declared",
                    "{} commands to {}",
                    working.len(),
                    deps.scope
                );
                let done = {
                    let mut guard = scheduler.lock();
                    guard.declared = working.clone();
                    if guard.scheduled == working {
                        guard.running = false;
                        true
                    } else {
                        false
                    }
                };
                if done {
                    running.disarm();
                    return;
                }
            }
            Err(DeclareError::RateLimited) => {
                tracing::warn!("[declare] rate limited, retrying in {:?}", deps.delay);
                if pause(deps.delay, &cancel).await {
                    settle(&scheduler, working);
                    running.disarm();
                    return;
                }
            }
            Err(e) => {
                // Fail-open: adopt the snapshot as declared rather than
                // hammering the API with a payload it keeps rejecting
                tracing::error!("[declare] declaration failed, continuing: {e}");
                deps.observer.on_declare_failed(&e);
                let done = {
                    let mut guard = scheduler.lock();
                    guard.declared = working.clone();
                    if guard.scheduled == working {
                        guard.running = false;
                        true
                    } else {
                        false
                    }
                };
                if done {
                    running.disarm();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::commands::snapshot;
    use crate::error::{
        LoadModuleError, ReloadModuleError, ResolveError, UnloadModuleError,
    };
    use crate::host::NoopReloadObserver;
    use crate::types::ModuleRef;

    const DELAY: Duration = Duration::from_millis(40);

    /// Host that records declare payloads and pops scripted outcomes.
    #[derive(Default)]
    struct DeclareHost {
        outcomes: Mutex<VecDeque<Result<(), DeclareError>>>,
        payloads: Mutex<Vec<Vec<String>>>,
    }

    impl DeclareHost {
        fn payloads(&self) -> Vec<Vec<String>> {
            self.payloads.lock().clone()
        }
    }

    #[async_trait]
    impl ReloaderHost for DeclareHost {
        fn resolve_module_path(&self, name: &str) -> Result<PathBuf, ResolveError> {
            Ok(PathBuf::from(name))
        }

        async fn reload_module(&self, _module: &ModuleRef) -> Result<(), ReloadModuleError> {
            Ok(())
        }

        async fn load_module(&self, _module: &ModuleRef) -> Result<(), LoadModuleError> {
            Ok(())
        }

        async fn unload_module(&self, _module: &ModuleRef) -> Result<(), UnloadModuleError> {
            Ok(())
        }

        fn global_commands(&self) -> Vec<CommandBuilder> {
            Vec::new()
        }

        async fn declare_commands(
            &self,
            commands: Vec<CommandBuilder>,
            _scope: DeclareScope,
        ) -> Result<(), DeclareError> {
            let mut names: Vec<String> = commands.into_iter().map(|c| c.name).collect();
            names.sort();
            self.payloads.lock().push(names);
            self.outcomes.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    struct CountingObserver {
        declare_failures: AtomicUsize,
    }

    impl ReloadObserver for CountingObserver {
        fn on_declare_failed(&self, _error: &DeclareError) {
            self.declare_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn deps(host: &Arc<DeclareHost>) -> DeclareDeps {
        DeclareDeps {
            host: Arc::clone(host) as Arc<dyn ReloaderHost>,
            observer: Arc::new(NoopReloadObserver),
            scope: DeclareScope::Global,
            delay: DELAY,
        }
    }

    fn commands(names: &[&str]) -> BuilderMap {
        snapshot(
            names
                .iter()
                .map(|n| CommandBuilder::slash(*n, "test"))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_burst_of_changes_declares_once() {
        let host = Arc::new(DeclareHost::default());
        let scheduler = Arc::new(Mutex::new(DeclareScheduler::new()));
        let deps = deps(&host);

        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        // A second change lands while the task is sleeping
        sleep(DELAY / 4).await;
        DeclareScheduler::trigger(&scheduler, commands(&["ban", "kick"]), &deps);

        sleep(DELAY * 4).await;

        // One declaration, reflecting the final state
        assert_eq!(host.payloads(), vec![vec!["ban".to_string(), "kick".to_string()]]);
        assert!(!scheduler.lock().is_running());
    }

    #[tokio::test]
    async fn test_no_task_when_nothing_differs() {
        let host = Arc::new(DeclareHost::default());
        let scheduler = Arc::new(Mutex::new(DeclareScheduler::new()));
        let deps = deps(&host);

        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        sleep(DELAY * 3).await;
        assert_eq!(host.payloads().len(), 1);

        // Desired state equals declared state: nothing to do
        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        sleep(DELAY * 3).await;

        assert_eq!(host.payloads().len(), 1);
        assert!(!scheduler.lock().is_running());
    }

    #[tokio::test]
    async fn test_rate_limit_retries_after_delay() {
        let host = Arc::new(DeclareHost::default());
        host.outcomes
            .lock()
            .push_back(Err(DeclareError::RateLimited));
        let scheduler = Arc::new(Mutex::new(DeclareScheduler::new()));
        let deps = deps(&host);

        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        sleep(DELAY * 5).await;

        // Same payload went out twice, once per delay window
        assert_eq!(
            host.payloads(),
            vec![vec!["ban".to_string()], vec!["ban".to_string()]]
        );
        assert_eq!(scheduler.lock().declared(), &commands(&["ban"]));
    }

    #[tokio::test]
    async fn test_failure_continues_fail_open() {
        let host = Arc::new(DeclareHost::default());
        host.outcomes.lock().push_back(Err(DeclareError::Failed {
            reason: "bad payload".to_string(),
        }));
        let observer = Arc::new(CountingObserver {
            declare_failures: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(Mutex::new(DeclareScheduler::new()));
        let mut deps = deps(&host);
        deps.observer = Arc::clone(&observer) as Arc<dyn ReloadObserver>;

        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        sleep(DELAY * 3).await;

        assert_eq!(host.payloads().len(), 1);
        assert_eq!(observer.declare_failures.load(Ordering::SeqCst), 1);

        // The failed snapshot counts as declared: no retry for the same state
        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        sleep(DELAY * 3).await;
        assert_eq!(host.payloads().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_adopts_working_state() {
        let host = Arc::new(DeclareHost::default());
        let scheduler = Arc::new(Mutex::new(DeclareScheduler::new()));
        let deps = deps(&host);

        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        let task = scheduler.lock().take_task().unwrap();
        task.cancel.cancel();
        task.handle.await.unwrap();

        // Cancelled before the delay elapsed: nothing was declared, but the
        // snapshot counts as declared so the same state is not retried
        assert!(host.payloads().is_empty());
        assert!(!scheduler.lock().is_running());
        DeclareScheduler::trigger(&scheduler, commands(&["ban"]), &deps);
        sleep(DELAY * 3).await;
        assert!(host.payloads().is_empty());
    }
}
