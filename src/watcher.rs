use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};

/// Thread-safe set of relative paths the local watcher has reported dirty
/// since the last cycle drained them, plus the condvar that backs the
/// worker's signalable interval wait.
#[derive(Clone)]
pub struct DirtySet {
    inner: Arc<(Mutex<Inner>, Condvar)>,
}

struct Inner {
    /// Insertion order of dirty paths, so the planner can visit them
    /// dirty-first in the order the watcher actually reported them
    /// (spec.md §4.1: "dirty first (preserving insertion order)").
    order: Vec<String>,
    /// Mirrors `order`'s contents for O(1) dedup on repeated `mark` calls.
    members: std::collections::HashSet<String>,
    stop: bool,
    wake: bool,
}

impl Default for DirtySet {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtySet {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Inner { order: Vec::new(), members: Default::default(), stop: false, wake: false }),
                Condvar::new(),
            )),
        }
    }

    /// Watcher callback: marks a relative path dirty and wakes any waiter.
    /// A path already dirty keeps its original position; `mark` is not a
    /// move-to-front.
    pub fn mark(&self, rel_path: String) {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        if guard.members.insert(rel_path.clone()) {
            guard.order.push(rel_path);
        }
        guard.wake = true;
        cvar.notify_all();
    }

    /// Drains the set in the order paths were first marked dirty.
    pub fn drain(&self) -> Vec<String> {
        let (lock, _cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        guard.members.clear();
        std::mem::take(&mut guard.order)
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        guard.wake = true;
        cvar.notify_all();
    }

    pub fn request_stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        guard.stop = true;
        guard.wake = true;
        cvar.notify_all();
    }

    pub fn is_stopping(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap().stop
    }

    /// Sleeps for `duration`, woken early by `mark`/`trigger`/`request_stop`.
    pub fn wait(&self, duration: std::time::Duration) {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap();
        let (mut guard, _timeout) = cvar
            .wait_timeout_while(guard, duration, |inner| !inner.wake && !inner.stop)
            .unwrap();
        guard.wake = false;
    }
}

/// fs-events port consumed by the core. One instance is owned per
/// connection, observing that connection's local root.
pub trait Watcher: Send {
    fn start(&mut self, root: &Path, dirty: DirtySet) -> Result<()>;
    fn stop(&mut self);
}

pub struct NotifyWatcher {
    inner: Option<RecommendedWatcher>,
}

impl NotifyWatcher {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

impl Default for NotifyWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Watcher for NotifyWatcher {
    fn start(&mut self, root: &Path, dirty: DirtySet) -> Result<()> {
        let root_owned: PathBuf = root.to_path_buf();
        let callback_root = root_owned.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if event.kind.is_access() {
                return;
            }
            for path in &event.paths {
                if path.is_dir() {
                    continue;
                }
                if let Some(rel) = relative_to_root(&callback_root, path) {
                    dirty.mark(rel);
                }
            }
        })
        .context("failed to start filesystem watcher")?;

        watcher
            .watch(&root_owned, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root_owned.display()))?;

        self.inner = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        self.inner = None;
    }
}

/// Normalizes `path` to a POSIX-separator path relative to `root`, or
/// `None` if it doesn't resolve under the root.
fn relative_to_root(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    let posix = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");
    if posix.is_empty() {
        None
    } else {
        Some(posix)
    }
}
