use std::collections::{HashMap, HashSet};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::ignore::IgnoreRules;
use crate::local_fs;
use crate::model::{Connection, ConnectionId, ConnectionStatus, FileMeta, LogKind, Snapshot, SyncStateEntry};
use crate::remote::RemoteFs;
use crate::store::Store;
use crate::watcher::{DirtySet, Watcher};

/// Invoked on every status transition. `SyncManager` wires one of these to
/// persist status into the `Store`; a `tracing` event is also emitted at
/// every transition regardless of what the sink does with it.
pub type StatusSink = Arc<dyn Fn(ConnectionId, ConnectionStatus, Option<String>) + Send + Sync>;

/// Produces a fresh `RemoteFs` session for one cycle, so the factory is
/// called once per cycle rather than a session being kept open across
/// cycles.
pub type RemoteFsFactory = Arc<dyn Fn(&Connection) -> Result<Box<dyn RemoteFs>> + Send + Sync>;

/// Produces a fresh `Watcher` for one worker's lifetime.
pub type WatcherFactory = Arc<dyn Fn() -> Box<dyn Watcher> + Send + Sync>;

const EQUAL_MTIME_TOLERANCE_SECS: f64 = 1.0;
const CONNECTION_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
}

impl Action {
    fn log_kind(self) -> LogKind {
        match self {
            Action::Upload => LogKind::Upload,
            Action::Download => LogKind::Download,
            Action::DeleteLocal => LogKind::DeleteLocal,
            Action::DeleteRemote => LogKind::DeleteRemote,
        }
    }

    /// `resurrect` is set when this Upload/Download only exists because
    /// `allow_delete=false` turned a would-be deletion into a restore of the
    /// missing side; it never applies to a Delete* action.
    fn success_message(self, resurrect: bool) -> &'static str {
        match (self, resurrect) {
            (Action::Upload, false) => "uploaded to remote host",
            (Action::Upload, true) => "restored remote file deleted since last cycle (allow_delete=false)",
            (Action::Download, false) => "downloaded from remote host",
            (Action::Download, true) => "restored local file deleted since last cycle (allow_delete=false)",
            (Action::DeleteLocal, _) => "removed local file after remote delete",
            (Action::DeleteRemote, _) => "removed remote file after local delete",
        }
    }
}

/// One step of a plan: the action to take, the path it applies to, and
/// whether it's a delete-turned-restore (see `Action::success_message`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedAction {
    pub action: Action,
    pub path: String,
    pub resurrect: bool,
}

fn planned(action: Action, path: &str, resurrect: bool) -> PlannedAction {
    PlannedAction { action, path: path.to_string(), resurrect }
}

/// Plans the minimal set of actions that converge `local` and `remote`.
/// `dirty` paths are visited first, in the order given; the remainder is
/// the sorted union of both trees.
pub fn plan_actions(
    local: &Snapshot,
    remote: &Snapshot,
    prior: &HashMap<String, SyncStateEntry>,
    dirty: &[String],
    allow_delete: bool,
    local_priority: bool,
) -> Vec<PlannedAction> {
    let dirty_set: HashSet<&str> = dirty.iter().map(String::as_str).collect();

    let mut rest: Vec<&String> = local
        .keys()
        .chain(remote.keys())
        .filter(|p| !dirty_set.contains(p.as_str()))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    rest.sort();

    let ordered: Vec<&str> = dirty.iter().map(String::as_str).chain(rest.into_iter().map(String::as_str)).collect();

    let mut actions = Vec::new();
    for path in ordered {
        let local_meta = local.get(path);
        let remote_meta = remote.get(path);
        let prior_both = prior.get(path).map(|p| p.local_exists && p.remote_exists).unwrap_or(false);

        match (local_meta, remote_meta) {
            (Some(l), Some(r)) => {
                let equal = (l.size as i64 - r.size as i64).abs() == 0
                    && (l.mtime - r.mtime).abs() <= EQUAL_MTIME_TOLERANCE_SECS;
                if !equal {
                    if local_priority || l.mtime >= r.mtime {
                        actions.push(planned(Action::Upload, path, false));
                    } else {
                        actions.push(planned(Action::Download, path, false));
                    }
                }
            }
            (Some(_), None) => {
                if prior_both {
                    if allow_delete {
                        actions.push(planned(Action::DeleteLocal, path, false));
                    } else {
                        actions.push(planned(Action::Upload, path, true));
                    }
                } else {
                    actions.push(planned(Action::Upload, path, false));
                }
            }
            (None, Some(_)) => {
                if prior_both {
                    if allow_delete {
                        actions.push(planned(Action::DeleteRemote, path, false));
                    } else {
                        actions.push(planned(Action::Download, path, true));
                    }
                } else {
                    actions.push(planned(Action::Download, path, false));
                }
            }
            (None, None) => {}
        }
    }
    actions
}

fn build_sync_state(local: &Snapshot, remote: &Snapshot) -> HashMap<String, SyncStateEntry> {
    let all: HashSet<&String> = local.keys().chain(remote.keys()).collect();
    let mut out = HashMap::with_capacity(all.len());
    for path in all {
        let l = local.get(path);
        let r = remote.get(path);
        out.insert(
            path.clone(),
            SyncStateEntry {
                local_exists: l.is_some(),
                local_mtime: l.map(|m| m.mtime),
                remote_exists: r.is_some(),
                remote_mtime: r.map(|m| m.mtime),
            },
        );
    }
    out
}

fn restat_local(conn: &Connection, path: &str) -> Result<FileMeta> {
    let local_path = conn.local_path.join(path);
    let metadata = std::fs::metadata(&local_path)
        .with_context(|| format!("failed to stat {}", local_path.display()))?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(FileMeta { mtime, size: metadata.len() })
}

fn do_upload(conn: &Connection, remote: &dyn RemoteFs, path: &str) -> Result<()> {
    let local_path = conn.local_path.join(path);
    remote.upload_file(&local_path, &conn.remote_path, path)
}

fn do_download(conn: &Connection, remote: &dyn RemoteFs, path: &str) -> Result<()> {
    let local_path = conn.local_path.join(path);
    remote.download_file(&conn.remote_path, path, &local_path)
}

fn do_delete_local(conn: &Connection, path: &str) -> Result<()> {
    let local_path = conn.local_path.join(path);
    if local_path.exists() {
        std::fs::remove_file(&local_path)
            .with_context(|| format!("failed to remove {}", local_path.display()))?;
    }
    Ok(())
}

fn do_delete_remote(conn: &Connection, remote: &dyn RemoteFs, path: &str) -> Result<()> {
    remote.delete_path(&conn.remote_path, path)
}

/// Executes one planned action, logging exactly one entry (success or
/// `error`) and mutating the in-memory snapshots on success. Per-file
/// failures never escape this function.
fn execute_one(
    conn: &Connection,
    store: &dyn Store,
    remote: &dyn RemoteFs,
    planned: &PlannedAction,
    local_files: &mut Snapshot,
    remote_files: &mut Snapshot,
) {
    let PlannedAction { action, path, resurrect } = planned;
    let (action, path, resurrect) = (*action, path.as_str(), *resurrect);

    let result = match action {
        Action::Upload => do_upload(conn, remote, path),
        Action::Download => do_download(conn, remote, path),
        Action::DeleteLocal => do_delete_local(conn, path),
        Action::DeleteRemote => do_delete_remote(conn, remote, path),
    };

    match result {
        Ok(()) => {
            match action {
                Action::Upload => {
                    if let Some(meta) = local_files.get(path).copied() {
                        remote_files.insert(path.to_string(), meta);
                    }
                }
                Action::Download => match restat_local(conn, path) {
                    Ok(meta) => {
                        local_files.insert(path.to_string(), meta);
                    }
                    Err(err) => warn!(connection_id = conn.id, path, error = %err, "failed to re-stat downloaded file"),
                },
                Action::DeleteLocal => {
                    local_files.remove(path);
                }
                Action::DeleteRemote => {
                    remote_files.remove(path);
                }
            }
            if resurrect {
                warn!(connection_id = conn.id, path, action = ?action, "allow_delete=false; restoring file deleted on the other side instead of propagating the delete");
            } else {
                info!(connection_id = conn.id, path, action = ?action, "sync action applied");
            }
            if let Err(err) = store.add_log(Some(conn.id), action.log_kind(), path, action.success_message(resurrect)) {
                warn!(connection_id = conn.id, error = %err, "failed to write log entry");
            }
        }
        Err(err) => {
            error!(connection_id = conn.id, path, action = ?action, error = %err, "sync action failed");
            if let Err(log_err) = store.add_log(Some(conn.id), LogKind::Error, path, &err.to_string()) {
                warn!(connection_id = conn.id, error = %log_err, "failed to write error log entry");
            }
        }
    }
}

/// Runs one full cycle: scan, list, plan, execute, persist. An error that
/// escapes session open or remote listing is propagated so the caller can
/// transition to `Error` without overwriting the prior `SyncState`;
/// per-action errors are absorbed inside the loop.
fn run_cycle(
    conn: &Connection,
    store: &dyn Store,
    remote_factory: &RemoteFsFactory,
    dirty: Vec<String>,
) -> Result<()> {
    let ignore = IgnoreRules::load(&conn.local_path);
    let mut local_files = local_fs::scan(&conn.local_path, &ignore)
        .with_context(|| format!("failed to scan {}", conn.local_path.display()))?;

    let remote = (remote_factory)(conn)
        .with_context(|| format!("failed to connect to {}:{}", conn.host, conn.port))?;
    let mut remote_files = remote
        .list_recursive(&conn.remote_path)
        .with_context(|| format!("failed to list {}", conn.remote_path))?;
    remote_files.retain(|path, _| !ignore.should_ignore(path));

    let prior = store.load_sync_state(conn.id).context("failed to load prior sync state")?;
    let actions = plan_actions(&local_files, &remote_files, &prior, &dirty, conn.allow_delete, conn.local_priority);

    for planned in &actions {
        execute_one(conn, store, remote.as_ref(), planned, &mut local_files, &mut remote_files);
    }

    let new_state = build_sync_state(&local_files, &remote_files);
    store.save_sync_state(conn.id, &new_state).context("failed to persist sync state")?;
    Ok(())
}

/// A bound, idempotent handle to a running `SyncWorker` thread, owned by
/// `SyncManager`. `mark_dirty`/`trigger_sync`/`update_connection` are the
/// operations exposed to callers outside the worker itself.
pub struct WorkerHandle {
    dirty: DirtySet,
    connection: Arc<Mutex<Connection>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn trigger_sync(&self) {
        self.dirty.trigger();
    }

    pub fn mark_dirty(&self, rel_path: String) {
        self.dirty.mark(rel_path);
    }

    pub fn update_connection(&self, conn: Connection) {
        *self.connection.lock().unwrap() = conn;
    }

    /// Snapshot of the connection config currently visible to the worker
    /// thread (i.e. what the *next* cycle will run with after
    /// `update_connection`, not necessarily what the in-flight cycle started with).
    pub fn current_config(&self) -> Connection {
        self.connection.lock().unwrap().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.join.as_ref().map(|j| !j.is_finished()).unwrap_or(false)
    }

    /// Requests shutdown and waits up to `bound` for the thread to exit.
    /// Returns `false` if the bound elapsed first; the caller is then
    /// responsible for treating the worker as abandoned.
    pub fn stop(mut self, bound: Duration) -> bool {
        self.dirty.request_stop();
        let Some(join) = self.join.take() else { return true };

        let (tx, rx) = mpsc::channel();
        let _ = thread::spawn(move || {
            let _ = join.join();
            let _ = tx.send(());
        });
        rx.recv_timeout(bound).is_ok()
    }
}

/// Builds and spawns the thread backing one connection's sync loop. Not a
/// struct instance itself — the running state lives entirely on the thread
/// and in the `WorkerHandle` returned to the caller.
pub struct SyncWorker;

impl SyncWorker {
    pub fn spawn(
        connection: Connection,
        store: Arc<dyn Store>,
        remote_factory: RemoteFsFactory,
        watcher_factory: WatcherFactory,
        status_sink: StatusSink,
    ) -> WorkerHandle {
        let dirty = DirtySet::new();
        let connection = Arc::new(Mutex::new(connection));

        let thread_dirty = dirty.clone();
        let thread_connection = connection.clone();
        let thread_store = store;
        let thread_sink = status_sink;

        let join = thread::spawn(move || {
            let id = thread_connection.lock().unwrap().id;
            let local_root = thread_connection.lock().unwrap().local_path.clone();

            if let Err(err) = std::fs::create_dir_all(&local_root) {
                error!(connection_id = id, error = %err, "failed to create local root");
            }

            let mut watcher = watcher_factory();
            if let Err(err) = watcher.start(&local_root, thread_dirty.clone()) {
                warn!(connection_id = id, error = %err, "failed to start filesystem watcher");
            }

            loop {
                if thread_dirty.is_stopping() {
                    break;
                }

                let conn = thread_connection.lock().unwrap().clone();
                thread_sink(conn.id, ConnectionStatus::Syncing, None);

                let dirty_paths = thread_dirty.drain();
                match run_cycle(&conn, thread_store.as_ref(), &remote_factory, dirty_paths) {
                    Ok(()) => {
                        thread_sink(conn.id, ConnectionStatus::Running, None);
                    }
                    Err(err) => {
                        let message = err.to_string();
                        error!(connection_id = conn.id, error = %message, "cycle failed");
                        thread_sink(conn.id, ConnectionStatus::Error, Some(message.clone()));
                        if let Err(log_err) = thread_store.add_log(Some(conn.id), LogKind::Error, "", &message) {
                            warn!(connection_id = conn.id, error = %log_err, "failed to write cycle error log");
                        }
                        thread::sleep(CONNECTION_ERROR_BACKOFF);
                        if thread_dirty.is_stopping() {
                            break;
                        }
                        continue;
                    }
                }

                if thread_dirty.is_stopping() {
                    break;
                }
                let interval = thread_connection.lock().unwrap().effective_interval();
                thread_dirty.wait(Duration::from_secs(interval));
            }

            watcher.stop();
            let id = thread_connection.lock().unwrap().id;
            thread_sink(id, ConnectionStatus::Stopped, None);
        });

        WorkerHandle { dirty, connection, join: Some(join) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(mtime: f64, size: u64) -> FileMeta {
        FileMeta { mtime, size }
    }

    // S1: remote newer, no local priority -> download.
    #[test]
    fn s1_remote_newer_downloads() {
        let mut local = Snapshot::new();
        local.insert("a.txt".into(), meta(100.0, 10));
        let mut remote = Snapshot::new();
        remote.insert("a.txt".into(), meta(200.0, 10));

        let actions = plan_actions(&local, &remote, &HashMap::new(), &[], false, false);
        assert_eq!(actions, vec![planned(Action::Download, "a.txt", false)]);
    }

    // S2: same as S1 but local_priority -> upload wins regardless of mtime.
    #[test]
    fn s2_local_priority_overrides_timestamp() {
        let mut local = Snapshot::new();
        local.insert("a.txt".into(), meta(100.0, 10));
        let mut remote = Snapshot::new();
        remote.insert("a.txt".into(), meta(200.0, 10));

        let actions = plan_actions(&local, &remote, &HashMap::new(), &[], false, true);
        assert_eq!(actions, vec![planned(Action::Upload, "a.txt", false)]);
    }

    // S3: remote delete propagation when allow_delete is true.
    #[test]
    fn s3_remote_delete_propagates() {
        let mut local = Snapshot::new();
        local.insert("b.txt".into(), meta(100.0, 10));
        let remote = Snapshot::new();
        let mut prior = HashMap::new();
        prior.insert(
            "b.txt".to_string(),
            SyncStateEntry { local_exists: true, local_mtime: Some(50.0), remote_exists: true, remote_mtime: Some(50.0) },
        );

        let actions = plan_actions(&local, &remote, &prior, &[], true, false);
        assert_eq!(actions, vec![planned(Action::DeleteLocal, "b.txt", false)]);
    }

    // S4: same as S3 but allow_delete false -> resurrect via upload, flagged
    // for the warn-level log path.
    #[test]
    fn s4_delete_without_permission_resurrects() {
        let mut local = Snapshot::new();
        local.insert("b.txt".into(), meta(100.0, 10));
        let remote = Snapshot::new();
        let mut prior = HashMap::new();
        prior.insert(
            "b.txt".to_string(),
            SyncStateEntry { local_exists: true, local_mtime: Some(50.0), remote_exists: true, remote_mtime: Some(50.0) },
        );

        let actions = plan_actions(&local, &remote, &prior, &[], false, false);
        assert_eq!(actions, vec![planned(Action::Upload, "b.txt", true)]);
    }

    #[test]
    fn one_sided_without_prior_state_is_always_a_fresh_transfer() {
        // §9(b): a path previously present on only one side is "fresh", not a deletion.
        let mut local = Snapshot::new();
        local.insert("c.txt".into(), meta(100.0, 10));
        let remote = Snapshot::new();
        let mut prior = HashMap::new();
        prior.insert(
            "c.txt".to_string(),
            SyncStateEntry { local_exists: true, local_mtime: Some(50.0), remote_exists: false, remote_mtime: None },
        );

        let actions = plan_actions(&local, &remote, &prior, &[], true, false);
        assert_eq!(actions, vec![planned(Action::Upload, "c.txt", false)]);
    }

    #[test]
    fn equal_files_produce_no_action() {
        let mut local = Snapshot::new();
        local.insert("a.txt".into(), meta(100.0, 10));
        let mut remote = Snapshot::new();
        remote.insert("a.txt".into(), meta(100.4, 10));

        let actions = plan_actions(&local, &remote, &HashMap::new(), &[], false, false);
        assert!(actions.is_empty());
    }

    #[test]
    fn dirty_paths_are_planned_first() {
        let mut local = Snapshot::new();
        local.insert("a.txt".into(), meta(100.0, 1));
        local.insert("z.txt".into(), meta(100.0, 1));
        let remote = Snapshot::new();

        let actions = plan_actions(&local, &remote, &HashMap::new(), &["z.txt".to_string()], false, false);
        assert_eq!(actions[0], planned(Action::Upload, "z.txt", false));
        assert_eq!(actions[1], planned(Action::Upload, "a.txt", false));
    }

    #[test]
    fn neither_side_present_is_skipped() {
        // Can only arise via stale prior state naming a path absent from both trees.
        let local = Snapshot::new();
        let remote = Snapshot::new();
        let mut prior = HashMap::new();
        prior.insert(
            "ghost.txt".to_string(),
            SyncStateEntry { local_exists: true, local_mtime: Some(1.0), remote_exists: true, remote_mtime: Some(1.0) },
        );

        let actions = plan_actions(&local, &remote, &prior, &["ghost.txt".to_string()], true, false);
        assert!(actions.is_empty());
    }

    #[test]
    fn idempotence_second_cycle_on_equal_trees_has_no_actions() {
        let mut local = Snapshot::new();
        local.insert("a.txt".into(), meta(100.0, 10));
        let mut remote = Snapshot::new();
        remote.insert("a.txt".into(), meta(100.0, 10));
        let state = build_sync_state(&local, &remote);

        let actions = plan_actions(&local, &remote, &state, &[], false, false);
        assert!(actions.is_empty());
    }

    #[test]
    fn build_sync_state_round_trips_presence_and_mtimes() {
        let mut local = Snapshot::new();
        local.insert("a.txt".into(), meta(1.0, 1));
        let mut remote = Snapshot::new();
        remote.insert("b.txt".into(), meta(2.0, 2));

        let state = build_sync_state(&local, &remote);
        assert_eq!(state.len(), 2);
        assert_eq!(state["a.txt"].local_exists, true);
        assert_eq!(state["a.txt"].remote_exists, false);
        assert_eq!(state["b.txt"].remote_mtime, Some(2.0));
    }

    struct FailingRemote;
    impl RemoteFs for FailingRemote {
        fn list_recursive(&self, _root: &str) -> Result<Snapshot> {
            Err(anyhow::anyhow!("connection reset by peer"))
        }
        fn upload_file(&self, _local: &std::path::Path, _root: &str, _rel: &str) -> Result<()> {
            Ok(())
        }
        fn download_file(&self, _root: &str, _rel: &str, _local: &std::path::Path) -> Result<()> {
            Ok(())
        }
        fn delete_path(&self, _root: &str, _rel: &str) -> Result<()> {
            Ok(())
        }
        fn ensure_parent_dirs(&self, _root: &str, _rel: &str) -> Result<()> {
            Ok(())
        }
    }

    fn test_connection(local_path: std::path::PathBuf) -> Connection {
        Connection {
            id: 1,
            name: "test".into(),
            host: "example.com".into(),
            port: 22,
            username: "user".into(),
            auth: crate::model::AuthMethod::Password { password: "secret".into() },
            remote_path: "/remote".into(),
            local_path,
            interval: 5,
            enabled: true,
            allow_delete: true,
            local_priority: false,
            status: ConnectionStatus::Stopped,
            last_error: None,
        }
    }

    // S6: a failing session open/listing must not overwrite prior sync-state.
    #[test]
    fn s6_cycle_failure_preserves_prior_sync_state() {
        use crate::store::{SqliteStore, Store};

        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = test_connection(dir.path().to_path_buf());
        let id = store.create_connection(&conn).unwrap();
        let mut conn = conn;
        conn.id = id;

        let mut prior = HashMap::new();
        prior.insert(
            "a.txt".to_string(),
            SyncStateEntry { local_exists: true, local_mtime: Some(1.0), remote_exists: true, remote_mtime: Some(1.0) },
        );
        store.save_sync_state(id, &prior).unwrap();

        let remote_factory: RemoteFsFactory = Arc::new(|_conn| Ok(Box::new(FailingRemote) as Box<dyn RemoteFs>));
        let result = run_cycle(&conn, &store, &remote_factory, vec![]);

        assert!(result.is_err());
        let unchanged = store.load_sync_state(id).unwrap();
        assert_eq!(unchanged, prior);
    }

    // S5: ignored paths never appear in a planned action even when the tree
    // outside the ignored subtree still needs reconciling.
    #[test]
    fn s5_ignore_filtering_excludes_matched_paths_from_the_cycle() {
        use crate::store::{SqliteStore, Store};

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".sftpsyncignore"), "*.log\n!keep.log\n").unwrap();
        std::fs::write(dir.path().join("a.log"), b"ignored").unwrap();
        std::fs::write(dir.path().join("keep.log"), b"kept").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"kept").unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let conn = test_connection(dir.path().to_path_buf());
        let id = store.create_connection(&conn).unwrap();
        let mut conn = conn;
        conn.id = id;

        struct EmptyRemote;
        impl RemoteFs for EmptyRemote {
            fn list_recursive(&self, _root: &str) -> Result<Snapshot> {
                Ok(Snapshot::new())
            }
            fn upload_file(&self, _local: &std::path::Path, _root: &str, _rel: &str) -> Result<()> {
                Ok(())
            }
            fn download_file(&self, _root: &str, _rel: &str, _local: &std::path::Path) -> Result<()> {
                Ok(())
            }
            fn delete_path(&self, _root: &str, _rel: &str) -> Result<()> {
                Ok(())
            }
            fn ensure_parent_dirs(&self, _root: &str, _rel: &str) -> Result<()> {
                Ok(())
            }
        }

        let remote_factory: RemoteFsFactory = Arc::new(|_conn| Ok(Box::new(EmptyRemote) as Box<dyn RemoteFs>));
        run_cycle(&conn, &store, &remote_factory, vec![]).unwrap();

        let state = store.load_sync_state(id).unwrap();
        assert!(state.contains_key("keep.log"));
        assert!(state.contains_key("b.txt"));
        assert!(!state.contains_key("a.log"));
    }
}
