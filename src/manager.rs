use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::model::{Connection, ConnectionId, ConnectionStatus};
use crate::remote::{RemoteFs, SftpRemoteFs};
use crate::store::Store;
use crate::sync_worker::{RemoteFsFactory, StatusSink, SyncWorker, WatcherFactory, WorkerHandle};
use crate::watcher::{NotifyWatcher, Watcher};

const DEFAULT_STOP_BOUND: Duration = Duration::from_secs(10);

/// Supervises the `SyncWorker` threads, one per connection. Every operation
/// here is safe to call from any thread: mutation of the worker map
/// serializes through `workers`.
pub struct SyncManager {
    store: Arc<dyn Store>,
    workers: Arc<Mutex<HashMap<ConnectionId, WorkerHandle>>>,
    remote_factory: RemoteFsFactory,
    watcher_factory: WatcherFactory,
    stop_bound: Duration,
}

impl SyncManager {
    /// Production wiring: real SFTP sessions and real filesystem watchers.
    pub fn new(store: Arc<dyn Store>) -> Self {
        let remote_factory: RemoteFsFactory = Arc::new(|conn: &Connection| -> Result<Box<dyn RemoteFs>> {
            Ok(Box::new(SftpRemoteFs::connect(conn)?))
        });
        let watcher_factory: WatcherFactory = Arc::new(|| -> Box<dyn Watcher> { Box::new(NotifyWatcher::new()) });
        Self::with_factories(store, remote_factory, watcher_factory)
    }

    /// Test/alternate wiring: inject `RemoteFs`/`Watcher` factories (e.g.
    /// in-memory doubles) so the manager can be exercised without network
    /// access or a real filesystem watcher.
    pub fn with_factories(store: Arc<dyn Store>, remote_factory: RemoteFsFactory, watcher_factory: WatcherFactory) -> Self {
        Self {
            store,
            workers: Arc::new(Mutex::new(HashMap::new())),
            remote_factory,
            watcher_factory,
            stop_bound: DEFAULT_STOP_BOUND,
        }
    }

    fn status_sink(&self) -> StatusSink {
        let store = self.store.clone();
        let workers = self.workers.clone();
        Arc::new(move |id, status, err| {
            info!(connection_id = id, status = status.as_str(), error = ?err, "status transition");
            if let Err(e) = store.update_status(id, status, err.as_deref()) {
                warn!(connection_id = id, error = %e, "failed to persist status transition");
            }
            // Mirrors sync_manager.py's `_handle_status`: once a worker reports
            // Stopped, drop it from the map if it has actually finished running.
            if status == ConnectionStatus::Stopped {
                let mut workers = workers.lock();
                if let Some(handle) = workers.get(&id) {
                    if !handle.is_alive() {
                        workers.remove(&id);
                    }
                }
            }
        })
    }

    /// Idempotent: a live worker is just triggered; a dead one mapped for
    /// this id is replaced.
    pub fn start_connection(&self, id: ConnectionId) -> Result<()> {
        let mut workers = self.workers.lock();
        if let Some(handle) = workers.get(&id) {
            if handle.is_alive() {
                handle.trigger_sync();
                return Ok(());
            }
        }

        let conn = self
            .store
            .get_connection(id)?
            .ok_or(SyncError::UnknownConnection(id))?;
        let handle = SyncWorker::spawn(
            conn,
            self.store.clone(),
            self.remote_factory.clone(),
            self.watcher_factory.clone(),
            self.status_sink(),
        );
        workers.insert(id, handle);
        Ok(())
    }

    /// Removes the worker from the map, asks it to stop with a bounded
    /// join, then writes `Stopped` to the store regardless of whether the
    /// bound elapsed.
    pub fn stop_connection(&self, id: ConnectionId) -> Result<()> {
        let handle = self.workers.lock().remove(&id);
        if let Some(handle) = handle {
            if !handle.stop(self.stop_bound) {
                warn!(connection_id = id, "worker did not stop within the bound; abandoning");
            }
        }
        self.store.update_status(id, ConnectionStatus::Stopped, None)?;
        Ok(())
    }

    pub fn sync_now(&self, id: ConnectionId) -> Result<()> {
        let triggered = {
            let workers = self.workers.lock();
            if let Some(handle) = workers.get(&id) {
                handle.trigger_sync();
                true
            } else {
                false
            }
        };
        if !triggered {
            self.start_connection(id)?;
        }
        Ok(())
    }

    /// Stop-then-start to pick up new config; a no-op when the refreshed
    /// config is disabled.
    pub fn refresh_connection(&self, id: ConnectionId) -> Result<()> {
        self.stop_connection(id)?;
        if let Some(conn) = self.store.get_connection(id)? {
            if conn.enabled {
                self.start_connection(id)?;
            }
        }
        Ok(())
    }

    /// Persists an edited connection and, if a worker is already running for
    /// it, pushes the new config straight into the live worker via
    /// `WorkerHandle::update_connection` (spec.md §4.1) instead of restarting
    /// it — the worker picks it up at the top of its next cycle. Unlike
    /// `refresh_connection`, the watcher and in-flight cycle are left alone;
    /// use this for config edits that don't require a fresh start (interval,
    /// policy flags), and `refresh_connection` when `enabled` itself flips.
    pub fn update_connection(&self, conn: &Connection) -> Result<()> {
        self.store.update_connection(conn)?;
        let workers = self.workers.lock();
        if let Some(handle) = workers.get(&conn.id) {
            if handle.is_alive() {
                handle.update_connection(conn.clone());
            }
        }
        Ok(())
    }

    pub fn remove_connection(&self, id: ConnectionId) -> Result<()> {
        self.stop_connection(id)?;
        self.store.delete_connection(id)?;
        Ok(())
    }

    pub fn start_all(&self) -> Result<()> {
        for conn in self.store.list_connections()? {
            if conn.enabled {
                self.start_connection(conn.id)?;
            }
        }
        Ok(())
    }

    pub fn stop_all(&self) -> Result<()> {
        let ids: Vec<ConnectionId> = self.workers.lock().keys().copied().collect();
        for id in ids {
            self.stop_connection(id)?;
        }
        Ok(())
    }
}
