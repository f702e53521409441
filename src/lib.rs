//! Bidirectional SFTP directory sync engine.
//!
//! A connection binds one local root to one remote root; a `SyncWorker`
//! reconciles the two trees on an interval, against a `Store`-persisted
//! snapshot of the previous reconciliation. `SyncManager` supervises one
//! worker per connection. See `DESIGN.md` for how each module is grounded.

pub mod error;
pub mod ignore;
pub mod local_fs;
pub mod manager;
pub mod model;
pub mod remote;
pub mod store;
pub mod sync_worker;
pub mod watcher;

pub use error::SyncError;
pub use manager::SyncManager;
pub use model::{AuthKind, AuthMethod, Connection, ConnectionId, ConnectionStatus, LogEntry, LogKind, SyncStateEntry};
pub use store::{SqliteStore, Store, StoreSettingsExt};
