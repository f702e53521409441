use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub type ConnectionId = i64;

/// Persistent configuration of one local<->remote sync pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub interval: u64,
    pub enabled: bool,
    pub allow_delete: bool,
    pub local_priority: bool,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
}

impl Connection {
    /// Floors the sync interval at 5 seconds, applied whenever a connection
    /// is read rather than enforced only at construction, so a row written
    /// before this floor existed still behaves correctly.
    pub fn effective_interval(&self) -> u64 {
        self.interval.max(5)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Password,
    Key,
}

/// Exactly one secret bundle is populated per `AuthKind`.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthMethod {
    Password { password: String },
    Key { private_key_path: PathBuf, passphrase: Option<String> },
}

impl AuthMethod {
    pub fn kind(&self) -> AuthKind {
        match self {
            AuthMethod::Password { .. } => AuthKind::Password,
            AuthMethod::Key { .. } => AuthKind::Key,
        }
    }

    pub fn from_parts(
        auth_type: AuthKind,
        password: Option<String>,
        private_key_path: Option<PathBuf>,
        passphrase: Option<String>,
    ) -> Result<Self> {
        match auth_type {
            AuthKind::Password => {
                let password = password
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| anyhow!("auth_type=password requires a password"))?;
                Ok(AuthMethod::Password { password })
            }
            AuthKind::Key => {
                let private_key_path = private_key_path
                    .ok_or_else(|| anyhow!("auth_type=key requires a private_key_path"))?;
                Ok(AuthMethod::Key { private_key_path, passphrase })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Stopped,
    Running,
    Syncing,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Stopped => "Stopped",
            ConnectionStatus::Running => "Running",
            ConnectionStatus::Syncing => "Syncing",
            ConnectionStatus::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => ConnectionStatus::Running,
            "Syncing" => ConnectionStatus::Syncing,
            "Error" => ConnectionStatus::Error,
            _ => ConnectionStatus::Stopped,
        }
    }
}

/// The engine's memory of one relative path as it stood at the end of the
/// last successful cycle for a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SyncStateEntry {
    pub local_exists: bool,
    pub local_mtime: Option<f64>,
    pub remote_exists: bool,
    pub remote_mtime: Option<f64>,
}

/// Append-only audit row.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub id: i64,
    pub connection_id: Option<ConnectionId>,
    pub timestamp: String,
    pub kind: LogKind,
    pub path: String,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
    Error,
    Info,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Upload => "upload",
            LogKind::Download => "download",
            LogKind::DeleteLocal => "delete_local",
            LogKind::DeleteRemote => "delete_remote",
            LogKind::Error => "error",
            LogKind::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "upload" => LogKind::Upload,
            "download" => LogKind::Download,
            "delete_local" => LogKind::DeleteLocal,
            "delete_remote" => LogKind::DeleteRemote,
            "info" => LogKind::Info,
            _ => LogKind::Error,
        }
    }
}

/// `(mtime, size)` per relative path, built fresh each cycle for one side.
pub type Snapshot = std::collections::HashMap<String, FileMeta>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FileMeta {
    pub mtime: f64,
    pub size: u64,
}
