use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection as SqlConnection, OptionalExtension};

use crate::model::{
    AuthKind, AuthMethod, Connection, ConnectionId, ConnectionStatus, LogEntry, LogKind,
    SyncStateEntry,
};

const DEFAULT_LOG_LIMIT: i64 = 500;

/// Persistence port consumed by the core. The durable representation is
/// SQLite (see DESIGN.md); any equivalent engine satisfying this trait
/// would do.
pub trait Store: Send + Sync {
    fn list_connections(&self) -> Result<Vec<Connection>>;
    fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>>;
    fn create_connection(&self, conn: &Connection) -> Result<ConnectionId>;
    fn update_connection(&self, conn: &Connection) -> Result<()>;
    fn delete_connection(&self, id: ConnectionId) -> Result<()>;
    fn update_status(&self, id: ConnectionId, status: ConnectionStatus, last_error: Option<&str>) -> Result<()>;

    fn add_log(&self, connection_id: Option<ConnectionId>, kind: LogKind, path: &str, message: &str) -> Result<()>;
    fn recent_logs(&self, connection_id: ConnectionId, limit: Option<i64>) -> Result<Vec<LogEntry>>;

    fn load_sync_state(&self, connection_id: ConnectionId) -> Result<HashMap<String, SyncStateEntry>>;
    fn save_sync_state(&self, connection_id: ConnectionId, entries: &HashMap<String, SyncStateEntry>) -> Result<()>;

    fn get_setting(&self, key: &str) -> Result<Option<String>>;
    fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Typed convenience wrappers over `get_setting`/`set_setting`'s raw string
/// storage, for settings stored as JSON-encoded values. Blanket-implemented
/// so any `Store` gets them for free.
pub trait StoreSettingsExt: Store {
    fn get_setting_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_setting(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).with_context(|| format!("setting {key} is not valid JSON"))?)),
            None => Ok(None),
        }
    }

    fn set_setting_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).with_context(|| format!("failed to serialize setting {key}"))?;
        self.set_setting(key, &raw)
    }
}

impl<S: Store + ?Sized> StoreSettingsExt for S {}

/// SQLite-backed `Store`. All mutating access serializes through one lock
/// guarding the connection handle; every public method runs in its own
/// short transaction.
pub struct SqliteStore {
    conn: Mutex<SqlConnection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = SqlConnection::open(path.as_ref())
            .with_context(|| format!("failed to open sqlite db at {}", path.as_ref().display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = SqlConnection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn migrate(conn: &SqlConnection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL DEFAULT 22,
                username TEXT NOT NULL,
                auth_type TEXT NOT NULL DEFAULT 'password',
                password TEXT,
                private_key_path TEXT,
                passphrase TEXT,
                remote_path TEXT NOT NULL,
                local_path TEXT NOT NULL,
                interval INTEGER NOT NULL DEFAULT 30,
                enabled INTEGER NOT NULL DEFAULT 1,
                allow_delete INTEGER NOT NULL DEFAULT 0,
                local_priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'Stopped',
                last_error TEXT
            );
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id INTEGER,
                timestamp TEXT NOT NULL,
                type TEXT NOT NULL,
                path TEXT,
                message TEXT,
                FOREIGN KEY(connection_id) REFERENCES connections(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_logs_connection ON logs(connection_id);
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sync_state (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                local_exists INTEGER NOT NULL,
                local_mtime REAL,
                remote_exists INTEGER NOT NULL,
                remote_mtime REAL,
                UNIQUE(connection_id, path),
                FOREIGN KEY(connection_id) REFERENCES connections(id) ON DELETE CASCADE
            );
            ",
        )?;
        Ok(())
    }

    fn row_to_connection(row: &rusqlite::Row) -> rusqlite::Result<Connection> {
        let auth_type_raw: String = row.get("auth_type")?;
        let auth_type = if auth_type_raw == "key" { AuthKind::Key } else { AuthKind::Password };
        let password: Option<String> = row.get("password")?;
        let private_key_path: Option<String> = row.get("private_key_path")?;
        let passphrase: Option<String> = row.get("passphrase")?;

        let auth = AuthMethod::from_parts(
            auth_type,
            password,
            private_key_path.map(PathBuf::from),
            passphrase,
        )
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into()))?;

        let local_path: String = row.get("local_path")?;
        let status_raw: String = row.get("status")?;

        Ok(Connection {
            id: row.get("id")?,
            name: row.get("name")?,
            host: row.get("host")?,
            port: row.get::<_, i64>("port")? as u16,
            username: row.get("username")?,
            auth,
            remote_path: row.get("remote_path")?,
            local_path: PathBuf::from(local_path),
            interval: row.get::<_, i64>("interval")? as u64,
            enabled: row.get::<_, i64>("enabled")? != 0,
            allow_delete: row.get::<_, i64>("allow_delete")? != 0,
            local_priority: row.get::<_, i64>("local_priority")? != 0,
            status: ConnectionStatus::parse(&status_raw),
            last_error: row.get("last_error")?,
        })
    }
}

impl Store for SqliteStore {
    fn list_connections(&self) -> Result<Vec<Connection>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM connections ORDER BY id")?;
        let rows = stmt.query_map([], Self::row_to_connection)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM connections WHERE id = ?1")?;
        let result = stmt
            .query_row(params![id], Self::row_to_connection)
            .optional()?;
        Ok(result)
    }

    fn create_connection(&self, c: &Connection) -> Result<ConnectionId> {
        let conn = self.conn.lock();
        let (auth_type, password, private_key_path, passphrase) = auth_columns(&c.auth);
        conn.execute(
            "INSERT INTO connections
                (name, host, port, username, auth_type, password, private_key_path, passphrase,
                 remote_path, local_path, interval, enabled, allow_delete, local_priority, status, last_error)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                c.name,
                c.host,
                c.port as i64,
                c.username,
                auth_type,
                password,
                private_key_path,
                passphrase,
                c.remote_path,
                c.local_path.to_string_lossy().to_string(),
                c.effective_interval() as i64,
                c.enabled as i64,
                c.allow_delete as i64,
                c.local_priority as i64,
                c.status.as_str(),
                c.last_error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_connection(&self, c: &Connection) -> Result<()> {
        let conn = self.conn.lock();
        let (auth_type, password, private_key_path, passphrase) = auth_columns(&c.auth);
        conn.execute(
            "UPDATE connections SET
                name=?1, host=?2, port=?3, username=?4, auth_type=?5, password=?6,
                private_key_path=?7, passphrase=?8, remote_path=?9, local_path=?10,
                interval=?11, enabled=?12, allow_delete=?13, local_priority=?14,
                status=?15, last_error=?16
             WHERE id=?17",
            params![
                c.name,
                c.host,
                c.port as i64,
                c.username,
                auth_type,
                password,
                private_key_path,
                passphrase,
                c.remote_path,
                c.local_path.to_string_lossy().to_string(),
                c.effective_interval() as i64,
                c.enabled as i64,
                c.allow_delete as i64,
                c.local_priority as i64,
                c.status.as_str(),
                c.last_error,
                c.id,
            ],
        )?;
        Ok(())
    }

    fn delete_connection(&self, id: ConnectionId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM connections WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn update_status(&self, id: ConnectionId, status: ConnectionStatus, last_error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE connections SET status = ?1, last_error = ?2 WHERE id = ?3",
            params![status.as_str(), last_error, id],
        )?;
        Ok(())
    }

    fn add_log(&self, connection_id: Option<ConnectionId>, kind: LogKind, path: &str, message: &str) -> Result<()> {
        let conn = self.conn.lock();
        let timestamp = utc_now_iso8601();
        conn.execute(
            "INSERT INTO logs (connection_id, timestamp, type, path, message) VALUES (?1,?2,?3,?4,?5)",
            params![connection_id, timestamp, kind.as_str(), path, message],
        )?;
        Ok(())
    }

    fn recent_logs(&self, connection_id: ConnectionId, limit: Option<i64>) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock();
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT);
        let mut stmt = conn.prepare(
            "SELECT id, connection_id, timestamp, type, path, message FROM logs
             WHERE connection_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![connection_id, limit], |row| {
            let type_raw: String = row.get(3)?;
            Ok(LogEntry {
                id: row.get(0)?,
                connection_id: row.get(1)?,
                timestamp: row.get(2)?,
                kind: LogKind::parse(&type_raw),
                path: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                message: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn load_sync_state(&self, connection_id: ConnectionId) -> Result<HashMap<String, SyncStateEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT path, local_exists, local_mtime, remote_exists, remote_mtime
             FROM sync_state WHERE connection_id = ?1",
        )?;
        let rows = stmt.query_map(params![connection_id], |row| {
            let path: String = row.get(0)?;
            let entry = SyncStateEntry {
                local_exists: row.get::<_, i64>(1)? != 0,
                local_mtime: row.get(2)?,
                remote_exists: row.get::<_, i64>(3)? != 0,
                remote_mtime: row.get(4)?,
            };
            Ok((path, entry))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (path, entry) = row?;
            out.insert(path, entry);
        }
        Ok(out)
    }

    fn save_sync_state(&self, connection_id: ConnectionId, entries: &HashMap<String, SyncStateEntry>) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sync_state WHERE connection_id = ?1", params![connection_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sync_state
                    (connection_id, path, local_exists, local_mtime, remote_exists, remote_mtime)
                 VALUES (?1,?2,?3,?4,?5,?6)",
            )?;
            for (path, entry) in entries {
                stmt.execute(params![
                    connection_id,
                    path,
                    entry.local_exists as i64,
                    entry.local_mtime,
                    entry.remote_exists as i64,
                    entry.remote_mtime,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn auth_columns(auth: &AuthMethod) -> (&'static str, Option<String>, Option<String>, Option<String>) {
    match auth {
        AuthMethod::Password { password } => ("password", Some(password.clone()), None, None),
        AuthMethod::Key { private_key_path, passphrase } => (
            "key",
            None,
            Some(private_key_path.to_string_lossy().to_string()),
            passphrase.clone(),
        ),
    }
}

fn utc_now_iso8601() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_connection() -> Connection {
        Connection {
            id: 0,
            name: "test".into(),
            host: "example.com".into(),
            port: 22,
            username: "user".into(),
            auth: AuthMethod::Password { password: "secret".into() },
            remote_path: "/remote".into(),
            local_path: PathBuf::from("/local"),
            interval: 30,
            enabled: true,
            allow_delete: false,
            local_priority: false,
            status: ConnectionStatus::Stopped,
            last_error: None,
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_connection(&sample_connection()).unwrap();
        let loaded = store.get_connection(id).unwrap().unwrap();
        assert_eq!(loaded.name, "test");
        assert_eq!(loaded.auth.kind(), AuthKind::Password);
    }

    #[test]
    fn sync_state_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_connection(&sample_connection()).unwrap();
        let mut entries = HashMap::new();
        entries.insert(
            "a.txt".to_string(),
            SyncStateEntry { local_exists: true, local_mtime: Some(100.0), remote_exists: true, remote_mtime: Some(100.0) },
        );
        store.save_sync_state(id, &entries).unwrap();
        let loaded = store.load_sync_state(id).unwrap();
        assert_eq!(loaded, entries);
    }

    #[test]
    fn save_sync_state_replaces_previous_entries() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_connection(&sample_connection()).unwrap();
        let mut first = HashMap::new();
        first.insert("a.txt".to_string(), SyncStateEntry::default());
        store.save_sync_state(id, &first).unwrap();

        let mut second = HashMap::new();
        second.insert("b.txt".to_string(), SyncStateEntry::default());
        store.save_sync_state(id, &second).unwrap();

        let loaded = store.load_sync_state(id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("b.txt"));
    }

    #[test]
    fn deleting_connection_cascades_sync_state_and_logs() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_connection(&sample_connection()).unwrap();
        let mut entries = HashMap::new();
        entries.insert("a.txt".to_string(), SyncStateEntry::default());
        store.save_sync_state(id, &entries).unwrap();
        store.add_log(Some(id), LogKind::Info, "", "hello").unwrap();

        store.delete_connection(id).unwrap();

        assert!(store.load_sync_state(id).unwrap().is_empty());
        assert!(store.recent_logs(id, None).unwrap().is_empty());
    }

    #[test]
    fn logs_are_returned_most_recent_first_and_capped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_connection(&sample_connection()).unwrap();
        for i in 0..3 {
            store.add_log(Some(id), LogKind::Info, "", &format!("msg {i}")).unwrap();
        }
        let logs = store.recent_logs(id, Some(2)).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "msg 2");
    }

    #[test]
    fn settings_round_trip_and_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_setting("k").unwrap(), None);
        store.set_setting("k", "\"v1\"").unwrap();
        store.set_setting("k", "\"v2\"").unwrap();
        assert_eq!(store.get_setting("k").unwrap(), Some("\"v2\"".to_string()));
    }

    #[test]
    fn typed_settings_round_trip_through_json() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_setting_json::<Vec<String>>("tags").unwrap(), None);
        store.set_setting_json("tags", &vec!["a".to_string(), "b".to_string()]).unwrap();
        let loaded: Vec<String> = store.get_setting_json("tags").unwrap().unwrap();
        assert_eq!(loaded, vec!["a".to_string(), "b".to_string()]);
    }
}
