use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Component, Path};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ssh2::{OpenFlags, OpenType, Session, Sftp};

use crate::error::SyncError;
use crate::model::{AuthMethod, Connection, FileMeta, Snapshot};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// SFTP port consumed by the core. A session is scoped to one cycle: opened
/// at the top, dropped at the end.
pub trait RemoteFs {
    /// Ensures `remote_root` exists (creating it and parents if necessary),
    /// walks it, and returns only regular files keyed by POSIX-relative path.
    fn list_recursive(&self, remote_root: &str) -> Result<Snapshot>;
    fn upload_file(&self, local: &Path, remote_root: &str, rel_path: &str) -> Result<()>;
    fn download_file(&self, remote_root: &str, rel_path: &str, local: &Path) -> Result<()>;
    fn delete_path(&self, remote_root: &str, rel_path: &str) -> Result<()>;
    fn ensure_parent_dirs(&self, remote_root: &str, rel_path: &str) -> Result<()>;
}

pub struct SftpRemoteFs {
    _session: Session,
    sftp: Sftp,
}

impl SftpRemoteFs {
    /// Establishes TCP+SSH transport and authenticates per `auth_type`.
    /// Failures are wrapped in `SyncError::Connection` so callers (the
    /// worker's cycle error path) can distinguish "couldn't reach the
    /// remote" from other failure kinds.
    pub fn connect(conn: &Connection) -> Result<Self> {
        Self::connect_inner(conn).map_err(|source| {
            SyncError::Connection { host: conn.host.clone(), port: conn.port, source }.into()
        })
    }

    fn connect_inner(conn: &Connection) -> Result<Self> {
        let addr = format!("{}:{}", conn.host, conn.port);
        let socket_addr = addr
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {addr}"))?
            .next()
            .ok_or_else(|| anyhow!("no address found for {addr}"))?;

        let stream = TcpStream::connect_timeout(&socket_addr, Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .with_context(|| format!("failed to connect to {addr}"))?;
        stream.set_read_timeout(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS))).ok();
        stream.set_write_timeout(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS))).ok();

        let mut session = Session::new().context("failed to create SSH session")?;
        session.set_tcp_stream(stream);
        session.handshake().context("SSH handshake failed")?;

        match &conn.auth {
            AuthMethod::Password { password } => {
                session
                    .userauth_password(&conn.username, password)
                    .context("password authentication failed")?;
            }
            AuthMethod::Key { private_key_path, passphrase } => {
                session
                    .userauth_pubkey_file(&conn.username, None, private_key_path, passphrase.as_deref())
                    .context("key authentication failed")?;
            }
        }

        if !session.authenticated() {
            return Err(anyhow!("authentication rejected by {addr}"));
        }

        let sftp = session.sftp().context("failed to start SFTP subsystem")?;
        Ok(Self { _session: session, sftp })
    }

    fn collect(&self, base: &str, rel: &str, out: &mut Snapshot) -> Result<()> {
        let dir_path = join_remote(base, rel);
        for (entry_path, stat) in self
            .sftp
            .readdir(Path::new(&dir_path))
            .with_context(|| format!("failed to read {dir_path}"))?
        {
            let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == "." || name == ".." {
                continue;
            }
            let child_rel = if rel.is_empty() { name.to_string() } else { format!("{rel}/{name}") };

            if stat.is_dir() {
                self.collect(base, &child_rel, out)?;
            } else if stat.is_file() {
                out.insert(
                    child_rel,
                    FileMeta { mtime: stat.mtime.unwrap_or(0) as f64, size: stat.size.unwrap_or(0) },
                );
            }
        }
        Ok(())
    }
}

/// Joins a POSIX remote root and a relative path, tolerating an empty root
/// (interpreted as `/`) and an empty relative path (returns the root).
fn join_remote(root: &str, rel: &str) -> String {
    let root = if root.is_empty() { "/" } else { root };
    if rel.is_empty() {
        root.to_string()
    } else if root.ends_with('/') {
        format!("{root}{rel}")
    } else {
        format!("{root}/{rel}")
    }
}

impl RemoteFs for SftpRemoteFs {
    fn list_recursive(&self, remote_root: &str) -> Result<Snapshot> {
        self.mkdir_p(remote_root)?;
        let mut out = Snapshot::new();
        self.collect(remote_root, "", &mut out)?;
        Ok(out)
    }

    fn upload_file(&self, local: &Path, remote_root: &str, rel_path: &str) -> Result<()> {
        self.ensure_parent_dirs(remote_root, rel_path)?;
        let remote_path = join_remote(remote_root, rel_path);
        let mut bytes = Vec::new();
        std::fs::File::open(local)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .with_context(|| format!("failed to read {}", local.display()))?;

        let mut file = self
            .sftp
            .open_mode(Path::new(&remote_path), OpenFlags::WRITE | OpenFlags::TRUNCATE | OpenFlags::CREATE, 0o644, OpenType::File)
            .with_context(|| format!("failed to open {remote_path} for write"))?;
        file.write_all(&bytes).with_context(|| format!("failed to write {remote_path}"))
    }

    fn download_file(&self, remote_root: &str, rel_path: &str, local: &Path) -> Result<()> {
        let remote_path = join_remote(remote_root, rel_path);
        let mut file = self
            .sftp
            .open(Path::new(&remote_path))
            .with_context(|| format!("failed to open {remote_path}"))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).with_context(|| format!("failed to read {remote_path}"))?;

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(local, &bytes).with_context(|| format!("failed to write {}", local.display()))
    }

    fn delete_path(&self, remote_root: &str, rel_path: &str) -> Result<()> {
        let remote_path = join_remote(remote_root, rel_path);
        self.delete_recursive(&remote_path)
    }

    fn ensure_parent_dirs(&self, remote_root: &str, rel_path: &str) -> Result<()> {
        let parent = Path::new(rel_path).parent().and_then(|p| p.to_str()).unwrap_or("");
        if parent.is_empty() {
            return Ok(());
        }
        self.mkdir_p(&join_remote(remote_root, parent))
    }
}

impl SftpRemoteFs {
    fn mkdir_p(&self, target: &str) -> Result<()> {
        let mut current = String::new();
        for component in Path::new(target).components() {
            match component {
                Component::RootDir => {
                    current.push('/');
                    continue;
                }
                Component::CurDir | Component::ParentDir | Component::Prefix(_) => continue,
                Component::Normal(part) => {
                    let part = part.to_string_lossy();
                    if current.is_empty() || current.ends_with('/') {
                        current.push_str(&part);
                    } else {
                        current.push('/');
                        current.push_str(&part);
                    }
                }
            }

            if current.is_empty() {
                continue;
            }
            if self.sftp.stat(Path::new(&current)).is_ok() {
                continue;
            }
            self.sftp
                .mkdir(Path::new(&current), 0o755)
                .with_context(|| format!("mkdir {current}"))?;
        }
        Ok(())
    }

    /// Missing paths are a no-op; directories are emptied before being removed.
    fn delete_recursive(&self, path: &str) -> Result<()> {
        let stat = match self.sftp.stat(Path::new(path)) {
            Ok(stat) => stat,
            Err(_) => return Ok(()),
        };

        if stat.is_dir() {
            for (entry_path, _) in self.sftp.readdir(Path::new(path))? {
                let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if name == "." || name == ".." {
                    continue;
                }
                self.delete_recursive(&join_remote(path, name))?;
            }
            self.sftp.rmdir(Path::new(path)).with_context(|| format!("failed to rmdir {path}"))
        } else {
            self.sftp.unlink(Path::new(path)).with_context(|| format!("failed to remove {path}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_remote_handles_empty_root_and_rel() {
        assert_eq!(join_remote("", "a.txt"), "/a.txt");
        assert_eq!(join_remote("/srv", ""), "/srv");
        assert_eq!(join_remote("/srv/", "a.txt"), "/srv/a.txt");
        assert_eq!(join_remote("/srv", "a.txt"), "/srv/a.txt");
    }
}
