use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};

use crate::ignore::IgnoreRules;
use crate::model::{FileMeta, Snapshot};

/// Walks `root`, recording `{mtime, size}` for every non-ignored regular
/// file, keyed by its POSIX-normalized relative path. Directories whose
/// relative path matches an ignore rule are pruned before recursing.
/// Symlinks are not followed.
pub fn scan(root: &Path, ignore: &IgnoreRules) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    if root.exists() {
        walk(root, "", ignore, &mut snapshot)?;
    }
    Ok(snapshot)
}

fn walk(root: &Path, rel_dir: &str, ignore: &IgnoreRules, out: &mut Snapshot) -> Result<()> {
    let dir = if rel_dir.is_empty() { root.to_path_buf() } else { root.join(rel_dir) };
    let entries = std::fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy().to_string();
        let rel_path = if rel_dir.is_empty() { name.clone() } else { format!("{rel_dir}/{name}") };

        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }

        if file_type.is_dir() {
            if ignore.should_ignore(&rel_path) {
                continue;
            }
            walk(root, &rel_path, ignore, out)?;
        } else if file_type.is_file() {
            if ignore.should_ignore(&rel_path) {
                continue;
            }
            let metadata = entry.metadata()?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            out.insert(rel_path, FileMeta { mtime, size: metadata.len() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scan_skips_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let ignore = IgnoreRules::load(&missing);
        let snapshot = scan(&missing, &ignore).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn scan_finds_nested_files_and_prunes_ignored_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("keep")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("keep/a.txt"), b"hi").unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), b"ignored").unwrap();
        fs::write(dir.path().join(".sftpsyncignore"), "node_modules/\n").unwrap();

        let ignore = IgnoreRules::load(dir.path());
        let snapshot = scan(dir.path(), &ignore).unwrap();

        assert!(snapshot.contains_key("keep/a.txt"));
        assert!(!snapshot.keys().any(|k| k.starts_with("node_modules")));
    }
}
