//! Registry snapshots taken before every registry write.

use super::registry::{parse_registry, Registry};
use crate::error::{LpmError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const BACKUP_EXT: &str = "json";
const ID_LEN: usize = 8;

/// Writes, deduplicates, prunes and restores registry snapshots.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    max_backups: usize,
}

/// A snapshot on disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub id: String,
    pub path: PathBuf,
    /// Modification time, milliseconds since the Unix epoch.
    pub modified_ms: u64,
    pub size: u64,
    /// Number of packages in the snapshot; `None` if it does not parse.
    pub packages: Option<usize>,
}

struct Snapshot {
    id: String,
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

impl BackupManager {
    #[must_use]
    pub fn new(dir: PathBuf, max_backups: usize) -> Self {
        Self { dir, max_backups }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Store `current` as a new snapshot, then dedup and prune.
    ///
    /// Returns the path of the snapshot holding `current` afterwards.
    pub fn snapshot_before_write(&self, current: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(LpmError::io("create", &self.dir))?;

        let path = loop {
            let candidate = self.path_for(&lpm_util::id::random_hex(ID_LEN));
            if !candidate.exists() {
                break candidate;
            }
        };
        std::fs::write(&path, current).map_err(LpmError::io("write", &path))?;
        debug!(path = %path.display(), size = current.len(), "Created registry backup");

        let mut others: Vec<Snapshot> = self
            .scan()?
            .into_iter()
            .filter(|s| s.path != path)
            .collect();

        let mut kept = Vec::with_capacity(others.len());
        for snapshot in others.drain(..) {
            if snapshot.size == current.len() as u64 && is_identical(&snapshot.path, current) {
                remove_snapshot(&snapshot.path)?;
                debug!(id = %snapshot.id, "Removed duplicate backup");
            } else {
                kept.push(snapshot);
            }
        }

        // The new snapshot always survives, so keep at least one slot for it.
        let budget = self.max_backups.max(1) - 1;
        if kept.len() > budget {
            kept.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.id.cmp(&b.id)));
            let excess = kept.len() - budget;
            for snapshot in kept.iter().take(excess) {
                remove_snapshot(&snapshot.path)?;
                debug!(id = %snapshot.id, "Pruned old backup");
            }
        }

        Ok(path)
    }

    /// Snapshots newest first.
    pub fn list(&self) -> Result<Vec<BackupInfo>> {
        let mut snapshots = self.scan()?;
        snapshots.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.id.cmp(&b.id)));

        Ok(snapshots
            .into_iter()
            .map(|s| {
                let packages = std::fs::read(&s.path)
                    .ok()
                    .and_then(|bytes| serde_json::from_slice::<Registry>(&bytes).ok())
                    .map(|registry| registry.packages.len());
                BackupInfo {
                    modified_ms: s
                        .modified
                        .duration_since(UNIX_EPOCH)
                        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                    id: s.id,
                    path: s.path,
                    size: s.size,
                    packages,
                }
            })
            .collect())
    }

    /// Overwrite `registry_path` with snapshot `id`.
    ///
    /// The snapshot must itself be a valid registry. The state being replaced
    /// is not snapshotted.
    pub fn revert(&self, id: &str, registry_path: &Path) -> Result<Registry> {
        let id = id.strip_suffix(".json").unwrap_or(id);
        // Snapshot ids are bare hex.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LpmError::not_found("backup", id));
        }
        let path = self.path_for(id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LpmError::not_found("backup", id));
            }
            Err(e) => return Err(LpmError::io("read", &path)(e)),
        };

        let registry = parse_registry(&bytes, &path)?;
        lpm_util::fs::write_creating_dirs(registry_path, &bytes)
            .map_err(LpmError::io("write", registry_path))?;
        debug!(id = %id, path = %registry_path.display(), "Reverted registry");
        Ok(registry)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{BACKUP_EXT}"))
    }

    fn scan(&self) -> Result<Vec<Snapshot>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LpmError::io("list", &self.dir)(e)),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(LpmError::io("list", &self.dir))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable backup");
                    continue;
                }
            };
            snapshots.push(Snapshot {
                id,
                path,
                modified: metadata.modified().unwrap_or(UNIX_EPOCH),
                size: metadata.len(),
            });
        }
        Ok(snapshots)
    }
}

fn is_identical(path: &Path, current: &[u8]) -> bool {
    std::fs::read(path).is_ok_and(|bytes| bytes == current)
}

fn remove_snapshot(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LpmError::io("remove", path)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    fn pause() {
        sleep(Duration::from_millis(20));
    }

    fn registry_bytes(n: usize) -> Vec<u8> {
        let mut registry = Registry::default();
        for i in 0..n {
            registry.add_package(&format!("p{i}"), "1.0.0", PathBuf::from("/s"), "sig".into());
        }
        serde_json::to_vec_pretty(&registry).unwrap()
    }

    #[test]
    fn test_snapshot_writes_random_hex_file() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().join("backups"), 5);

        let path = backups.snapshot_before_write(b"{}").unwrap();
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert_eq!(stem.len(), ID_LEN);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn test_identical_snapshots_dedup() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().to_path_buf(), 5);

        backups.snapshot_before_write(b"same").unwrap();
        pause();
        let newest = backups.snapshot_before_write(b"same").unwrap();

        let list = backups.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].path, newest);
    }

    #[test]
    fn test_retention_keeps_most_recent() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().to_path_buf(), 3);

        let mut written = Vec::new();
        for i in 0..6 {
            written.push(backups.snapshot_before_write(&registry_bytes(i)).unwrap());
            pause();
        }

        let list = backups.list().unwrap();
        assert_eq!(list.len(), 3);
        let kept: Vec<_> = list.iter().map(|b| b.path.clone()).collect();
        assert_eq!(kept, vec![written[5].clone(), written[4].clone(), written[3].clone()]);
        assert_eq!(list[0].packages, Some(5));
    }

    #[test]
    fn test_zero_budget_keeps_new_snapshot() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().to_path_buf(), 0);

        backups.snapshot_before_write(b"a").unwrap();
        pause();
        let newest = backups.snapshot_before_write(b"b").unwrap();

        let list = backups.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].path, newest);
    }

    #[test]
    fn test_revert_restores_bytes_without_snapshot() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().join("backups"), 5);
        let registry_path = dir.path().join("registry.json");
        std::fs::write(&registry_path, "garbage").unwrap();

        let snapshot = registry_bytes(2);
        let path = backups.snapshot_before_write(&snapshot).unwrap();
        let id = path.file_stem().unwrap().to_str().unwrap().to_string();

        let restored = backups.revert(&id, &registry_path).unwrap();
        assert_eq!(restored.packages.len(), 2);
        assert_eq!(std::fs::read(&registry_path).unwrap(), snapshot);
        assert_eq!(backups.list().unwrap().len(), 1);
    }

    #[test]
    fn test_revert_refuses_corrupted_snapshot() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().join("backups"), 5);
        let registry_path = dir.path().join("registry.json");
        std::fs::write(&registry_path, "{\"packages\":{}}").unwrap();

        let path = backups.snapshot_before_write(b"not a registry").unwrap();
        let id = path.file_stem().unwrap().to_str().unwrap().to_string();

        let err = backups.revert(&id, &registry_path).unwrap_err();
        assert!(matches!(err, LpmError::Corrupted { .. }));
        assert_eq!(
            std::fs::read_to_string(&registry_path).unwrap(),
            "{\"packages\":{}}"
        );
    }

    #[test]
    fn test_revert_unknown_id() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().to_path_buf(), 5);
        let err = backups
            .revert("deadbeef", &dir.path().join("registry.json"))
            .unwrap_err();
        assert!(matches!(err, LpmError::NotFound { what: "backup", .. }));
    }

    #[test]
    fn test_revert_rejects_ids_outside_backup_dir() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().join("backups"), 5);
        let registry_path = dir.path().join("registry.json");
        std::fs::write(&registry_path, registry_bytes(1)).unwrap();
        std::fs::create_dir_all(dir.path().join("backups")).unwrap();

        for id in ["../registry", "../registry.json", "", "sub/abc", "nothex12"] {
            let err = backups.revert(id, &registry_path).unwrap_err();
            assert!(
                matches!(err, LpmError::NotFound { what: "backup", .. }),
                "{id}: {err}"
            );
        }
        assert_eq!(std::fs::read(&registry_path).unwrap(), registry_bytes(1));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let backups = BackupManager::new(dir.path().join("nope"), 5);
        assert!(backups.list().unwrap().is_empty());
    }
}
