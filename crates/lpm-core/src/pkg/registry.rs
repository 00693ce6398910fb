//! The global registry index and its file-backed store.

use super::backup::BackupManager;
use crate::config::Config;
use crate::error::{LpmError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// One published `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Store copy of the package.
    pub resolve: PathBuf,
    /// Directories consuming this version.
    #[serde(default)]
    pub installations: BTreeSet<PathBuf>,
    /// Changes on every publish of this version.
    #[serde(default)]
    pub publish_signature: String,
}

/// The registry index: published entries plus the per-name version list.
///
/// `packages` and `version_tree` are kept in lockstep by every mutator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub packages: BTreeMap<String, RegistryEntry>,
    #[serde(default)]
    pub version_tree: BTreeMap<String, Vec<String>>,
}

/// Split `fullName@version` at its version separator.
///
/// The leading `@` of a scoped name is never taken as the separator.
#[must_use]
pub fn split_resolved_id(id: &str) -> Option<(&str, &str)> {
    match id.rfind('@') {
        Some(at) if at > 0 && at + 1 < id.len() => Some((&id[..at], &id[at + 1..])),
        _ => None,
    }
}

#[must_use]
pub fn resolved_id(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

impl Registry {
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.packages.get(id)
    }

    #[must_use]
    pub fn get(&self, name: &str, version: &str) -> Option<&RegistryEntry> {
        self.packages.get(&resolved_id(name, version))
    }

    /// Published versions of `name`, in publish order.
    #[must_use]
    pub fn versions(&self, name: &str) -> &[String] {
        self.version_tree
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_published(&self, name: &str) -> bool {
        !self.versions(name).is_empty()
    }

    /// Insert or replace `name@version`, keeping the existing installations.
    pub fn add_package(
        &mut self,
        name: &str,
        version: &str,
        resolve: PathBuf,
        publish_signature: String,
    ) -> RegistryEntry {
        let id = resolved_id(name, version);
        let installations = self
            .packages
            .remove(&id)
            .map(|previous| previous.installations)
            .unwrap_or_default();

        let entry = RegistryEntry {
            resolve,
            installations,
            publish_signature,
        };
        self.packages.insert(id, entry.clone());

        let versions = self.version_tree.entry(name.to_string()).or_default();
        if !versions.iter().any(|v| v == version) {
            versions.push(version.to_string());
        }
        entry
    }

    /// Remove `name@version`; the name leaves the version tree with its last version.
    pub fn remove_package(&mut self, name: &str, version: &str) -> Result<RegistryEntry> {
        let id = resolved_id(name, version);
        let entry = self
            .packages
            .remove(&id)
            .ok_or_else(|| LpmError::package_not_found(&id))?;

        if let Some(versions) = self.version_tree.get_mut(name) {
            versions.retain(|v| v != version);
            if versions.is_empty() {
                self.version_tree.remove(name);
            }
        }
        Ok(entry)
    }

    /// Record `dir` as consuming `id`. Returns whether it was newly added.
    pub fn add_installation(&mut self, id: &str, dir: &Path) -> Result<bool> {
        let entry = self
            .packages
            .get_mut(id)
            .ok_or_else(|| LpmError::package_not_found(id))?;
        Ok(entry.installations.insert(dir.to_path_buf()))
    }

    /// Forget `dir` as a consumer of `id`. Returns whether it was present.
    pub fn remove_installation(&mut self, id: &str, dir: &Path) -> Result<bool> {
        let entry = self
            .packages
            .get_mut(id)
            .ok_or_else(|| LpmError::package_not_found(id))?;
        Ok(entry.installations.remove(dir))
    }

    /// Versions of `name` that `dir` is recorded against.
    #[must_use]
    pub fn installed_versions(&self, name: &str, dir: &Path) -> Vec<String> {
        self.versions(name)
            .iter()
            .filter(|version| {
                self.get(name, version)
                    .is_some_and(|entry| entry.installations.contains(dir))
            })
            .cloned()
            .collect()
    }

    /// Every directory consuming any version of `name`.
    #[must_use]
    pub fn consumers(&self, name: &str) -> BTreeSet<PathBuf> {
        self.versions(name)
            .iter()
            .filter_map(|version| self.get(name, version))
            .flat_map(|entry| entry.installations.iter().cloned())
            .collect()
    }

    /// Entries whose installations include `dir`, keyed by resolved id.
    pub fn installed_in<'a>(
        &'a self,
        dir: &'a Path,
    ) -> impl Iterator<Item = (&'a String, &'a RegistryEntry)> + 'a {
        self.packages
            .iter()
            .filter(move |(_, entry)| entry.installations.contains(dir))
    }

    /// Check the `packages` / `version_tree` lockstep and installation paths.
    pub fn verify(&self) -> std::result::Result<(), String> {
        for (name, versions) in &self.version_tree {
            for version in versions {
                let id = resolved_id(name, version);
                if !self.packages.contains_key(&id) {
                    return Err(format!("versionTree lists {id} but packages has no entry"));
                }
            }
        }

        for (id, entry) in &self.packages {
            let Some((name, version)) = split_resolved_id(id) else {
                return Err(format!("malformed package key '{id}'"));
            };
            if !self.versions(name).iter().any(|v| v == version) {
                return Err(format!("packages has {id} but versionTree does not list it"));
            }
            if let Some(dir) = entry.installations.iter().find(|d| !d.is_absolute()) {
                return Err(format!(
                    "installation '{}' of {id} is not an absolute path",
                    dir.display()
                ));
            }
        }
        Ok(())
    }
}

/// Signature for a fresh publish of the package at `resolve`.
///
/// Mixes the content hash with the publish time so every publish yields a new value.
pub fn publish_signature(resolve: &Path) -> Result<String> {
    let content = if resolve.is_dir() {
        lpm_util::hash::blake3_dir(resolve, &[]).map_err(LpmError::io("hash", resolve))?
    } else {
        String::new()
    };
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let nonce = lpm_util::id::random_hex(8);
    let digest = lpm_util::hash::blake3_bytes(format!("{content}:{nanos}:{nonce}").as_bytes());
    Ok(digest[..16].to_string())
}

/// File-backed registry with snapshot-before-write.
///
/// Reads, writes and read-modify-write cycles are serialized within the
/// process; separate processes are not coordinated.
#[derive(Debug)]
pub struct RegistryStore {
    path: PathBuf,
    backups: BackupManager,
    lock: Mutex<()>,
}

impl RegistryStore {
    #[must_use]
    pub fn new(path: PathBuf, backups: BackupManager) -> Self {
        Self {
            path,
            backups,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.registry_path(),
            BackupManager::new(config.backup_dir(), config.max_backups),
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Load the registry, creating an empty one if the file is absent.
    ///
    /// Unparseable or inconsistent content is reported as corrupted.
    pub fn read(&self) -> Result<Registry> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_unlocked()
    }

    /// Snapshot the current file, then overwrite it with `registry`.
    pub fn write(&self, registry: &Registry) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_unlocked(registry)
    }

    fn read_unlocked(&self) -> Result<Registry> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = Registry::default();
                lpm_util::fs::write_creating_dirs(&self.path, &serialize(&empty, &self.path)?)
                    .map_err(LpmError::io("create", &self.path))?;
                debug!(path = %self.path.display(), "Created empty registry");
                return Ok(empty);
            }
            Err(e) => return Err(LpmError::io("read", &self.path)(e)),
        };
        parse_registry(&bytes, &self.path)
    }

    fn write_unlocked(&self, registry: &Registry) -> Result<()> {
        match std::fs::read(&self.path) {
            Ok(previous) => {
                self.backups.snapshot_before_write(&previous)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(LpmError::io("read", &self.path)(e)),
        }

        lpm_util::fs::write_creating_dirs(&self.path, &serialize(registry, &self.path)?)
            .map_err(LpmError::io("write", &self.path))?;
        debug!(
            path = %self.path.display(),
            packages = registry.packages.len(),
            "Wrote registry"
        );
        Ok(())
    }

    /// Read, apply `f`, and write back if anything changed.
    pub fn update<T>(&self, f: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut registry = self.read_unlocked()?;
        let before = registry.clone();
        let value = f(&mut registry)?;
        if registry != before {
            self.write_unlocked(&registry)?;
        }
        Ok(value)
    }

    /// Publish `name@version` located at `resolve` with a fresh signature.
    pub fn add_package(&self, name: &str, version: &str, resolve: &Path) -> Result<RegistryEntry> {
        let signature = publish_signature(resolve)?;
        let entry = self.update(|registry| {
            Ok(registry.add_package(name, version, resolve.to_path_buf(), signature))
        })?;
        debug!(
            name = %name,
            version = %version,
            installations = entry.installations.len(),
            "Added package"
        );
        Ok(entry)
    }

    pub fn remove_package(&self, name: &str, version: &str) -> Result<RegistryEntry> {
        let entry = self.update(|registry| registry.remove_package(name, version))?;
        debug!(name = %name, version = %version, "Removed package");
        Ok(entry)
    }

    pub fn add_installation(&self, id: &str, dir: &Path) -> Result<bool> {
        let added = self.update(|registry| registry.add_installation(id, dir))?;
        if added {
            debug!(id = %id, dir = %dir.display(), "Added installation");
        }
        Ok(added)
    }

    pub fn remove_installation(&self, id: &str, dir: &Path) -> Result<bool> {
        let removed = self.update(|registry| registry.remove_installation(id, dir))?;
        if removed {
            debug!(id = %id, dir = %dir.display(), "Removed installation");
        }
        Ok(removed)
    }

    /// Replace the live registry with backup `id` without snapshotting it first.
    pub fn revert(&self, id: &str) -> Result<Registry> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.backups.revert(id, &self.path)
    }
}

/// Parse and verify registry bytes; any failure means corruption.
pub fn parse_registry(bytes: &[u8], path: &Path) -> Result<Registry> {
    let registry: Registry =
        serde_json::from_slice(bytes).map_err(|e| LpmError::corrupted(path, e.to_string()))?;
    registry
        .verify()
        .map_err(|reason| LpmError::corrupted(path, reason))?;
    Ok(registry)
}

fn serialize(registry: &Registry, path: &Path) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(registry).map_err(LpmError::json("serialize", path))?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(home: &Path) -> RegistryStore {
        RegistryStore::new(
            home.join("registry.json"),
            BackupManager::new(home.join("backups"), 10),
        )
    }

    #[test]
    fn test_split_resolved_id() {
        assert_eq!(split_resolved_id("ui@1.0.0"), Some(("ui", "1.0.0")));
        assert_eq!(split_resolved_id("@acme/ui@1.0.0"), Some(("@acme/ui", "1.0.0")));
        assert_eq!(split_resolved_id("@acme/ui"), None);
        assert_eq!(split_resolved_id("ui@"), None);
    }

    #[test]
    fn test_add_package_preserves_installations() {
        let mut registry = Registry::default();
        registry.add_package("ui", "1.0.0", PathBuf::from("/s/ui/1.0.0"), "a".into());
        registry
            .add_installation("ui@1.0.0", Path::new("/proj"))
            .unwrap();

        let entry = registry.add_package("ui", "1.0.0", PathBuf::from("/s2"), "b".into());
        assert_eq!(entry.installations, BTreeSet::from([PathBuf::from("/proj")]));
        assert_eq!(entry.publish_signature, "b");
        assert_eq!(registry.versions("ui"), ["1.0.0".to_string()]);
    }

    #[test]
    fn test_remove_last_version_drops_tree_key() {
        let mut registry = Registry::default();
        registry.add_package("ui", "1.0.0", PathBuf::from("/a"), "s".into());
        registry.add_package("ui", "2.0.0", PathBuf::from("/b"), "s".into());

        registry.remove_package("ui", "1.0.0").unwrap();
        assert_eq!(registry.versions("ui"), ["2.0.0".to_string()]);

        registry.remove_package("ui", "2.0.0").unwrap();
        assert!(!registry.version_tree.contains_key("ui"));
        assert!(registry.verify().is_ok());
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut registry = Registry::default();
        let err = registry.remove_package("ui", "1.0.0").unwrap_err();
        assert!(matches!(err, LpmError::NotFound { .. }));
    }

    #[test]
    fn test_installation_on_missing_entry_fails() {
        let mut registry = Registry::default();
        assert!(registry
            .add_installation("ui@1.0.0", Path::new("/p"))
            .is_err());
        assert!(registry
            .remove_installation("ui@1.0.0", Path::new("/p"))
            .is_err());
    }

    #[test]
    fn test_consumers_span_versions() {
        let mut registry = Registry::default();
        registry.add_package("ui", "1.0.0", PathBuf::from("/a"), "s".into());
        registry.add_package("ui", "2.0.0", PathBuf::from("/b"), "s".into());
        registry.add_installation("ui@1.0.0", Path::new("/p1")).unwrap();
        registry.add_installation("ui@2.0.0", Path::new("/p2")).unwrap();

        let consumers = registry.consumers("ui");
        assert_eq!(consumers.len(), 2);
        assert_eq!(
            registry.installed_versions("ui", Path::new("/p2")),
            vec!["2.0.0".to_string()]
        );
    }

    #[test]
    fn test_verify_detects_divergence() {
        let mut registry = Registry::default();
        registry.add_package("ui", "1.0.0", PathBuf::from("/a"), "s".into());
        registry.version_tree.insert("ui".into(), vec!["1.0.0".into(), "2.0.0".into()]);
        assert!(registry.verify().unwrap_err().contains("ui@2.0.0"));

        let mut registry = Registry::default();
        registry.add_package("ui", "1.0.0", PathBuf::from("/a"), "s".into());
        registry.version_tree.clear();
        assert!(registry.verify().is_err());
    }

    #[test]
    fn test_read_creates_empty_file() {
        let home = tempdir().unwrap();
        let store = store_in(home.path());

        let registry = store.read().unwrap();
        assert!(registry.packages.is_empty());

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({ "packages": {}, "versionTree": {} }));
    }

    #[test]
    fn test_read_corrupted() {
        let home = tempdir().unwrap();
        let store = store_in(home.path());

        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.read().unwrap_err(), LpmError::Corrupted { .. }));

        std::fs::write(store.path(), r#"{ "versionTree": {} }"#).unwrap();
        let err = store.read().unwrap_err();
        assert!(matches!(err, LpmError::Corrupted { .. }));
        assert!(err.hint().unwrap().contains("revert"));
    }

    #[test]
    fn test_write_read_round_trip() {
        let home = tempdir().unwrap();
        let store = store_in(home.path());
        store.add_package("@acme/ui", "1.0.0", Path::new("/s")).unwrap();
        store
            .add_installation("@acme/ui@1.0.0", Path::new("/proj"))
            .unwrap();

        let before = std::fs::read(store.path()).unwrap();
        let registry = store.read().unwrap();
        store.write(&registry).unwrap();
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_write_snapshots_previous_state() {
        let home = tempdir().unwrap();
        let store = store_in(home.path());
        store.read().unwrap();
        let empty = std::fs::read(store.path()).unwrap();

        store.add_package("ui", "1.0.0", Path::new("/s")).unwrap();

        let backups = store.backups().list().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read(&backups[0].path).unwrap(), empty);
    }

    #[test]
    fn test_republish_changes_signature() {
        let home = tempdir().unwrap();
        let pkg = home.path().join("pkg");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("index.js"), "x").unwrap();
        let store = store_in(home.path());

        let first = store.add_package("ui", "1.0.0", &pkg).unwrap();
        let second = store.add_package("ui", "1.0.0", &pkg).unwrap();
        assert_ne!(first.publish_signature, second.publish_signature);
    }

    #[test]
    fn test_unchanged_update_skips_write() {
        let home = tempdir().unwrap();
        let store = store_in(home.path());
        store.add_package("ui", "1.0.0", Path::new("/s")).unwrap();
        store.add_installation("ui@1.0.0", Path::new("/p")).unwrap();
        let count = store.backups().list().unwrap().len();

        assert!(!store.add_installation("ui@1.0.0", Path::new("/p")).unwrap());
        assert_eq!(store.backups().list().unwrap().len(), count);
    }
}
