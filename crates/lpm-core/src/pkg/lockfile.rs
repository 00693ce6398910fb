//! Per-directory lock files.
//!
//! A lock file is a point-in-time view of the registry entries that list its
//! directory as an installation. Per-consumer choices (dependency scope,
//! version symbol, install type, traversal) live only here and are carried
//! over from the previous lock file on every regeneration.
//!
//! ## File Format
//!
//! ```json
//! {
//!   "pkgs": {
//!     "@acme/ui": {
//!       "resolve": "/home/me/.lpm/store/@acme/ui/1.2.0",
//!       "publishSignature": "9f2c41d0a7b3e815",
//!       "dependencyScope": "dependencies",
//!       "semverSymbol": "^",
//!       "installType": "import",
//!       "traverseImports": false,
//!       "version": "1.2.0"
//!     }
//!   }
//! }
//! ```

use super::reference::VersionSymbol;
use super::registry::{split_resolved_id, Registry, RegistryEntry, RegistryStore};
use crate::error::{LpmError, Result};
use crate::paths;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Lock file name.
pub const LOCKFILE_NAME: &str = "lpm.lock";

/// Which package.json dependency field an entry belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum DependencyScope {
    #[default]
    Dependencies,
    DevDependencies,
    PeerDependencies,
    OptionalDependencies,
}

impl DependencyScope {
    /// The package.json field name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::DevDependencies => "devDependencies",
            Self::PeerDependencies => "peerDependencies",
            Self::OptionalDependencies => "optionalDependencies",
        }
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dependencies" | "prod" => Ok(Self::Dependencies),
            "devDependencies" | "dev" => Ok(Self::DevDependencies),
            "peerDependencies" | "peer" => Ok(Self::PeerDependencies),
            "optionalDependencies" | "optional" => Ok(Self::OptionalDependencies),
            other => Err(format!("unknown dependency scope '{other}'")),
        }
    }
}

/// How a package reaches the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallType {
    /// Symlinked to the store copy.
    Link,
    /// Copied from the store copy by the package manager.
    #[default]
    Import,
}

impl InstallType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Import => "import",
        }
    }
}

/// One locked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub resolve: PathBuf,
    #[serde(default)]
    pub publish_signature: String,
    #[serde(default)]
    pub dependency_scope: DependencyScope,
    #[serde(default)]
    pub semver_symbol: VersionSymbol,
    #[serde(default)]
    pub install_type: InstallType,
    #[serde(default)]
    pub traverse_imports: bool,
    /// Resolved version; empty in lock files written before it was recorded.
    #[serde(default)]
    pub version: String,
}

/// The per-consumer part of a [`LockEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockMetadata {
    pub dependency_scope: DependencyScope,
    pub semver_symbol: VersionSymbol,
    pub install_type: InstallType,
    pub traverse_imports: bool,
}

impl LockEntry {
    #[must_use]
    pub fn from_registry(version: &str, entry: &RegistryEntry, metadata: LockMetadata) -> Self {
        Self {
            resolve: entry.resolve.clone(),
            publish_signature: entry.publish_signature.clone(),
            dependency_scope: metadata.dependency_scope,
            semver_symbol: metadata.semver_symbol,
            install_type: metadata.install_type,
            traverse_imports: metadata.traverse_imports,
            version: version.to_string(),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> LockMetadata {
        LockMetadata {
            dependency_scope: self.dependency_scope,
            semver_symbol: self.semver_symbol,
            install_type: self.install_type,
            traverse_imports: self.traverse_imports,
        }
    }
}

/// A directory's lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    #[serde(default)]
    pub pkgs: BTreeMap<String, LockEntry>,
}

impl LockFile {
    /// Read the lock file of `dir`, or `None` if it has none.
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = paths::lock_path(dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LpmError::io("read", &path)(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(LpmError::json("parse", &path))
    }

    /// Read the lock file of `dir`, failing if it has none.
    pub fn read_required(dir: &Path) -> Result<Self> {
        Self::read(dir)?.ok_or_else(|| {
            LpmError::not_found("lock file", paths::lock_path(dir).display().to_string())
        })
    }

    /// Replace the lock file of `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let path = paths::lock_path(dir);
        let mut content =
            serde_json::to_string_pretty(self).map_err(LpmError::json("serialize", &path))?;
        content.push('\n');
        lpm_util::fs::atomic_write(&path, content.as_bytes()).map_err(LpmError::io("write", &path))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LockEntry> {
        self.pkgs.get(name)
    }

    /// Derive the lock file of `dir` from `registry`.
    ///
    /// Metadata comes from `overrides`, else the `previous` lock file, else
    /// defaults. If `dir` is recorded against several versions of one name,
    /// the highest version is locked.
    #[must_use]
    pub fn derive(
        registry: &Registry,
        dir: &Path,
        previous: Option<&LockFile>,
        overrides: &BTreeMap<String, LockMetadata>,
    ) -> Self {
        let mut pkgs: BTreeMap<String, LockEntry> = BTreeMap::new();

        for (id, entry) in registry.installed_in(dir) {
            let Some((name, version)) = split_resolved_id(id) else {
                continue;
            };

            if let Some(existing) = pkgs.get(name) {
                warn!(
                    name = %name,
                    kept = %max_version(&existing.version, version),
                    dir = %dir.display(),
                    "Directory is installed against several versions"
                );
                if max_version(&existing.version, version) == existing.version {
                    continue;
                }
            }

            let metadata = overrides
                .get(name)
                .copied()
                .or_else(|| previous.and_then(|p| p.get(name)).map(LockEntry::metadata))
                .unwrap_or_default();
            pkgs.insert(
                name.to_string(),
                LockEntry::from_registry(version, entry, metadata),
            );
        }

        Self { pkgs }
    }
}

fn max_version<'a>(a: &'a str, b: &'a str) -> &'a str {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => {
            if vb > va {
                b
            } else {
                a
            }
        }
        _ => a.max(b),
    }
}

/// Regenerate and write the lock file of `dir` from the current registry.
///
/// A directory with no installations still gets a lock file with no packages.
pub fn generate(
    store: &RegistryStore,
    dir: &Path,
    overrides: &BTreeMap<String, LockMetadata>,
) -> Result<LockFile> {
    let registry = store.read()?;
    let previous = LockFile::read(dir)?;
    let lock = LockFile::derive(&registry, dir, previous.as_ref(), overrides);
    lock.write(dir)?;
    debug!(dir = %dir.display(), packages = lock.pkgs.len(), "Wrote lock file");
    Ok(lock)
}

/// A disagreement between a lock file and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LockIssue {
    /// The package was republished after the lock was written.
    Stale {
        name: String,
        version: String,
        locked: String,
        current: String,
    },
    /// The locked package is no longer in the registry.
    NotPublished { name: String, version: String },
    /// The registry does not record the directory as a consumer.
    MissingInstallation { name: String, version: String },
    /// The registry records the directory but the lock lacks the package.
    Untracked { name: String, version: String },
}

impl LockIssue {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Stale { name, .. }
            | Self::NotPublished { name, .. }
            | Self::MissingInstallation { name, .. }
            | Self::Untracked { name, .. } => name,
        }
    }
}

impl fmt::Display for LockIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale { name, version, .. } => {
                write!(f, "{name}@{version} was republished since it was locked")
            }
            Self::NotPublished { name, version } if version.is_empty() => {
                write!(f, "{name} is not published")
            }
            Self::NotPublished { name, version } => write!(f, "{name}@{version} is not published"),
            Self::MissingInstallation { name, version } => write!(
                f,
                "{name}@{version} is locked but the registry does not list this directory"
            ),
            Self::Untracked { name, version } => write!(
                f,
                "{name}@{version} lists this directory but is missing from the lock file"
            ),
        }
    }
}

/// Compare the lock file of `dir` with `registry`.
pub fn check(registry: &Registry, dir: &Path) -> Result<Vec<LockIssue>> {
    let lock = LockFile::read_required(dir)?;
    let mut issues = Vec::new();

    for (name, locked) in &lock.pkgs {
        let found = if locked.version.is_empty() {
            registry.versions(name).iter().find_map(|version| {
                registry
                    .get(name, version)
                    .filter(|entry| entry.resolve == locked.resolve)
                    .map(|entry| (version.clone(), entry))
            })
        } else {
            registry
                .get(name, &locked.version)
                .map(|entry| (locked.version.clone(), entry))
        };

        let Some((version, entry)) = found else {
            issues.push(LockIssue::NotPublished {
                name: name.clone(),
                version: locked.version.clone(),
            });
            continue;
        };

        if !entry.installations.contains(dir) {
            issues.push(LockIssue::MissingInstallation {
                name: name.clone(),
                version: version.clone(),
            });
        }
        if entry.publish_signature != locked.publish_signature {
            issues.push(LockIssue::Stale {
                name: name.clone(),
                version,
                locked: locked.publish_signature.clone(),
                current: entry.publish_signature.clone(),
            });
        }
    }

    for (id, _) in registry.installed_in(dir) {
        if let Some((name, version)) = split_resolved_id(id) {
            if !lock.pkgs.contains_key(name) {
                issues.push(LockIssue::Untracked {
                    name: name.to_string(),
                    version: version.to_string(),
                });
            }
        }
    }

    Ok(issues)
}
