//! Installation tracking: who consumes which published package.
//!
//! Every operation that changes a directory's installations regenerates that
//! directory's lock file and rewrites its descriptor entry. Push walks the
//! graph package -> consuming directories -> packages those directories
//! publish, with a visited set so a cycle is reported instead of followed.

use super::descriptor::{DescriptorStore, PackageJson};
use super::executor::{
    CommandExecutor, DependencySpecifier, PackageManagerExecutor, PackageManagerKind,
};
use super::lockfile::{
    self, DependencyScope, InstallType, LockEntry, LockFile, LockIssue, LockMetadata,
};
use super::packer::{DirectoryPacker, Packer};
use super::reference::{ReferenceCache, VersionSymbol};
use super::registry::{resolved_id, Registry, RegistryEntry, RegistryStore};
use super::resolve::VersionRequest;
use crate::config::Config;
use crate::error::{LpmError, Result};
use crate::paths;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Per-consumer choices for [`Tracker::add`].
///
/// Unset fields keep what the directory's lock file already records.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub scope: Option<DependencyScope>,
    pub install_type: Option<InstallType>,
    /// Overrides the symbol written in the reference.
    pub symbol: Option<VersionSymbol>,
    pub traverse_imports: Option<bool>,
    /// Only update bookkeeping; do not run the package manager.
    pub skip_install: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub name: String,
    pub version: String,
    pub resolve: PathBuf,
    pub publish_signature: String,
    pub installations: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    pub name: String,
    pub version: String,
    pub entry: LockEntry,
    /// Added because an imported package's lock file lists it.
    pub traversed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeOutcome {
    pub name: String,
    /// Previously locked version, if known.
    pub from: Option<String>,
    pub to: String,
}

/// One consuming directory brought up to date by a push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTarget {
    pub package: String,
    pub dir: PathBuf,
    pub version: String,
    /// Package the directory itself publishes, republished as part of the push.
    pub republished: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFailure {
    pub package: String,
    pub dir: PathBuf,
    pub code: &'static str,
    pub message: String,
}

/// A republish that led back to an already pushed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushCycle {
    pub from: String,
    pub to: String,
}

/// Result of a push: what was updated, what failed, where cycles closed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    /// Packages pushed, in traversal order.
    pub packages: Vec<String>,
    pub updated: Vec<PushTarget>,
    pub failures: Vec<PushFailure>,
    pub cycles: Vec<PushCycle>,
}

impl PushReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives registry, lock files, descriptors and the package manager together.
pub struct Tracker {
    store: RegistryStore,
    home: PathBuf,
    jobs: usize,
    descriptors: Box<dyn DescriptorStore>,
    executor: Box<dyn PackageManagerExecutor>,
    packer: Box<dyn Packer>,
    refs: ReferenceCache,
}

impl Tracker {
    #[must_use]
    pub fn new(store: RegistryStore, home: PathBuf) -> Self {
        Self {
            store,
            home,
            jobs: 1,
            descriptors: Box::new(PackageJson),
            executor: Box::new(CommandExecutor::new(PackageManagerKind::default())),
            packer: Box::new(DirectoryPacker),
            refs: ReferenceCache::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(RegistryStore::from_config(config), config.home.clone())
            .with_jobs(config.jobs)
            .with_executor(CommandExecutor::new(config.package_manager))
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    #[must_use]
    pub fn with_descriptors(mut self, descriptors: impl DescriptorStore + 'static) -> Self {
        self.descriptors = Box::new(descriptors);
        self
    }

    #[must_use]
    pub fn with_executor(mut self, executor: impl PackageManagerExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    #[must_use]
    pub fn with_packer(mut self, packer: impl Packer + 'static) -> Self {
        self.packer = Box::new(packer);
        self
    }

    #[must_use]
    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Copy the package in `dir` into the store and record it.
    ///
    /// Republishing keeps the existing installations and changes the signature.
    pub fn publish(&self, dir: &Path) -> Result<PublishOutcome> {
        let dir = paths::normalize_dir(dir);
        let descriptor = self.descriptors.read(&dir)?;
        let (name, version) = descriptor.identity(&dir)?;
        let reference = self.refs.parse(name)?;
        let full_name = reference.full_name();

        let dest = paths::package_store_dir(&self.home, &full_name, version);
        self.packer.pack(&dir, &dest)?;
        let entry = self.store.add_package(&full_name, version, &dest)?;
        debug!(name = %full_name, version = %version, "Published package");

        Ok(PublishOutcome {
            name: full_name,
            version: version.to_string(),
            resolve: entry.resolve,
            publish_signature: entry.publish_signature,
            installations: entry.installations,
        })
    }

    /// Remove a published version and its store copy.
    ///
    /// A reference without a version removes the highest published one. The
    /// returned entry lists the directories left consuming a missing package.
    pub fn unpublish(&self, reference: &str) -> Result<RegistryEntry> {
        let reference = self.refs.parse(reference)?;
        let name = reference.full_name();
        let version = if reference.is_latest() {
            let registry = self.store.read()?;
            resolve_version(&registry, &name, &VersionRequest::Latest)?
        } else {
            reference.version.clone()
        };

        let entry = self.store.remove_package(&name, &version)?;
        if entry.resolve.starts_with(paths::store_dir(&self.home)) {
            self.packer.remove(&entry.resolve)?;
        }
        for dir in &entry.installations {
            warn!(
                name = %name,
                version = %version,
                dir = %dir.display(),
                "Unpublished package is still installed"
            );
        }
        Ok(entry)
    }

    /// Install a published package into `dir`.
    pub fn add(&self, reference: &str, dir: &Path, options: &AddOptions) -> Result<Vec<AddOutcome>> {
        let dir = paths::normalize_dir(dir);
        let reference = self.refs.parse_with(reference, None, options.symbol)?;
        let name = reference.full_name();

        let registry = self.store.read()?;
        let version = resolve_version(&registry, &name, &reference.request())?;

        let previous = LockFile::read(&dir)?
            .and_then(|lock| lock.get(&name).map(LockEntry::metadata))
            .unwrap_or_default();
        let metadata = LockMetadata {
            dependency_scope: options.scope.unwrap_or(previous.dependency_scope),
            semver_symbol: reference.version_symbol,
            install_type: options.install_type.unwrap_or(previous.install_type),
            traverse_imports: options
                .traverse_imports
                .unwrap_or(previous.traverse_imports),
        };

        let entry = self.install_into(&dir, &name, &version, metadata, !options.skip_install)?;
        let traverse = metadata.traverse_imports && metadata.install_type == InstallType::Import;
        let resolve = entry.resolve.clone();

        let mut outcomes = vec![AddOutcome {
            name: name.clone(),
            version,
            entry,
            traversed: false,
        }];
        if traverse {
            outcomes.extend(self.add_imports(&dir, &name, &resolve, options.skip_install)?);
        }
        Ok(outcomes)
    }

    /// Add what the lock files of imported packages list, breadth first.
    fn add_imports(
        &self,
        dir: &Path,
        root: &str,
        resolve: &Path,
        skip_install: bool,
    ) -> Result<Vec<AddOutcome>> {
        let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
        let mut queue: VecDeque<PathBuf> = VecDeque::from([resolve.to_path_buf()]);
        let mut outcomes = Vec::new();

        while let Some(source) = queue.pop_front() {
            let Some(lock) = LockFile::read(&source)? else {
                continue;
            };
            for (name, locked) in lock.pkgs {
                if !visited.insert(name.clone()) {
                    continue;
                }

                let registry = self.store.read()?;
                let request = locked_request(&registry, &name, &locked);
                let version = match resolve_version(&registry, &name, &request) {
                    Ok(version) => version,
                    Err(e) => {
                        warn!(name = %name, source = %source.display(), error = %e, "Skipping import");
                        continue;
                    }
                };

                let metadata = locked.metadata();
                let entry = self.install_into(dir, &name, &version, metadata, !skip_install)?;
                if metadata.traverse_imports && metadata.install_type == InstallType::Import {
                    queue.push_back(entry.resolve.clone());
                }
                outcomes.push(AddOutcome {
                    name,
                    version,
                    entry,
                    traversed: true,
                });
            }
        }
        Ok(outcomes)
    }

    /// Stop consuming `name` (any version) in `dir`.
    pub fn remove(&self, name: &str, dir: &Path) -> Result<LockFile> {
        let dir = paths::normalize_dir(dir);
        let name = self.refs.parse(name)?.full_name();

        self.store.update(|registry| {
            let versions = registry.installed_versions(&name, &dir);
            if versions.is_empty() {
                return Err(LpmError::not_found(
                    "installation",
                    format!("{name} in {}", dir.display()),
                ));
            }
            for version in versions {
                registry.remove_installation(&resolved_id(&name, &version), &dir)?;
            }
            Ok(())
        })?;
        debug!(name = %name, dir = %dir.display(), "Removed installation");

        let lock = lockfile::generate(&self.store, &dir, &BTreeMap::new())?;
        match self.descriptors.remove_dependency(&dir, &name) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!(dir = %dir.display(), error = %e, "No descriptor to update");
            }
            Err(e) => return Err(e),
        }
        Ok(lock)
    }

    /// Move locked packages to the best version their recorded range allows.
    ///
    /// With `latest`, the recorded range is ignored. Entries whose range matches
    /// nothing are skipped with a warning.
    pub fn upgrade(
        &self,
        name: Option<&str>,
        dir: &Path,
        latest: bool,
        skip_install: bool,
    ) -> Result<Vec<UpgradeOutcome>> {
        let dir = paths::normalize_dir(dir);
        let lock = LockFile::read_required(&dir)?;

        let names: Vec<String> = match name {
            Some(name) => {
                let name = self.refs.parse(name)?.full_name();
                if lock.get(&name).is_none() {
                    return Err(LpmError::not_found(
                        "lock entry",
                        format!("{name} in {}", dir.display()),
                    ));
                }
                vec![name]
            }
            None => lock.pkgs.keys().cloned().collect(),
        };

        let mut outcomes = Vec::new();
        for name in names {
            let Some(locked) = lock.get(&name) else {
                continue;
            };
            let registry = self.store.read()?;
            let current = locked_version(&registry, &name, locked);
            let request = if latest {
                VersionRequest::Latest
            } else {
                locked_request(&registry, &name, locked)
            };

            let Some(target) = request.highest(registry.versions(&name)) else {
                warn!(name = %name, request = %request, "No published version satisfies");
                continue;
            };
            if current.as_deref() == Some(target.as_str()) {
                continue;
            }

            self.install_into(&dir, &name, &target, locked.metadata(), !skip_install)?;
            debug!(name = %name, from = ?current, to = %target, "Upgraded package");
            outcomes.push(UpgradeOutcome {
                name,
                from: current,
                to: target,
            });
        }
        Ok(outcomes)
    }

    /// Bring one locked package in `dir` up to date with the registry.
    pub fn pull(&self, name: &str, dir: &Path, skip_install: bool) -> Result<UpgradeOutcome> {
        let dir = paths::normalize_dir(dir);
        let name = self.refs.parse(name)?.full_name();
        let lock = LockFile::read_required(&dir)?;
        let locked = lock.get(&name).ok_or_else(|| {
            LpmError::not_found("lock entry", format!("{name} in {}", dir.display()))
        })?;

        let registry = self.store.read()?;
        let current = locked_version(&registry, &name, locked);
        let version = resolve_version(&registry, &name, &locked_request(&registry, &name, locked))?;

        self.install_into(&dir, &name, &version, locked.metadata(), !skip_install)?;
        debug!(name = %name, dir = %dir.display(), version = %version, "Pulled package");
        Ok(UpgradeOutcome {
            name,
            from: current,
            to: version,
        })
    }

    /// Propagate a package to every directory consuming any of its versions.
    ///
    /// Consumers run on a pool of `jobs` workers. A failing directory is
    /// recorded in the report and does not stop the others. Consumers that are
    /// themselves published are republished and pushed in turn.
    pub fn push(&self, reference: &str, skip_install: bool) -> Result<PushReport> {
        let root = self.refs.parse(reference)?.full_name();
        if !self.store.read()?.is_published(&root) {
            return Err(LpmError::package_not_found(root));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| LpmError::other(format!("failed to start push workers: {e}")))?;

        let mut report = PushReport::default();
        let mut visited: HashSet<String> = HashSet::from([root.clone()]);
        let mut queue: VecDeque<String> = VecDeque::from([root]);

        while let Some(package) = queue.pop_front() {
            let targets: Vec<PathBuf> = self.store.read()?.consumers(&package).into_iter().collect();
            debug!(package = %package, targets = targets.len(), "Pushing package");

            let results: Vec<(PathBuf, Result<PushTarget>)> = pool.install(|| {
                targets
                    .par_iter()
                    .map(|dir| (dir.clone(), self.push_into(&package, dir, skip_install)))
                    .collect()
            });

            for (dir, result) in results {
                match result {
                    Ok(target) => {
                        if let Some(published) = &target.republished {
                            if visited.insert(published.clone()) {
                                queue.push_back(published.clone());
                            } else {
                                warn!(from = %package, to = %published, "Push cycle detected");
                                report.cycles.push(PushCycle {
                                    from: package.clone(),
                                    to: published.clone(),
                                });
                            }
                        }
                        report.updated.push(target);
                    }
                    Err(e) => {
                        warn!(package = %package, dir = %dir.display(), error = %e, "Push failed");
                        report.failures.push(PushFailure {
                            package: package.clone(),
                            dir,
                            code: e.code(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            report.packages.push(package);
        }

        Ok(report)
    }

    fn push_into(&self, package: &str, dir: &Path, skip_install: bool) -> Result<PushTarget> {
        let locked = LockFile::read(dir)?.and_then(|lock| lock.pkgs.get(package).cloned());
        let registry = self.store.read()?;
        let request = locked
            .as_ref()
            .map_or(VersionRequest::Latest, |l| locked_request(&registry, package, l));
        let version = resolve_version(&registry, package, &request)?;
        let metadata = locked.as_ref().map(LockEntry::metadata).unwrap_or_default();

        self.install_into(dir, package, &version, metadata, !skip_install)?;

        let republished = match self.published_identity(&registry, dir) {
            Some(name) => {
                self.publish(dir)?;
                Some(name)
            }
            None => None,
        };

        Ok(PushTarget {
            package: package.to_string(),
            dir: dir.to_path_buf(),
            version,
            republished,
        })
    }

    /// Name of the package `dir` publishes, if that exact version is in the registry.
    fn published_identity(&self, registry: &Registry, dir: &Path) -> Option<String> {
        let descriptor = self.descriptors.read(dir).ok()?;
        let (name, version) = descriptor.identity(dir).ok()?;
        let name = self.refs.parse(name).ok()?.full_name();
        registry.get(&name, version).map(|_| name)
    }

    /// Regenerate the lock file of `dir` from the registry.
    pub fn regenerate_lock(&self, dir: &Path) -> Result<LockFile> {
        lockfile::generate(&self.store, &paths::normalize_dir(dir), &BTreeMap::new())
    }

    /// Compare the lock file of `dir` with the registry without changing either.
    pub fn check(&self, dir: &Path) -> Result<Vec<LockIssue>> {
        let dir = paths::normalize_dir(dir);
        let registry = self.store.read()?;
        let issues = lockfile::check(&registry, &dir)?;
        for issue in &issues {
            warn!(dir = %dir.display(), "{issue}");
        }
        Ok(issues)
    }

    /// Consuming directories per version.
    ///
    /// A reference without a version lists every published version.
    pub fn installations(&self, reference: &str) -> Result<BTreeMap<String, BTreeSet<PathBuf>>> {
        let reference = self.refs.parse(reference)?;
        let name = reference.full_name();
        let registry = self.store.read()?;

        if reference.is_latest() {
            if !registry.is_published(&name) {
                return Err(LpmError::package_not_found(name));
            }
            return Ok(registry
                .versions(&name)
                .iter()
                .filter_map(|v| {
                    registry
                        .get(&name, v)
                        .map(|e| (v.clone(), e.installations.clone()))
                })
                .collect());
        }

        let entry = registry
            .get(&name, &reference.version)
            .ok_or_else(|| LpmError::package_not_found(reference.resolved_id()))?;
        Ok(BTreeMap::from([(
            reference.version.clone(),
            entry.installations.clone(),
        )]))
    }

    /// Record `dir` against exactly `name@version`, then refresh its lock
    /// file, descriptor entry and installed files.
    fn install_into(
        &self,
        dir: &Path,
        name: &str,
        version: &str,
        metadata: LockMetadata,
        run_install: bool,
    ) -> Result<LockEntry> {
        let id = resolved_id(name, version);
        self.store.update(|registry| {
            for other in registry.installed_versions(name, dir) {
                if other != version {
                    registry.remove_installation(&resolved_id(name, &other), dir)?;
                    debug!(name = %name, from = %other, to = %version, dir = %dir.display(), "Moved installation");
                }
            }
            registry.add_installation(&id, dir)
        })?;

        let overrides = BTreeMap::from([(name.to_string(), metadata)]);
        let lock = lockfile::generate(&self.store, dir, &overrides)?;
        let entry = lock
            .get(name)
            .cloned()
            .ok_or_else(|| LpmError::package_not_found(&id))?;

        let spec = DependencySpecifier {
            name: name.to_string(),
            source: entry.resolve.clone(),
            install_type: metadata.install_type,
            scope: metadata.dependency_scope,
        };
        self.descriptors
            .set_dependency(dir, metadata.dependency_scope, name, &spec.descriptor_value())?;
        if run_install {
            self.executor.install(dir, &[spec])?;
        }
        Ok(entry)
    }
}

/// Pick the version `request` selects among the published versions of `name`.
fn resolve_version(registry: &Registry, name: &str, request: &VersionRequest) -> Result<String> {
    let known = registry.versions(name);
    if known.is_empty() {
        return Err(LpmError::package_not_found(name));
    }
    request
        .highest(known)
        .ok_or_else(|| LpmError::unresolvable(name, request.to_string()))
}

/// Version a lock entry points at, recovered from its store path for older lock files.
fn locked_version(registry: &Registry, name: &str, locked: &LockEntry) -> Option<String> {
    if !locked.version.is_empty() {
        return Some(locked.version.clone());
    }
    registry
        .versions(name)
        .iter()
        .find(|v| {
            registry
                .get(name, v)
                .is_some_and(|entry| entry.resolve == locked.resolve)
        })
        .cloned()
}

/// The range a lock entry records: its symbol applied to its version.
fn locked_request(registry: &Registry, name: &str, locked: &LockEntry) -> VersionRequest {
    locked_version(registry, name, locked).map_or(VersionRequest::Latest, |version| {
        VersionRequest::from_parts(locked.semver_symbol, &version)
    })
}
