//! End-to-end bookkeeping scenarios against a temporary lpm home.

use lpm_core::pkg::{
    AddOptions, BackupManager, LockFile, NoopExecutor, RegistryStore, Tracker,
};
use lpm_core::{Config, LpmError};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Env {
    _tmp: TempDir,
    config: Config,
    work: PathBuf,
}

impl Env {
    fn new(max_backups: usize) -> Self {
        let tmp = TempDir::new().unwrap();
        let work = dunce::canonicalize(tmp.path()).unwrap().join("work");
        fs::create_dir_all(&work).unwrap();
        let config = Config::new(work.clone())
            .with_home(tmp.path().join("home"))
            .with_max_backups(max_backups)
            .with_jobs(3);
        Self {
            _tmp: tmp,
            config,
            work,
        }
    }

    fn tracker(&self) -> Tracker {
        Tracker::from_config(&self.config).with_executor(NoopExecutor)
    }

    fn dir(&self, name: &str, package_json: &str) -> PathBuf {
        let dir = self.work.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), package_json).unwrap();
        dir
    }
}

fn backup_count(config: &Config) -> usize {
    BackupManager::new(config.backup_dir(), config.max_backups)
        .list()
        .unwrap()
        .len()
}

#[test]
fn test_publish_then_add_links_registry_and_lock() {
    let env = Env::new(10);
    let tracker = env.tracker();
    let pkg = env.dir("pkg-a", r#"{ "name": "pkgA", "version": "1.0.0" }"#);
    let proj = env.dir("proj", r#"{ "name": "proj" }"#);

    tracker.publish(&pkg).unwrap();
    let registry = tracker.store().read().unwrap();
    assert_eq!(registry.packages.len(), 1);
    assert!(registry.get("pkgA", "1.0.0").unwrap().installations.is_empty());

    tracker.add("pkgA", &proj, &AddOptions::default()).unwrap();

    let registry = tracker.store().read().unwrap();
    let entry = registry.get("pkgA", "1.0.0").unwrap();
    assert_eq!(entry.installations.len(), 1);
    assert!(entry.installations.contains(&proj));

    let lock = LockFile::read(&proj).unwrap().unwrap();
    assert_eq!(lock.get("pkgA").unwrap().resolve, entry.resolve);
}

#[test]
fn test_unpublish_leaves_empty_lock_and_not_found() {
    let env = Env::new(10);
    let tracker = env.tracker();
    let pkg = env.dir("pkg-a", r#"{ "name": "pkgA", "version": "1.0.0" }"#);
    let proj = env.dir("proj", r#"{ "name": "proj" }"#);
    tracker.publish(&pkg).unwrap();
    tracker.add("pkgA", &proj, &AddOptions::default()).unwrap();

    tracker.unpublish("pkgA@1.0.0").unwrap();

    let lock = tracker.regenerate_lock(&proj).unwrap();
    assert!(lock.pkgs.is_empty());
    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(proj.join("lpm.lock")).unwrap()).unwrap();
    assert_eq!(on_disk, serde_json::json!({ "pkgs": {} }));

    let err = tracker.installations("pkgA@1.0.0").unwrap_err();
    assert!(matches!(err, LpmError::NotFound { .. }));

    let issues = tracker.check(&proj).unwrap();
    assert!(issues.is_empty());
}

#[test]
fn test_republish_preserves_installations() {
    let env = Env::new(10);
    let tracker = env.tracker();
    let pkg = env.dir("pkg-a", r#"{ "name": "pkgA", "version": "1.0.0" }"#);
    let p1 = env.dir("p1", "{}");
    let p2 = env.dir("p2", "{}");
    tracker.publish(&pkg).unwrap();
    tracker.add("pkgA", &p1, &AddOptions::default()).unwrap();
    tracker.add("pkgA", &p2, &AddOptions::default()).unwrap();

    let before = tracker.store().read().unwrap().get("pkgA", "1.0.0").unwrap().clone();
    let outcome = tracker.publish(&pkg).unwrap();

    assert_eq!(outcome.installations, before.installations);
    assert_ne!(outcome.publish_signature, before.publish_signature);
}

#[test]
fn test_retention_bounds_backup_count() {
    let env = Env::new(3);
    let tracker = env.tracker();

    for i in 0..6 {
        let pkg = env.dir(
            &format!("pkg-{i}"),
            &format!(r#"{{ "name": "pkg{i}", "version": "1.0.0" }}"#),
        );
        tracker.publish(&pkg).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    assert_eq!(backup_count(&env.config), 3);
}

#[test]
fn test_corrupted_registry_is_fatal_and_revertable() {
    let env = Env::new(10);
    let tracker = env.tracker();
    let pkg = env.dir("pkg-a", r#"{ "name": "pkgA", "version": "1.0.0" }"#);
    tracker.publish(&pkg).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    let proj = env.dir("proj", "{}");
    tracker.add("pkgA", &proj, &AddOptions::default()).unwrap();

    let store = RegistryStore::from_config(&env.config);
    let good = fs::read(store.path()).unwrap();
    fs::write(store.path(), r#"{ "versionTree": {} }"#).unwrap();

    let err = tracker.publish(&pkg).unwrap_err();
    assert!(matches!(err, LpmError::Corrupted { .. }));
    assert_eq!(
        fs::read_to_string(store.path()).unwrap(),
        r#"{ "versionTree": {} }"#,
        "a corrupted registry must not be rewritten"
    );

    // The newest snapshot is the state before the last add.
    let backups = store.backups().list().unwrap();
    let restored = store.revert(&backups[0].id).unwrap();
    assert_eq!(restored.packages.len(), 1);
    assert_ne!(fs::read(store.path()).unwrap(), good);
    assert!(tracker.store().read().is_ok());
}

#[test]
fn test_scoped_package_resolves_major_range() {
    let env = Env::new(10);
    let tracker = env.tracker();
    let pkg = env.dir("pkg-a", r#"{ "name": "@scope/a", "version": "2.1.0" }"#);
    tracker.publish(&pkg).unwrap();
    let proj = env.dir("proj", "{}");

    tracker
        .add("@scope/a@^2", &proj, &AddOptions::default())
        .unwrap();
    let lock = LockFile::read(&proj).unwrap().unwrap();
    assert_eq!(lock.get("@scope/a").unwrap().version, "2.1.0");
}
