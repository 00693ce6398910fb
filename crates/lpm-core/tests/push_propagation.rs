//! Push fan-out: partial failure and transitive republishing.

use lpm_core::error::{codes, LpmError, Result};
use lpm_core::pkg::{
    AddOptions, DependencySpecifier, LockFile, PackageManagerExecutor, Tracker,
};
use lpm_core::Config;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Executor that fails in directories whose name matches, and logs every call.
#[derive(Clone, Default)]
struct FlakyExecutor {
    fail_in: Option<&'static str>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl PackageManagerExecutor for FlakyExecutor {
    fn install(&self, dir: &Path, _specs: &[DependencySpecifier]) -> Result<()> {
        self.calls.lock().unwrap().push(dir.to_path_buf());
        if self.fail_in.is_some_and(|name| dir.ends_with(name)) {
            return Err(LpmError::ExternalProcessFailure {
                command: "yarn add".to_string(),
                dir: dir.to_path_buf(),
                exit_code: 1,
                output: "error An unexpected error occurred".to_string(),
            });
        }
        Ok(())
    }
}

struct Env {
    _tmp: TempDir,
    config: Config,
    work: PathBuf,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let work = dunce::canonicalize(tmp.path()).unwrap().join("work");
        fs::create_dir_all(&work).unwrap();
        let config = Config::new(work.clone())
            .with_home(tmp.path().join("home"))
            .with_jobs(2);
        Self {
            _tmp: tmp,
            config,
            work,
        }
    }

    fn dir(&self, name: &str, package_json: &str) -> PathBuf {
        let dir = self.work.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), package_json).unwrap();
        dir
    }
}

fn no_install() -> AddOptions {
    AddOptions {
        skip_install: true,
        ..AddOptions::default()
    }
}

fn locked_signature(dir: &Path, name: &str) -> String {
    LockFile::read(dir)
        .unwrap()
        .unwrap()
        .get(name)
        .unwrap()
        .publish_signature
        .clone()
}

#[test]
fn test_failure_in_one_directory_does_not_stop_the_others() {
    let env = Env::new();
    let executor = FlakyExecutor {
        fail_in: Some("two"),
        ..FlakyExecutor::default()
    };
    let tracker = Tracker::from_config(&env.config).with_executor(executor.clone());

    let pkg = env.dir("pkg", r#"{ "name": "pkg", "version": "1.0.0" }"#);
    tracker.publish(&pkg).unwrap();
    let dirs: Vec<PathBuf> = ["one", "two", "three"]
        .iter()
        .map(|name| env.dir(name, "{}"))
        .collect();
    for dir in &dirs {
        tracker.add("pkg", dir, &no_install()).unwrap();
    }

    let republished = tracker.publish(&pkg).unwrap();
    let report = tracker.push("pkg", false).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].dir, dirs[1]);
    assert_eq!(report.failures[0].code, codes::LPM_EXTERNAL_PROCESS_FAILED);

    let mut updated: Vec<&PathBuf> = report.updated.iter().map(|t| &t.dir).collect();
    updated.sort();
    let mut expected = vec![&dirs[0], &dirs[2]];
    expected.sort();
    assert_eq!(updated, expected);

    for dir in [&dirs[0], &dirs[2]] {
        assert_eq!(locked_signature(dir, "pkg"), republished.publish_signature);
    }
    assert_eq!(executor.calls.lock().unwrap().len(), 3);
}

#[test]
fn test_push_follows_republished_consumers() {
    let env = Env::new();
    let tracker = Tracker::from_config(&env.config).with_executor(FlakyExecutor::default());

    let base = env.dir("base", r#"{ "name": "base", "version": "1.0.0" }"#);
    let mid = env.dir("mid", r#"{ "name": "mid", "version": "1.0.0" }"#);
    let app = env.dir("app", r#"{ "name": "app" }"#);

    tracker.publish(&base).unwrap();
    tracker.add("base", &mid, &no_install()).unwrap();
    tracker.publish(&mid).unwrap();
    tracker.add("mid", &app, &no_install()).unwrap();
    let mid_signature = locked_signature(&app, "mid");

    let report = tracker.push("base", true).unwrap();

    assert!(report.is_success());
    assert_eq!(report.packages, ["base", "mid"]);
    assert!(report.cycles.is_empty());
    assert_eq!(report.updated.len(), 2);
    assert_eq!(report.updated[0].republished.as_deref(), Some("mid"));
    assert_ne!(locked_signature(&app, "mid"), mid_signature);
}

#[test]
fn test_push_of_unknown_package_is_not_found() {
    let env = Env::new();
    let tracker = Tracker::from_config(&env.config).with_executor(FlakyExecutor::default());
    let err = tracker.push("ghost", true).unwrap_err();
    assert!(matches!(err, LpmError::NotFound { .. }));
}

#[test]
fn test_push_moves_consumers_within_their_range() {
    let env = Env::new();
    let tracker = Tracker::from_config(&env.config).with_executor(FlakyExecutor::default());

    let v1 = env.dir("ui-1", r#"{ "name": "ui", "version": "1.0.0" }"#);
    tracker.publish(&v1).unwrap();
    let caret = env.dir("caret", "{}");
    let pinned = env.dir("pinned", "{}");
    tracker.add("ui", &caret, &no_install()).unwrap();
    tracker.add("ui@!1.0.0", &pinned, &no_install()).unwrap();

    let v2 = env.dir("ui-1-1", r#"{ "name": "ui", "version": "1.1.0" }"#);
    tracker.publish(&v2).unwrap();
    let report = tracker.push("ui", true).unwrap();
    assert!(report.is_success());

    assert_eq!(
        LockFile::read(&caret).unwrap().unwrap().get("ui").unwrap().version,
        "1.1.0"
    );
    assert_eq!(
        LockFile::read(&pinned).unwrap().unwrap().get("ui").unwrap().version,
        "1.0.0"
    );
}
