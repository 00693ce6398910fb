use crate::error::{LpmError, Result};
use crate::paths;
use crate::pkg::PackageManagerKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of registry snapshots kept in the backup directory.
pub const DEFAULT_MAX_BACKUPS: usize = 10;

/// Upper bound for the push worker pool.
pub const MAX_JOBS: usize = 8;

/// Runtime configuration for lpm.
///
/// Persisted fields may be overridden by `<home>/config.json`; the rest are
/// per-invocation and come from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Root of the per-user state (registry, backups, store).
    #[serde(skip)]
    pub home: PathBuf,

    /// Number of registry snapshots to retain.
    pub max_backups: usize,

    /// Worker-pool width used when pushing to consumers.
    pub jobs: usize,

    /// Package manager invoked after dependency entries are rewritten.
    pub package_manager: PackageManagerKind,

    /// Current working directory.
    #[serde(skip)]
    pub cwd: PathBuf,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    #[serde(skip)]
    pub verbosity: u8,

    /// Whether to emit JSON logs.
    #[serde(skip)]
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: paths::default_home(),
            max_backups: DEFAULT_MAX_BACKUPS,
            jobs: default_jobs(),
            package_manager: PackageManagerKind::default(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            verbosity: 0,
            json_logs: false,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Load persisted overrides from `<home>/config.json` on top of defaults.
    ///
    /// A missing file is not an error.
    pub fn load(home: &Path) -> Result<Self> {
        let path = paths::config_path(home);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => {
                serde_json::from_str::<Self>(&content).map_err(LpmError::json("parse", &path))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(LpmError::io("read", &path)(e)),
        };
        config.home = home.to_path_buf();
        config.jobs = config.jobs.clamp(1, MAX_JOBS);
        Ok(config)
    }

    /// Set the lpm home directory.
    #[must_use]
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    /// Set the backup retention limit.
    #[must_use]
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Set the push worker count (clamped to `1..=MAX_JOBS`).
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, MAX_JOBS);
        self
    }

    #[must_use]
    pub fn with_package_manager(mut self, kind: PackageManagerKind) -> Self {
        self.package_manager = kind;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        paths::registry_path(&self.home)
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        paths::backup_dir(&self.home)
    }

    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        paths::store_dir(&self.home)
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
        .clamp(1, MAX_JOBS)
}
