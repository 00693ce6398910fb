use std::path::{Path, PathBuf};

/// Environment variable overriding the lpm home directory.
pub const HOME_ENV: &str = "LPM_HOME";

pub const REGISTRY_FILE: &str = "registry.json";
pub const CONFIG_FILE: &str = "config.json";
pub const BACKUP_DIR: &str = "backups";
pub const STORE_DIR: &str = "store";

/// Get the lpm home directory.
///
/// Respects `LPM_HOME`; otherwise `~/.lpm`, or `.lpm` relative to the
/// working directory when no home directory can be determined.
#[must_use]
pub fn default_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs_next::home_dir().map_or_else(|| PathBuf::from(".lpm"), |p| p.join(".lpm"))
}

#[must_use]
pub fn registry_path(home: &Path) -> PathBuf {
    home.join(REGISTRY_FILE)
}

#[must_use]
pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

#[must_use]
pub fn backup_dir(home: &Path) -> PathBuf {
    home.join(BACKUP_DIR)
}

#[must_use]
pub fn store_dir(home: &Path) -> PathBuf {
    home.join(STORE_DIR)
}

/// Store location of one published version: `<home>/store/<fullName>/<version>`.
///
/// Scoped names keep their `@scope/` segment as a directory level.
#[must_use]
pub fn package_store_dir(home: &Path, full_name: &str, version: &str) -> PathBuf {
    let mut dir = store_dir(home);
    for segment in full_name.split('/') {
        dir.push(segment);
    }
    dir.join(version)
}

/// Path of the lock file for a consuming directory.
#[must_use]
pub fn lock_path(dir: &Path) -> PathBuf {
    dir.join(crate::pkg::LOCKFILE_NAME)
}

/// Find the project root by walking up from `cwd` looking for `package.json`.
///
/// Returns `None` if no ancestor has one.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Absolute, canonical form of a directory used as a registry key.
///
/// Directories that no longer exist are made absolute without resolving links
/// so that stale installations can still be matched and removed.
#[must_use]
pub fn normalize_dir(dir: &Path) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(dir) {
        return canonical;
    }
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| dir.to_path_buf(), |cwd| cwd.join(dir))
    }
}
