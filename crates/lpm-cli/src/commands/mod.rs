pub mod backup;
pub mod install;
pub mod list;
pub mod lock;
pub mod publish;
pub mod sync;
pub mod version;

use lpm_core::paths;
use lpm_core::pkg::{DescriptorStore, PackageJson};
use lpm_core::{Config, LpmError, Tracker};
use miette::{MietteDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Code reported when a destructive command is run without `--yes`.
pub const CONFIRMATION_REQUIRED: &str = "LPM_CONFIRMATION_REQUIRED";

/// Everything a command needs from the invocation.
pub struct Context {
    pub config: Config,
    pub json: bool,
    /// Skip the package manager after bookkeeping.
    pub no_install: bool,
}

impl Context {
    pub fn tracker(&self) -> Tracker {
        Tracker::from_config(&self.config)
    }

    /// The nearest ancestor of the working directory with a `package.json`,
    /// or the working directory itself.
    pub fn project_dir(&self) -> PathBuf {
        paths::project_root(&self.config.cwd).unwrap_or_else(|| self.config.cwd.clone())
    }

    /// Name the current project publishes, for commands whose reference is optional.
    pub fn project_name(&self) -> Result<String> {
        let dir = self.project_dir();
        let descriptor = PackageJson.read(&dir).or_else(|e| self.fail(e))?;
        let (name, _) = descriptor.identity(&dir).or_else(|e| self.fail(e))?;
        Ok(name.to_string())
    }

    /// Unwrap a core result, reporting the error in the selected output mode.
    pub fn check<T>(&self, result: lpm_core::Result<T>) -> Result<T> {
        check(self.json, result)
    }

    pub fn fail<T>(&self, err: LpmError) -> Result<T> {
        fail(self.json, err)
    }
}

pub fn check<T>(json: bool, result: lpm_core::Result<T>) -> Result<T> {
    result.or_else(|e| fail(json, e))
}

/// Report `err` and stop.
///
/// JSON mode prints `{"ok":false,"error":{...}}` on stdout and exits 1;
/// otherwise the error becomes a miette report carrying code and hint.
pub fn fail<T>(json: bool, err: LpmError) -> Result<T> {
    if json {
        print_json(&serde_json::json!({
            "ok": false,
            "error": {
                "code": err.code(),
                "message": err.to_string(),
                "hint": err.hint(),
            }
        }));
        std::process::exit(1);
    }
    Err(report(&err))
}

/// Turn a core error into a diagnostic with its stable code and hint as help.
pub fn report(err: &LpmError) -> miette::Report {
    let mut diagnostic = MietteDiagnostic::new(err.to_string()).with_code(err.code());
    if let Some(hint) = err.hint() {
        diagnostic = diagnostic.with_help(hint);
    }
    miette::Report::new(diagnostic)
}

/// Print one JSON document on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("error: failed to serialize output: {e}"),
    }
}
