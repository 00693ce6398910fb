//! External package manager invocation.

use super::lockfile::{DependencyScope, InstallType};
use crate::error::{LpmError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::debug;

/// Lines of stderr kept when a package manager fails.
const STDERR_TAIL_LINES: usize = 20;

/// Which package manager places files under a consumer's dependency directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    #[default]
    Yarn,
    Pnpm,
    Npm,
}

impl PackageManagerKind {
    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Npm => "npm",
        }
    }

    /// Subcommand and flags adding dependencies to `scope`.
    #[must_use]
    pub fn add_args(self, scope: DependencyScope) -> Vec<&'static str> {
        let subcommand = match self {
            Self::Yarn | Self::Pnpm => "add",
            Self::Npm => "install",
        };
        let flag = match (self, scope) {
            (_, DependencyScope::Dependencies) => None,
            (Self::Yarn, DependencyScope::DevDependencies) => Some("--dev"),
            (Self::Yarn, DependencyScope::PeerDependencies) => Some("--peer"),
            (Self::Yarn, DependencyScope::OptionalDependencies) => Some("--optional"),
            (Self::Pnpm, DependencyScope::DevDependencies) => Some("--save-dev"),
            (Self::Pnpm, DependencyScope::PeerDependencies) => Some("--save-peer"),
            (Self::Pnpm, DependencyScope::OptionalDependencies) => Some("--save-optional"),
            (Self::Npm, DependencyScope::DevDependencies) => Some("--save-dev"),
            (Self::Npm, DependencyScope::PeerDependencies) => Some("--save-peer"),
            (Self::Npm, DependencyScope::OptionalDependencies) => Some("--save-optional"),
        };
        std::iter::once(subcommand).chain(flag).collect()
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for PackageManagerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "yarn" => Ok(Self::Yarn),
            "pnpm" => Ok(Self::Pnpm),
            "npm" => Ok(Self::Npm),
            other => Err(format!("unknown package manager '{other}'")),
        }
    }
}

/// One dependency to hand to the package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpecifier {
    pub name: String,
    /// Store copy the dependency comes from.
    pub source: PathBuf,
    pub install_type: InstallType,
    pub scope: DependencyScope,
}

impl DependencySpecifier {
    /// The package.json value for this dependency (`file:` or `link:`).
    #[must_use]
    pub fn descriptor_value(&self) -> String {
        let protocol = match self.install_type {
            InstallType::Import => "file",
            InstallType::Link => "link",
        };
        format!("{protocol}:{}", self.source.display())
    }
}

impl fmt::Display for DependencySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.descriptor_value())
    }
}

/// Installs dependencies into a consumer directory.
pub trait PackageManagerExecutor: Send + Sync {
    fn install(&self, dir: &Path, specs: &[DependencySpecifier]) -> Result<()>;
}

/// Runs the configured package manager as a child process.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    kind: PackageManagerKind,
    program: String,
}

impl CommandExecutor {
    #[must_use]
    pub fn new(kind: PackageManagerKind) -> Self {
        Self {
            kind,
            program: kind.program().to_string(),
        }
    }

    /// Use a different binary than the package manager's default name.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, dir: &Path, args: &[String]) -> Result<()> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        debug!(dir = %dir.display(), command = %command_line, "Running package manager");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| LpmError::ExternalProcessFailure {
                command: command_line.clone(),
                dir: dir.to_path_buf(),
                exit_code: -1,
                output: format!("failed to spawn: {e}"),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
        let tail = tail.into_iter().rev().collect::<Vec<_>>().join("\n");

        Err(LpmError::ExternalProcessFailure {
            command: command_line,
            dir: dir.to_path_buf(),
            exit_code: output.status.code().unwrap_or(-1),
            output: tail,
        })
    }
}

impl PackageManagerExecutor for CommandExecutor {
    /// One invocation per dependency scope, in scope order.
    fn install(&self, dir: &Path, specs: &[DependencySpecifier]) -> Result<()> {
        let mut by_scope: BTreeMap<DependencyScope, Vec<String>> = BTreeMap::new();
        for spec in specs {
            by_scope.entry(spec.scope).or_default().push(spec.to_string());
        }

        for (scope, rendered) in by_scope {
            let args: Vec<String> = self
                .kind
                .add_args(scope)
                .into_iter()
                .map(String::from)
                .chain(rendered)
                .collect();
            self.run(dir, &args)?;
        }
        Ok(())
    }
}

/// Executor that records nothing and installs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl PackageManagerExecutor for NoopExecutor {
    fn install(&self, _dir: &Path, _specs: &[DependencySpecifier]) -> Result<()> {
        Ok(())
    }
}
