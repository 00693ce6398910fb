//! Error types for lpm operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stable error codes, one per [`LpmError`] variant.
pub mod codes {
    pub const LPM_NOT_FOUND: &str = "LPM_NOT_FOUND";
    pub const LPM_REGISTRY_CORRUPTED: &str = "LPM_REGISTRY_CORRUPTED";
    pub const LPM_VERSION_UNRESOLVABLE: &str = "LPM_VERSION_UNRESOLVABLE";
    pub const LPM_EXTERNAL_PROCESS_FAILED: &str = "LPM_EXTERNAL_PROCESS_FAILED";
    pub const LPM_REFERENCE_INVALID: &str = "LPM_REFERENCE_INVALID";
    pub const LPM_DESCRIPTOR_INVALID: &str = "LPM_DESCRIPTOR_INVALID";
    pub const LPM_IO_ERROR: &str = "LPM_IO_ERROR";
    pub const LPM_JSON_ERROR: &str = "LPM_JSON_ERROR";
    pub const LPM_INTERNAL: &str = "LPM_INTERNAL";
}

pub type Result<T, E = LpmError> = std::result::Result<T, E>;

/// Core error type for lpm operations.
#[derive(Error, Debug)]
pub enum LpmError {
    /// A referenced package, version, installation or file is absent.
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    /// The registry file is unreadable as a registry. Never repaired automatically.
    #[error("registry at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    /// A range matched none of the published versions.
    #[error("no published version of {name} satisfies {range}")]
    VersionUnresolvable { name: String, range: String },

    /// An external package manager or archiver exited unsuccessfully.
    #[error("`{command}` failed in {dir} (exit code {exit_code})")]
    ExternalProcessFailure {
        command: String,
        dir: PathBuf,
        exit_code: i32,
        output: String,
    },

    #[error("invalid package reference '{input}': {reason}")]
    InvalidReference { input: String, reason: String },

    #[error("invalid package descriptor at {path}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to {action} {path}: {source}")]
    Json {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl LpmError {
    #[must_use]
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn package_not_found(name: impl Into<String>) -> Self {
        Self::not_found("package", name)
    }

    #[must_use]
    pub fn corrupted(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn unresolvable(name: impl Into<String>, range: impl Into<String>) -> Self {
        Self::VersionUnresolvable {
            name: name.into(),
            range: range.into(),
        }
    }

    #[must_use]
    pub fn invalid_reference(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Adapter for `map_err` on I/O results: `.map_err(LpmError::io("read", &path))`.
    pub fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }

    /// Adapter for `map_err` on serde_json results.
    pub fn json(action: &'static str, path: &Path) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Json {
            action,
            path,
            source,
        }
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::LPM_NOT_FOUND,
            Self::Corrupted { .. } => codes::LPM_REGISTRY_CORRUPTED,
            Self::VersionUnresolvable { .. } => codes::LPM_VERSION_UNRESOLVABLE,
            Self::ExternalProcessFailure { .. } => codes::LPM_EXTERNAL_PROCESS_FAILED,
            Self::InvalidReference { .. } => codes::LPM_REFERENCE_INVALID,
            Self::InvalidDescriptor { .. } => codes::LPM_DESCRIPTOR_INVALID,
            Self::Io { .. } => codes::LPM_IO_ERROR,
            Self::Json { .. } => codes::LPM_JSON_ERROR,
            Self::Other(_) => codes::LPM_INTERNAL,
        }
    }

    /// An actionable next step for the user, if there is one.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Corrupted { .. } => Some(
                "run `lpm backup ls` and restore a snapshot with `lpm backup revert <id> --yes`"
                    .to_string(),
            ),
            Self::NotFound { what: "package", .. } => {
                Some("run `lpm publish` in the package directory first".to_string())
            }
            Self::NotFound {
                what: "lock file", ..
            } => Some("run `lpm add <package>` in this directory first".to_string()),
            Self::VersionUnresolvable { .. } => Some(
                "publish a matching version, or pin one explicitly with `<name>@!<version>`"
                    .to_string(),
            ),
            Self::ExternalProcessFailure { output, .. } if !output.is_empty() => {
                Some(output.clone())
            }
            Self::InvalidReference { .. } => {
                Some("expected `[@scope/]name[@[^|~|!]version]`".to_string())
            }
            _ => None,
        }
    }

    /// Whether the error means "nothing matched" rather than "something broke".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::VersionUnresolvable { .. }
        )
    }
}
