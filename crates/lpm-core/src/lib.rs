#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Bookkeeping core for lpm, a local filesystem-backed package registry.
//!
//! A single global registry file indexes every published `name@version`
//! together with the directories consuming it. Each consuming directory
//! carries an `lpm.lock`, a point-in-time view of the registry entries that
//! name it. Every registry write is preceded by a backup snapshot.

pub mod config;
pub mod error;
pub mod paths;
pub mod pkg;

pub use config::Config;
pub use error::{LpmError, Result};
pub use pkg::{
    highest_satisfying, BackupInfo, BackupManager, DependencyScope, InstallType, LockEntry,
    LockFile, LockIssue, PackageReference, Registry, RegistryEntry, RegistryStore, Tracker,
    VersionRequest, VersionSymbol,
};

/// The lpm version, from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
