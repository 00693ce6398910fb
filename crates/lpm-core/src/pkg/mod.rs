//! Local package registry.
//!
//! Provides:
//! - Parsing package references (`@scope/name@^1.2.3`)
//! - Resolving version requests against locally published versions
//! - The global registry index with snapshot-before-write
//! - Registry backups: dedup, retention and revert
//! - Per-directory `lpm.lock` generation and checking
//! - Publish / add / remove / upgrade / push / pull bookkeeping

pub mod backup;
pub mod descriptor;
pub mod executor;
pub mod lockfile;
pub mod packer;
pub mod reference;
pub mod registry;
pub mod resolve;
pub mod tracker;

pub use backup::{BackupInfo, BackupManager};
pub use descriptor::{DescriptorStore, PackageDescriptor, PackageJson, DESCRIPTOR_FILE};
pub use executor::{
    CommandExecutor, DependencySpecifier, NoopExecutor, PackageManagerExecutor,
    PackageManagerKind,
};
pub use lockfile::{
    DependencyScope, InstallType, LockEntry, LockFile, LockIssue, LockMetadata, LOCKFILE_NAME,
};
pub use packer::{DirectoryPacker, Packer};
pub use reference::{PackageReference, ReferenceCache, VersionSymbol, LATEST};
pub use registry::{split_resolved_id, Registry, RegistryEntry, RegistryStore};
pub use resolve::{highest_satisfying, VersionRequest};
pub use tracker::{
    AddOptions, AddOutcome, PublishOutcome, PushCycle, PushFailure, PushReport, PushTarget,
    Tracker, UpgradeOutcome,
};
