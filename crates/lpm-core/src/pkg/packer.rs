//! Moving package contents into and out of the store.

use crate::error::{LpmError, Result};
use std::path::Path;
use tracing::debug;

/// Entries never copied into the store.
pub const PACK_SKIP: &[&str] = &["node_modules", ".git"];

/// Places a package's files at its store location and removes them again.
pub trait Packer: Send + Sync {
    /// Replace `dest` with the contents of `src`.
    fn pack(&self, src: &Path, dest: &Path) -> Result<()>;

    /// Remove the store copy at `dest`. Missing is not an error.
    fn remove(&self, dest: &Path) -> Result<()>;
}

/// Copies the package directory tree, skipping dependency and VCS folders.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryPacker;

impl Packer for DirectoryPacker {
    fn pack(&self, src: &Path, dest: &Path) -> Result<()> {
        lpm_util::fs::remove_dir_all_if_exists(dest).map_err(LpmError::io("clear", dest))?;
        let files =
            lpm_util::fs::copy_dir(src, dest, PACK_SKIP).map_err(LpmError::io("copy", src))?;
        debug!(src = %src.display(), dest = %dest.display(), files, "Packed package");
        Ok(())
    }

    fn remove(&self, dest: &Path) -> Result<()> {
        lpm_util::fs::remove_dir_all_if_exists(dest).map_err(LpmError::io("remove", dest))?;
        debug!(dest = %dest.display(), "Removed store copy");
        Ok(())
    }
}
