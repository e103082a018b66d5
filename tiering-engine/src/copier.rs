//! The external bulk-copy primitive, abstracted behind a trait so the
//! engine isn't hard-wired to any one copy tool, and so tests can exercise
//! the migration worker pool without shelling out.

use crate::error::TierError;
use std::path::Path;
use std::process::Command;

/// Argument vector for the copy tool: attribute preservation, sparse-file
/// handling, source removal on success, destination preallocation.
const COPY_FLAGS: &[&str] = &["-axqHAXWES", "--preallocate", "--remove-source-files"];

pub trait CopyPrimitive: Send + Sync {
    /// Move `src` to `dest`, removing the source on success. Returns an error
    /// for both a non-zero exit and a subprocess spawn failure; the caller
    /// treats either as a retriable migration failure.
    fn copy_move(&self, src: &Path, dest: &Path) -> Result<(), TierError>;

    /// True for a copier that only logs instead of touching the filesystem.
    /// `migrate_one` uses this to skip directory creation and store
    /// mutation, not just the copy itself.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Invokes the configured external binary (default `rsync`) with the
/// argument vector above.
pub struct SubprocessCopier {
    binary: String,
}

impl SubprocessCopier {
    pub fn new(binary: impl Into<String>) -> Self {
        SubprocessCopier {
            binary: binary.into(),
        }
    }
}

impl CopyPrimitive for SubprocessCopier {
    fn copy_move(&self, src: &Path, dest: &Path) -> Result<(), TierError> {
        let status = Command::new(&self.binary)
            .args(COPY_FLAGS)
            .arg(src)
            .arg(dest)
            .status()
            .map_err(TierError::CopySpawn)?;

        if status.success() {
            Ok(())
        } else {
            Err(TierError::CopyFailed(format!(
                "{} {:?} {} {}: {}",
                self.binary,
                COPY_FLAGS,
                src.display(),
                dest.display(),
                status
            )))
        }
    }
}

/// Logs the move it would perform without touching the filesystem. Backs
/// the engine's `dry_run` configuration option.
pub struct DryRunCopier;

impl CopyPrimitive for DryRunCopier {
    fn copy_move(&self, src: &Path, dest: &Path) -> Result<(), TierError> {
        tracing::info!(src = %src.display(), dest = %dest.display(), "dry-run: would move file");
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
