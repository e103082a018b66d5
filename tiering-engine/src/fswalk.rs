//! Shared tier-root walking helper used by both the Decision Engine's refresh
//! phase and the Maintenance Reconciler's first pass, so the two can never
//! silently diverge on what counts as an observable file.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// A single regular file observed under a tier root.
pub struct WalkEntry {
    /// Path relative to the tier root (i.e. relative to the pool, tier
    /// segment stripped).
    pub relative_path: String,
    pub atime: i64,
    pub size: u64,
}

/// Walk `root` recursively, yielding one [`WalkEntry`] per regular file.
/// Per-entry errors (permission denied, dead symlinks, races with deletion)
/// are logged at debug and skipped - they must never abort the pass.
pub fn walk_tier(root: &Path) -> Vec<WalkEntry> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(root = %root.display(), error = %err, "walk entry error, skipping");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative_path = match entry.path().strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!(path = %entry.path().display(), error = %err, "stat error, skipping");
                continue;
            }
        };
        let atime = match metadata.accessed() {
            Ok(time) => time
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            Err(_) => 0,
        };
        entries.push(WalkEntry {
            relative_path,
            atime,
            size: metadata.len(),
        });
    }
    entries
}

/// True if `pool_root/relative_path` exists under *any* tier, independent of
/// which tier the Metadata Store believes it is in. Used by the Maintenance
/// Reconciler's second pass to find ghost records.
pub fn exists_under_any_tier(roots: &[&Path], relative_path: &str) -> bool {
    roots.iter().any(|root| root.join(relative_path).is_file())
}

pub fn absolute_path(root: &Path, relative_path: &str) -> PathBuf {
    root.join(relative_path)
}
