//! Maintenance Reconciler: the slow, periodic pass that corrects drift
//! between the filesystem and the Metadata Store that the Decision Engine's
//! refresh does not address - ghost records for deleted files, and records
//! stuck on the wrong tier after an out-of-band move.

use crate::fswalk::walk_tier;
use crate::model::{FileRecord, Tier, TierRoots};
use crate::store::MetadataStore;

/// Run one reconciliation pass.
///
/// Pass one walks every tier root and, for each observed file, either
/// corrects an existing record's tier or inserts a fresh one. Pass two
/// removes any Metadata Store entry whose path no longer exists under any
/// tier root. The store is flushed once at the end.
pub fn run_pass(store: &MetadataStore, roots: &TierRoots) {
    tracing::info!("maintenance reconciler pass starting");
    reconcile_observed_files(store, roots);
    let removed = prune_ghost_entries(store, roots);
    if removed > 0 {
        tracing::info!(removed, "pruned ghost metadata entries");
    }
    if let Err(err) = store.flush() {
        tracing::error!(error = %err, "failed to flush metadata store after reconciliation");
    }
    tracing::info!("maintenance reconciler pass completed");
}

/// Corrects tier mismatches and adopts untracked files. Goes through
/// `MetadataStore::mutate` so a concurrent migration worker updating the
/// same key can't have its write raced by this pass reading a stale record.
fn reconcile_observed_files(store: &MetadataStore, roots: &TierRoots) {
    for tier in Tier::all() {
        let root = roots.path_for(tier);
        for entry in walk_tier(root) {
            let relative_path = entry.relative_path.clone();
            let result = store.mutate(&entry.relative_path, |existing| {
                Some(match existing {
                    Some(mut record) => {
                        if record.tier != tier {
                            tracing::warn!(
                                path = %relative_path,
                                recorded = %record.tier,
                                observed = %tier,
                                "correcting tier mismatch"
                            );
                            record.tier = tier;
                        }
                        record
                    }
                    None => {
                        tracing::info!(path = %relative_path, tier = %tier, "discovered untracked file");
                        FileRecord::new_observed(tier, entry.atime, entry.size)
                    }
                })
            });
            if let Err(err) = result {
                tracing::error!(path = %entry.relative_path, error = %err, "failed to reconcile file record");
            }
        }
    }
}

/// Removes every Metadata Store entry whose path is absent from all three
/// tier roots (the file was deleted, or moved out of the pool entirely).
/// Returns the number of entries removed.
fn prune_ghost_entries(store: &MetadataStore, roots: &TierRoots) -> usize {
    let tier_roots = [roots.hot.as_path(), roots.warm.as_path(), roots.cold.as_path()];

    let keys: Vec<String> = match store.iter().collect::<Result<Vec<_>, _>>() {
        Ok(entries) => entries.into_iter().map(|(key, _)| key).collect(),
        Err(err) => {
            tracing::error!(error = %err, "failed to scan metadata store for pruning");
            return 0;
        }
    };

    let mut removed = 0;
    for relative_path in keys {
        if !crate::fswalk::exists_under_any_tier(&tier_roots, &relative_path) {
            tracing::info!(path = %relative_path, "removing ghost metadata entry");
            if let Err(err) = store.remove(&relative_path) {
                tracing::error!(path = %relative_path, error = %err, "failed to remove ghost metadata entry");
                continue;
            }
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_roots(dir: &TempDir) -> TierRoots {
        let hot = dir.path().join("hot");
        let warm = dir.path().join("warm");
        let cold = dir.path().join("cold");
        fs::create_dir_all(&hot).unwrap();
        fs::create_dir_all(&warm).unwrap();
        fs::create_dir_all(&cold).unwrap();
        TierRoots { hot, warm, cold }
    }

    #[test]
    fn discovers_untracked_files_with_access_count_one() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir);
        fs::write(roots.warm.join("new.txt"), b"data").unwrap();

        let store = MetadataStore::open_temporary();
        run_pass(&store, &roots);

        let record = store.get("new.txt").unwrap().unwrap();
        assert_eq!(record.access_count, 1);
        assert_eq!(record.tier, Tier::Warm);
    }

    #[test]
    fn corrects_tier_mismatch_after_out_of_band_move() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir);
        fs::write(roots.cold.join("moved.txt"), b"data").unwrap();

        let store = MetadataStore::open_temporary();
        store
            .upsert("moved.txt", &FileRecord::new_observed(Tier::Hot, 1, 4))
            .unwrap();

        run_pass(&store, &roots);

        assert_eq!(store.get("moved.txt").unwrap().unwrap().tier, Tier::Cold);
    }

    #[test]
    fn prunes_entries_for_files_deleted_from_every_tier() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir);

        let store = MetadataStore::open_temporary();
        store
            .upsert("gone.txt", &FileRecord::new_observed(Tier::Hot, 1, 4))
            .unwrap();

        run_pass(&store, &roots);

        assert_eq!(store.get("gone.txt").unwrap(), None);
    }

    #[test]
    fn leaves_live_entries_untouched() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir);
        fs::write(roots.hot.join("alive.txt"), b"data").unwrap();

        let store = MetadataStore::open_temporary();
        let original = FileRecord::new_observed(Tier::Hot, 500, 4);
        store.upsert("alive.txt", &original).unwrap();

        run_pass(&store, &roots);

        let after = store.get("alive.txt").unwrap().unwrap();
        assert_eq!(after.tier, Tier::Hot);
        assert_eq!(after.access_count, original.access_count);
    }
}
