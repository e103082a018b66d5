//! Decision Engine: the periodic tiering pass. Refreshes the Metadata Store
//! from the filesystem, then evaluates pressure demotion and rule-based
//! promotion, in that fixed order.
//!
//! Access counting is atime-delta based rather than walk-count based, and
//! pressure demotion is capped at a fixed batch size per tier per pass to
//! bound I/O amplification under sustained pressure.

use crate::config::TieringConfig;
use crate::fswalk::walk_tier;
use crate::model::{FileRecord, MoveRequest, Tier, TierRoots};
use crate::queue::MoveQueue;
use crate::store::MetadataStore;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::Disks;

/// Batch ceiling per pass, per tier, for pressure demotion. A deliberate cap
/// on I/O amplification; sustained pressure drains over multiple passes
/// rather than in one large burst.
const DEMOTION_BATCH: usize = 10;

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Run one Decision Engine pass: refresh, then pressure demotion, then
/// rule-based promotion, enqueueing moves onto `queue` as they're found.
pub fn run_pass(store: &MetadataStore, roots: &TierRoots, config: &TieringConfig, queue: &MoveQueue) {
    tracing::info!("decision engine pass starting");
    refresh(store, roots);
    pressure_demotion(store, roots, config, queue);
    rule_based_promotion(store, config, queue);
    if let Err(err) = store.flush() {
        tracing::error!(error = %err, "failed to flush metadata store after decision pass");
    }
    tracing::info!("decision engine pass completed");
}

/// Walk each tier root, creating or updating [`FileRecord`]s. The access
/// counter increments only when the observed atime is strictly newer than
/// what was stored, so it counts distinct new accesses rather than walk
/// passes: an unchanged atime across two passes must not double-count.
///
/// Each file's update goes through `MetadataStore::mutate` rather than a
/// separate `get`/`upsert` pair, so a migration worker updating this same
/// key's tier concurrently can't have its write clobbered by a refresh that
/// read a now-stale record.
fn refresh(store: &MetadataStore, roots: &TierRoots) {
    for tier in Tier::all() {
        let root = roots.path_for(tier);
        for entry in walk_tier(root) {
            let result = store.mutate(&entry.relative_path, |existing| {
                Some(match existing {
                    Some(mut record) => {
                        let advanced = entry.atime > record.last_access_time;
                        record.last_access_time = entry.atime;
                        record.file_size = entry.size;
                        record.tier = tier;
                        if advanced {
                            record.access_count += 1;
                        }
                        record
                    }
                    None => FileRecord::new_observed(tier, entry.atime, entry.size),
                })
            });
            if let Err(err) = result {
                tracing::error!(path = %entry.relative_path, error = %err, "failed to update file record during refresh");
            }
        }
    }
}

/// For hot and warm (cold has no lower tier), demote the ten
/// least-recently-accessed files once usage exceeds the capacity threshold.
fn pressure_demotion(store: &MetadataStore, roots: &TierRoots, config: &TieringConfig, queue: &MoveQueue) {
    // One refreshed disk list shared by both tier checks below, rather than
    // one full re-enumeration of every mounted filesystem per tier.
    let disks = Disks::new_with_refreshed_list();

    for tier in [Tier::Hot, Tier::Warm] {
        let Some(target) = tier.adjacent_lower() else {
            continue;
        };
        let root = roots.path_for(tier);
        let usage = tier_usage_percent(&disks, root);
        let usage = match usage {
            Some(pct) => pct,
            None => {
                tracing::debug!(tier = %tier, "could not determine disk usage, skipping pressure check");
                continue;
            }
        };
        if usage <= config.tier_capacity_threshold {
            continue;
        }

        tracing::info!(tier = %tier, usage_pct = usage, "tier over capacity threshold, selecting demotions");

        let mut candidates: Vec<(String, FileRecord)> = match store.iter().collect() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, "failed to scan metadata store for pressure demotion");
                continue;
            }
        };
        candidates.retain(|(_, record)| record.tier == tier);
        // Least-recently-accessed first; lexicographic path as the tie-break.
        candidates.sort_by(|a, b| {
            a.1.last_access_time
                .cmp(&b.1.last_access_time)
                .then_with(|| a.0.cmp(&b.0))
        });

        for (relative_path, _) in candidates.into_iter().take(DEMOTION_BATCH) {
            queue.enqueue(MoveRequest::new(relative_path, tier, target));
        }
    }
}

/// Promote any file with enough distinct accesses inside the freshness
/// window. Unlike demotion, promotion may cross more than one tier in a
/// single step: cold -> hot is explicitly allowed here as a fast path for a
/// cold file that suddenly becomes hot.
fn rule_based_promotion(store: &MetadataStore, config: &TieringConfig, queue: &MoveQueue) {
    let fresh_after = now_secs() - config.access_time_threshold;

    let entries = match store.iter().collect::<Result<Vec<_>, _>>() {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(error = %err, "failed to scan metadata store for promotion");
            return;
        }
    };

    for (relative_path, record) in entries {
        if record.tier == Tier::Hot {
            continue;
        }
        if record.access_count >= config.access_count_threshold && record.last_access_time > fresh_after {
            tracing::info!(path = %relative_path, from = %record.tier, "promoting to hot");
            queue.enqueue(MoveRequest::new(relative_path, record.tier, Tier::Hot));
        }
    }
}

/// Percent (0-100) of the filesystem backing `root` that is currently used,
/// matched by the longest mount-point prefix of `root` (the union mount for
/// that tier). Takes an already-refreshed `Disks` list so a caller checking
/// multiple tiers in the same pass doesn't re-enumerate every mounted
/// filesystem once per tier.
fn tier_usage_percent(disks: &Disks, root: &Path) -> Option<f64> {
    let root = root.canonicalize().ok()?;

    let mut best: Option<(&Path, u64, u64)> = None;
    for disk in disks.list() {
        let mount_point = disk.mount_point();
        if root.starts_with(mount_point) {
            let depth = mount_point.components().count();
            let better = match best {
                Some((current, _, _)) => depth > current.components().count(),
                None => true,
            };
            if better {
                best = Some((mount_point, disk.total_space(), disk.available_space()));
            }
        }
    }

    best.map(|(_, total, available)| {
        if total == 0 {
            0.0
        } else {
            let used = total.saturating_sub(available);
            (used as f64 / total as f64) * 100.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;
    use std::fs;
    use std::time::Duration;
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
    fn refresh_inserts_new_files_with_access_count_one() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir);
        fs::write(roots.hot.join("a.txt"), b"x").unwrap();

        let store = MetadataStore::open_temporary();
        refresh(&store, &roots);

        let record = store.get("a.txt").unwrap().unwrap();
        assert_eq!(record.access_count, 1);
        assert_eq!(record.tier, Tier::Hot);
    }

    #[test]
    fn refresh_does_not_double_count_unchanged_atime() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir);
        fs::write(roots.hot.join("a.txt"), b"x").unwrap();

        let store = MetadataStore::open_temporary();
        refresh(&store, &roots);
        // Second refresh of the same file: atime on most filesystems will
        // not have advanced (and certainly not the *access* time from a mere
        // walk, since walking stats the directory entry, not the file
        // contents), so the counter should stay where it is.
        refresh(&store, &roots);

        let record = store.get("a.txt").unwrap().unwrap();
        assert_eq!(record.access_count, 1);
    }

    #[test]
    fn promotion_requires_both_count_and_freshness() {
        let store = MetadataStore::open_temporary();
        let mut config = TieringConfig::default();
        config.access_count_threshold = 3;
        config.access_time_threshold = 28_800;

        // Eligible: enough accesses, fresh.
        store
            .upsert(
                "hot_candidate",
                &FileRecord {
                    tier: Tier::Warm,
                    last_access_time: now_secs(),
                    access_count: 5,
                    file_size: 10,
                    last_tier_move: None,
                },
            )
            .unwrap();
        // Not eligible: stale.
        store
            .upsert(
                "stale",
                &FileRecord {
                    tier: Tier::Warm,
                    last_access_time: now_secs() - 100_000,
                    access_count: 5,
                    file_size: 10,
                    last_tier_move: None,
                },
            )
            .unwrap();
        // Not eligible: too few accesses.
        store
            .upsert(
                "cold_but_rare",
                &FileRecord {
                    tier: Tier::Warm,
                    last_access_time: now_secs(),
                    access_count: 1,
                    file_size: 10,
                    last_tier_move: None,
                },
            )
            .unwrap();

        let queue = MoveQueue::new(16);
        rule_based_promotion(&store, &config, &queue);

        let mut promoted = Vec::new();
        while let Some(req) = queue.dequeue_timeout(Duration::from_millis(10)) {
            promoted.push(req.relative_path);
        }
        assert_eq!(promoted, vec!["hot_candidate".to_string()]);
    }

    #[test]
    fn pressure_demotion_caps_at_ten_per_pass() {
        let dir = TempDir::new().unwrap();
        let roots = make_roots(&dir);
        let store = MetadataStore::open_temporary();

        for i in 0..20 {
            store
                .upsert(
                    &format!("f{i:02}"),
                    &FileRecord {
                        tier: Tier::Hot,
                        last_access_time: i as i64,
                        access_count: 1,
                        file_size: 1,
                        last_tier_move: None,
                    },
                )
                .unwrap();
        }

        let config = TieringConfig {
            tier_capacity_threshold: -1.0, // force "over threshold" regardless of real disk usage
            ..TieringConfig::default()
        };
        let queue = MoveQueue::new(16);

        // tier_usage_percent will return Some(..) for a real mounted path;
        // threshold of -1 guarantees usage > threshold unconditionally.
        pressure_demotion(&store, &roots, &config, &queue);

        let mut moved = Vec::new();
        while let Some(req) = queue.dequeue_timeout(Duration::from_millis(10)) {
            assert_eq!(req.source_tier, Tier::Hot);
            assert_eq!(req.target_tier, Tier::Warm);
            moved.push(req.relative_path);
        }
        assert_eq!(moved.len(), 10);
        // The ten least-recently-accessed, i.e. the lowest last_access_time.
        assert_eq!(moved, vec![
            "f00", "f01", "f02", "f03", "f04", "f05", "f06", "f07", "f08", "f09"
        ]);
    }
}
