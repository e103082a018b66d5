//! Core data types shared by every component of the tiering engine: the
//! storage tier enum, the per-file metadata record, and the unit of work
//! passed through the move/retry queues.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A performance class of storage. Ordered fastest-to-slowest so adjacency
/// between two tiers can be checked with simple arithmetic on the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    fn rank(&self) -> i8 {
        match self {
            Tier::Hot => 0,
            Tier::Warm => 1,
            Tier::Cold => 2,
        }
    }

    /// The tier one step slower than this one, if any (hot->warm, warm->cold).
    pub fn adjacent_lower(&self) -> Option<Tier> {
        match self {
            Tier::Hot => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Cold),
            Tier::Cold => None,
        }
    }

    /// True if `self` and `other` are exactly one step apart.
    pub fn is_adjacent(&self, other: Tier) -> bool {
        (self.rank() - other.rank()).abs() == 1
    }

    pub fn all() -> [Tier; 3] {
        [Tier::Hot, Tier::Warm, Tier::Cold]
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three tier-root directories supplied by the device/mount collaborator.
#[derive(Debug, Clone)]
pub struct TierRoots {
    pub hot: PathBuf,
    pub warm: PathBuf,
    pub cold: PathBuf,
}

impl TierRoots {
    pub fn path_for(&self, tier: Tier) -> &PathBuf {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }
}

/// The unit stored in the Metadata Store, keyed by path relative to the pool
/// root (tier segment stripped).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub tier: Tier,
    /// Seconds since epoch, observed filesystem atime at last refresh.
    pub last_access_time: i64,
    /// Monotonic counter of distinct access events observed (see decision.rs).
    pub access_count: u64,
    pub file_size: u64,
    /// Seconds since epoch when the engine last migrated this file.
    pub last_tier_move: Option<i64>,
}

impl FileRecord {
    pub fn new_observed(tier: Tier, atime: i64, size: u64) -> Self {
        FileRecord {
            tier,
            last_access_time: atime,
            access_count: 1,
            file_size: size,
            last_tier_move: None,
        }
    }
}

/// The unit of work passed through the Move Queue and Retry Queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveRequest {
    pub relative_path: String,
    pub source_tier: Tier,
    pub target_tier: Tier,
    pub retries: u32,
}

impl MoveRequest {
    pub fn new(relative_path: impl Into<String>, source_tier: Tier, target_tier: Tier) -> Self {
        MoveRequest {
            relative_path: relative_path.into(),
            source_tier,
            target_tier,
            retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_holds_for_neighbors_only() {
        assert!(Tier::Hot.is_adjacent(Tier::Warm));
        assert!(Tier::Warm.is_adjacent(Tier::Cold));
        assert!(!Tier::Hot.is_adjacent(Tier::Cold));
        assert!(!Tier::Hot.is_adjacent(Tier::Hot));
    }

    #[test]
    fn adjacent_lower_steps_one_tier_at_a_time() {
        assert_eq!(Tier::Hot.adjacent_lower(), Some(Tier::Warm));
        assert_eq!(Tier::Warm.adjacent_lower(), Some(Tier::Cold));
        assert_eq!(Tier::Cold.adjacent_lower(), None);
    }
}
