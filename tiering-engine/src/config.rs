//! Configuration record for the tiering engine.
//!
//! A plain key-value record with defaults tuned for typical deployments,
//! loadable from a JSON file and overridable by CLI flags layered on top.

use crate::error::TierError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    /// Percent (0-100) of tier capacity at which pressure demotion triggers.
    pub tier_capacity_threshold: f64,
    /// Freshness window, in seconds, for promotion eligibility.
    pub access_time_threshold: i64,
    /// Distinct-access count required for promotion.
    pub access_count_threshold: u64,
    /// Decision Engine period, in seconds.
    pub tiering_interval_secs: u64,
    /// Maintenance Reconciler period, in seconds.
    pub maintenance_interval_secs: u64,
    /// Size of the Migration Worker Pool.
    pub io_threads: usize,
    /// Absolute path containing `hot/`, `warm/`, `cold/` subdirectories.
    pub pool_root: PathBuf,
    /// Persistent location for the Metadata Store.
    pub metadata_path: PathBuf,
    /// External copy primitive binary (default: `rsync`).
    pub copy_primitive: String,
    /// When true, log migrations instead of performing them.
    pub dry_run: bool,
}

impl Default for TieringConfig {
    fn default() -> Self {
        TieringConfig {
            tier_capacity_threshold: 85.0,
            access_time_threshold: 28_800,
            access_count_threshold: 3,
            tiering_interval_secs: 7_200,
            maintenance_interval_secs: 86_400,
            io_threads: 4,
            pool_root: PathBuf::new(),
            metadata_path: PathBuf::new(),
            copy_primitive: "rsync".to_string(),
            dry_run: false,
        }
    }
}

impl TieringConfig {
    pub fn tiering_interval(&self) -> Duration {
        Duration::from_secs(self.tiering_interval_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Load a config record from a JSON file, then validate the fields that
    /// are fatal-at-startup when missing or invalid.
    pub fn load(path: &Path) -> Result<TieringConfig, TierError> {
        let raw = std::fs::read_to_string(path)?;
        let config: TieringConfig = serde_json::from_str(&raw)
            .map_err(|e| TierError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TierError> {
        if self.pool_root.as_os_str().is_empty() {
            return Err(TierError::Config("pool_root is required".into()));
        }
        if self.metadata_path.as_os_str().is_empty() {
            return Err(TierError::Config("metadata_path is required".into()));
        }
        if self.io_threads == 0 {
            return Err(TierError::Config("io_threads must be >= 1".into()));
        }
        if !(0.0..=100.0).contains(&self.tier_capacity_threshold) {
            return Err(TierError::Config(
                "tier_capacity_threshold must be between 0 and 100".into(),
            ));
        }
        if self.tiering_interval_secs == 0 {
            return Err(TierError::Config("tiering_interval_secs must be >= 1".into()));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(TierError::Config("maintenance_interval_secs must be >= 1".into()));
        }
        Ok(())
    }

    pub fn hot_root(&self) -> PathBuf {
        self.pool_root.join("hot")
    }

    pub fn warm_root(&self) -> PathBuf {
        self.pool_root.join("warm")
    }

    pub fn cold_root(&self) -> PathBuf {
        self.pool_root.join("cold")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TieringConfig::default();
        assert_eq!(config.tier_capacity_threshold, 85.0);
        assert_eq!(config.access_time_threshold, 28_800);
        assert_eq!(config.access_count_threshold, 3);
        assert_eq!(config.tiering_interval_secs, 7_200);
        assert_eq!(config.maintenance_interval_secs, 86_400);
        assert_eq!(config.io_threads, 4);
    }

    #[test]
    fn validate_rejects_empty_pool_root() {
        let config = TieringConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_filled_in_paths() {
        let mut config = TieringConfig::default();
        config.pool_root = PathBuf::from("/pool");
        config.metadata_path = PathBuf::from("/pool/meta");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_tiering_interval() {
        let mut config = TieringConfig::default();
        config.pool_root = PathBuf::from("/pool");
        config.metadata_path = PathBuf::from("/pool/meta");
        config.tiering_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_maintenance_interval() {
        let mut config = TieringConfig::default();
        config.pool_root = PathBuf::from("/pool");
        config.metadata_path = PathBuf::from("/pool/meta");
        config.maintenance_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
