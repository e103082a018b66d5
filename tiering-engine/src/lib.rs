//! Background tiering engine for a pool of hot/warm/cold storage tiers
//! rooted at the same filesystem: a persistent per-file metadata index, a
//! periodic promotion/demotion decision pass, a bounded-concurrency
//! migration pool, and a slower reconciliation pass that repairs drift
//! between the index and the filesystem.
//!
//! The engine has no notion of documents, collections, or queries - it only
//! ever sees paths relative to the pool root. Point it at a pool with
//! `hot/`, `warm/`, and `cold/` subdirectories and it keeps files moving
//! between them according to access patterns and capacity pressure.

pub mod config;
pub mod copier;
pub mod decision;
pub mod error;
pub mod fswalk;
pub mod model;
pub mod queue;
pub mod reconciler;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use config::TieringConfig;
pub use error::TierError;
pub use model::{FileRecord, MoveRequest, Tier, TierRoots};
pub use store::MetadataStore;
pub use supervisor::Supervisor;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Builds the tier roots and opens the Metadata Store for a validated
/// config, failing fast if either is missing. Shared by `bin/tierd.rs` and
/// by tests that need a fully wired engine.
pub fn open(config: &TieringConfig) -> Result<(TierRoots, MetadataStore), TierError> {
    let roots = TierRoots {
        hot: config.hot_root(),
        warm: config.warm_root(),
        cold: config.cold_root(),
    };
    for (name, root) in [("hot", &roots.hot), ("warm", &roots.warm), ("cold", &roots.cold)] {
        if !root.is_dir() {
            return Err(TierError::MissingTierRoot(format!("{name}: {}", root.display())));
        }
    }
    let store = MetadataStore::open(&config.metadata_path)?;
    Ok((roots, store))
}

/// Constructs and spawns a fully wired engine ready to run until
/// [`Supervisor::shutdown`] is called.
pub fn spawn(config: TieringConfig, shutdown: Arc<AtomicBool>) -> Result<Supervisor, TierError> {
    let (roots, store) = open(&config)?;
    Ok(Supervisor::spawn(config, store, roots, shutdown))
}
