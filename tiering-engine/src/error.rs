//! Error types for the tiering engine: one enum covering every fallible
//! operation across the Metadata Store, filesystem walks, and the copy
//! primitive.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store error: {0}")]
    Store(#[from] sled::Error),

    #[error("metadata decode error for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing tier root: {0}")]
    MissingTierRoot(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("copy primitive exited with non-zero status: {0}")]
    CopyFailed(String),

    #[error("copy primitive could not be spawned: {0}")]
    CopySpawn(std::io::Error),
}
