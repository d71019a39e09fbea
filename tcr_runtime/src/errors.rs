//! Runtime errors.
//!
//! Engine rejections pass through unchanged so callers can still match
//! on the ledger's own taxonomy.

use thiserror::Error;

use tcr_engine::multihash::MultihashError;
use tcr_engine::EngineError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Multihash error: {0}")]
    Multihash(#[from] MultihashError),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Corrupt log frame: {0}")]
    Frame(String),

    #[error("Sequence violation in transaction log: expected {expected}, got {got}")]
    LogSequence { expected: u64, got: u64 },

    #[error("Bad snapshot: {0}")]
    Snapshot(String),

    #[error("Determinism failure: replays produced {first} and {second}")]
    Determinism { first: String, second: String },

    #[error("Session lock poisoned")]
    LockPoisoned,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
