#![forbid(unsafe_code)]

//! Ledger runtime.
//!
//! Wraps tcr_engine with persistence, replay, snapshots, session
//! management, drift detection and operator configuration.
//!
//! No ledger rules live here. Transitions and invariants are delegated
//! to the engine.

pub mod errors;
pub mod config;
pub mod proto_types;
pub mod proto_bridge;
pub mod tx_log;
pub mod replay;
pub mod snapshot;
pub mod session;
pub mod drift;
pub mod audit;
pub mod content;

pub use config::RuntimeConfig;
pub use errors::{RuntimeError, RuntimeResult};
pub use session::{Session, SharedSession};
pub use tx_log::TxLog;
