#![forbid(unsafe_code)]

/// Engine v1. Any change to transition behavior changes replay hashes.
pub const ENGINE_VERSION: u32 = 1;

pub mod arithmetic;
pub mod domain;
pub mod errors;
pub mod identifiers;
pub mod multihash;
pub mod token;
pub mod directory;
pub mod acl;
pub mod kernel;
pub mod registry;
pub mod airdrop;
pub mod milestone;
pub mod forum;
pub mod exchange;
pub mod contracts;
pub mod events;
pub mod state;
pub mod graph;
pub mod transitions;
pub mod invariants;
pub mod hashing;
pub mod engine;
pub mod deployment;

pub use deployment::{deploy_system, Deployment, DeploymentParams, TxSink};
pub use domain::{Address, Amount, CapabilityId, Hash32, Receipt, Selector, Timestamp};
pub use engine::LedgerEngine;
pub use errors::{EngineError, EngineResult};
pub use events::{Call, Transaction};
pub use state::LedgerState;
