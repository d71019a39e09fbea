//! Ledger Engine: Canonical Hashing
//!
//! Deterministic canonical serialization + SHA-256 hashing, plus the
//! address derivations that must agree across replays.
//!
//! Rules:
//!   - All maps in ledger state are BTreeMaps (sorted keys)
//!   - Struct fields serialize in declaration order
//!   - UTF-8 JSON, no whitespace, no float
//!   - engine_version is the first field

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::Address;
use crate::errors::{EngineError, EngineResult};
use crate::state::LedgerState;
use crate::ENGINE_VERSION;

#[derive(Serialize)]
struct CanonicalView<'a> {
    engine_version: u32,
    state: &'a LedgerState,
}

/// Canonical serialization of LedgerState to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &LedgerState) -> EngineResult<Vec<u8>> {
    let view = CanonicalView {
        engine_version: ENGINE_VERSION,
        state,
    };
    serde_json::to_vec(&view).map_err(|e| EngineError::Serialization(e.to_string()))
}

/// SHA-256 of canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &LedgerState) -> EngineResult<String> {
    let bytes = canonical_serialize(state)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Address of the `nonce`-th creation by `deployer`: the low 20 bytes of
/// `sha256("contract" || deployer || nonce_be)`.
pub fn contract_address(deployer: &Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"contract");
    hasher.update(deployer.as_bytes());
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

/// Deterministic externally-owned account address for a label.
/// Used by fixtures and the operator binary to name accounts.
pub fn account_address(label: &str) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"account");
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}
