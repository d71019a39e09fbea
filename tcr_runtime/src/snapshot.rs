//! Snapshot layer: deterministic ledger snapshots.
//!
//! A snapshot holds the canonical JSON of the state plus its SHA-256, so
//! `hash` equals the engine's canonical hash at `sequence`. No wall-clock
//! time in snapshot content.
//!
//! If a snapshot hash doesn't match replay, the log wins.
//!
//! - `encode_state`:  LedgerState → canonical JSON
//! - `decode_state`:  canonical JSON → LedgerState (strict, no defaults)
//! - `restore_state`: decode + engine version check + invariant validation

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use tcr_engine::hashing::{canonical_hash, canonical_serialize};
use tcr_engine::invariants::validate_invariants;
use tcr_engine::{LedgerState, ENGINE_VERSION};

use crate::errors::{RuntimeError, RuntimeResult};

/// Snapshot on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Sequence of the last transaction covered.
    pub sequence: u64,
    /// Canonical JSON of the state (UTF-8).
    pub canonical_json: String,
    /// SHA-256 of `canonical_json`, lowercase hex.
    pub hash: String,
    pub engine_version: u32,
}

impl Snapshot {
    pub fn capture(sequence: u64, state: &LedgerState) -> RuntimeResult<Self> {
        Ok(Self {
            sequence,
            canonical_json: encode_state(state)?,
            hash: canonical_hash(state)?,
            engine_version: ENGINE_VERSION,
        })
    }

    /// Decoded and validated state.
    pub fn restore(&self) -> RuntimeResult<LedgerState> {
        if !verify_snapshot_hash(self) {
            return Err(RuntimeError::Snapshot(format!(
                "hash mismatch at sequence {}",
                self.sequence
            )));
        }
        restore_state(&self.canonical_json)
    }
}

/// Owned mirror of the engine's canonical view.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CanonicalState {
    engine_version: u32,
    state: LedgerState,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

pub fn encode_state(state: &LedgerState) -> RuntimeResult<String> {
    let bytes = canonical_serialize(state)?;
    String::from_utf8(bytes).map_err(|e| RuntimeError::Snapshot(e.to_string()))
}

/// Strict decode: unknown or missing fields fail. No invariant check; use
/// [`restore_state`] for anything read from disk.
pub fn decode_state(json: &str) -> RuntimeResult<LedgerState> {
    let view: CanonicalState = serde_json::from_str(json)?;
    if view.engine_version != ENGINE_VERSION {
        return Err(RuntimeError::Snapshot(format!(
            "engine version {} cannot restore version {}",
            ENGINE_VERSION, view.engine_version
        )));
    }
    Ok(view.state)
}

pub fn restore_state(json: &str) -> RuntimeResult<LedgerState> {
    let state = decode_state(json)?;
    validate_invariants(&state)?;
    Ok(state)
}

/// SHA-256 of arbitrary canonical JSON. Lowercase hex.
pub fn json_hash(json: &str) -> String {
    hex::encode(Sha256::digest(json.as_bytes()))
}

/// True if the hash matches the canonical JSON content.
pub fn verify_snapshot_hash(snap: &Snapshot) -> bool {
    json_hash(&snap.canonical_json) == snap.hash
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

fn snapshot_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!("snapshot_{sequence:06}.json"))
}

/// Save a snapshot of `state` taken at `sequence`.
pub fn save_snapshot(dir: &Path, sequence: u64, state: &LedgerState) -> RuntimeResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let snap = Snapshot::capture(sequence, state)?;
    let path = snapshot_path(dir, sequence);

    let content = serde_json::to_string(&snap)?;
    let mut file = File::create(&path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    info!(sequence, hash = %snap.hash, "saved snapshot");
    Ok(path)
}

/// Load the snapshot at a specific sequence, if one exists.
pub fn load_snapshot(dir: &Path, sequence: u64) -> RuntimeResult<Option<Snapshot>> {
    let path = snapshot_path(dir, sequence);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let snap = serde_json::from_str(&content)
        .map_err(|e| RuntimeError::Snapshot(format!("{}: {e}", path.display())))?;
    Ok(Some(snap))
}

/// Load the snapshot with the highest sequence in `dir`.
pub fn load_latest_snapshot(dir: &Path) -> RuntimeResult<Option<Snapshot>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut best: Option<u64> = None;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let seq = name
            .to_str()
            .and_then(|s| s.strip_prefix("snapshot_"))
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(seq) = seq {
            best = Some(best.map_or(seq, |b| b.max(seq)));
        }
    }

    match best {
        Some(seq) => load_snapshot(dir, seq),
        None => Ok(None),
    }
}

/// Write the bare canonical JSON of `state` to `path`.
pub fn export_state(state: &LedgerState, path: &Path) -> RuntimeResult<()> {
    let json = encode_state(state)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json.as_bytes())?;
    Ok(())
}

/// Read a state exported by [`export_state`], validating invariants.
pub fn import_state(path: &Path) -> RuntimeResult<LedgerState> {
    let content = fs::read_to_string(path)?;
    restore_state(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcr_engine::domain::{LedgerConstants, NativeAllocation};
    use tcr_engine::hashing::account_address;
    use tcr_engine::{deploy_system, Call, DeploymentParams, EngineError, LedgerEngine};

    fn deployed() -> LedgerEngine {
        let root = account_address("root");
        let mut engine = LedgerEngine::new();
        engine
            .submit(
                root,
                0,
                Call::Genesis {
                    constants: LedgerConstants::default(),
                    allocations: vec![NativeAllocation { account: root, amount: 5 }],
                },
            )
            .unwrap();
        deploy_system(&mut engine, root, &DeploymentParams::default()).unwrap();
        engine
    }

    #[test]
    fn snapshot_hash_is_the_canonical_hash() {
        let engine = deployed();
        let snap = Snapshot::capture(engine.last_sequence(), engine.state()).unwrap();
        assert_eq!(snap.hash, engine.canonical_hash().unwrap());
        assert!(verify_snapshot_hash(&snap));
        assert_eq!(&snap.restore().unwrap(), engine.state());
    }

    #[test]
    fn latest_snapshot_wins() {
        let engine = deployed();
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), 3, &LedgerState::default()).unwrap();
        save_snapshot(dir.path(), 12, engine.state()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let latest = load_latest_snapshot(dir.path()).unwrap().unwrap();
        assert_eq!(latest.sequence, 12);
        assert_eq!(latest.hash, engine.canonical_hash().unwrap());
        assert!(load_snapshot(dir.path(), 4).unwrap().is_none());
    }

    #[test]
    fn tampered_snapshot_is_refused() {
        let engine = deployed();
        let mut snap = Snapshot::capture(1, engine.state()).unwrap();
        snap.canonical_json = snap.canonical_json.replacen("\"now\":0", "\"now\":1", 1);
        assert!(!verify_snapshot_hash(&snap));
        assert!(matches!(snap.restore(), Err(RuntimeError::Snapshot(_))));
    }

    #[test]
    fn restore_checks_invariants() {
        let mut state = deployed().state().clone();
        let token = *state.tokens.keys().next().unwrap();
        if let Some(ledger) = state.tokens.get_mut(&token) {
            ledger.total_supply += 1;
        }
        let json = encode_state(&state).unwrap();
        assert!(decode_state(&json).is_ok());
        assert!(matches!(
            restore_state(&json),
            Err(RuntimeError::Engine(EngineError::InvariantViolation(_)))
        ));
    }

    #[test]
    fn other_engine_versions_are_refused() {
        let json = encode_state(&LedgerState::default()).unwrap();
        let bumped = json.replacen(
            &format!("\"engine_version\":{ENGINE_VERSION}"),
            "\"engine_version\":99",
            1,
        );
        assert!(matches!(decode_state(&bumped), Err(RuntimeError::Snapshot(_))));
    }

    #[test]
    fn export_then_import() {
        let engine = deployed();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("state.json");
        export_state(engine.state(), &path).unwrap();
        assert_eq!(&import_state(&path).unwrap(), engine.state());
        assert_eq!(
            json_hash(&std::fs::read_to_string(&path).unwrap()),
            engine.canonical_hash().unwrap()
        );
    }
}
