//! Replay orchestrator: rebuild state from the transaction log.
//!
//! All ledger rules live in tcr_engine. Replay goes through the same
//! envelope checks, transitions and invariants as live submission.

use tracing::info;

use tcr_engine::{LedgerEngine, LedgerState, Transaction};

use crate::errors::RuntimeResult;

/// Rebuild the engine from a sequence of transactions.
pub fn rebuild_engine(txs: &[Transaction]) -> RuntimeResult<LedgerEngine> {
    let engine = LedgerEngine::replay(txs)?;
    info!(transactions = txs.len(), "replayed transaction log");
    Ok(engine)
}

/// Rebuild the ledger state and its canonical hash.
pub fn rebuild_state(txs: &[Transaction]) -> RuntimeResult<(LedgerState, String)> {
    let engine = rebuild_engine(txs)?;
    let hash = engine.canonical_hash()?;
    Ok((engine.state().clone(), hash))
}

/// Rebuild and return only the canonical hash.
pub fn rebuild_hash(txs: &[Transaction]) -> RuntimeResult<String> {
    let (_, hash) = rebuild_state(txs)?;
    Ok(hash)
}
