//! Session manager: isolated sessions with persist-after-apply semantics.
//!
//! Each session gets its own directory with a transaction log and
//! snapshots. Concurrency: Mutex for write serialization, no global
//! mutable state.
//!
//! Apply-before-persist order:
//!   1. engine.apply_transaction(tx): a rejection stops here
//!   2. tx_log.append(tx): only if step 1 succeeded; a failed append
//!      restores the engine to its state before step 1
//!   3. snapshot if interval reached

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use tcr_engine::{Address, Amount, Call, LedgerEngine, LedgerState, Receipt, Timestamp, Transaction, TxSink};

use crate::errors::{RuntimeError, RuntimeResult};
use crate::replay;
use crate::snapshot;
use crate::tx_log::TxLog;

pub const LOG_FILE: &str = "transactions.log";
pub const SNAPSHOT_DIR: &str = "snapshots";

/// An isolated ledger session with its own transaction log and state.
#[derive(Debug)]
pub struct Session {
    session_id: String,
    dir: PathBuf,
    engine: LedgerEngine,
    log: TxLog,
    snapshot_interval: u64,
}

impl Session {
    /// Open (or create) a session under `base_dir`.
    ///
    /// Directory structure:
    ///   <base_dir>/<session_id>/transactions.log
    ///   <base_dir>/<session_id>/snapshots/
    ///
    /// An existing log is replayed through the engine.
    pub fn open(base_dir: &Path, session_id: &str, snapshot_interval: u64) -> RuntimeResult<Self> {
        let dir = base_dir.join(session_id);
        let log = TxLog::open(&dir.join(LOG_FILE))?;

        let engine = if log.last_sequence() > 0 {
            replay::rebuild_engine(&log.load_all()?)?
        } else {
            LedgerEngine::new()
        };

        info!(
            session = session_id,
            sequence = engine.last_sequence(),
            "session opened"
        );
        Ok(Self {
            session_id: session_id.to_string(),
            dir,
            engine,
            log,
            snapshot_interval,
        })
    }

    /// Apply a transaction, then persist it. The engine never runs ahead
    /// of the log.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> RuntimeResult<Receipt> {
        let before = self.engine.clone();
        let receipt = self.engine.apply_transaction(tx)?;
        if let Err(err) = self.log.append(tx) {
            warn!(
                session = %self.session_id,
                sequence = tx.sequence,
                error = %err,
                "append failed, engine rolled back"
            );
            self.engine = before;
            return Err(err);
        }

        if self.snapshot_interval > 0 && tx.sequence % self.snapshot_interval == 0 {
            snapshot::save_snapshot(&self.snapshot_dir(), tx.sequence, self.engine.state())?;
        }
        Ok(receipt)
    }

    /// Build the next transaction from the session clock and apply it.
    pub fn submit(&mut self, sender: Address, value: Amount, call: Call) -> RuntimeResult<Receipt> {
        let tx = self.engine.next_transaction(sender, value, call);
        self.apply_transaction(&tx)
    }

    pub fn set_time(&mut self, timestamp: Timestamp) -> RuntimeResult<()> {
        Ok(self.engine.set_time(timestamp)?)
    }

    pub fn advance_time(&mut self, seconds: u64) -> RuntimeResult<()> {
        Ok(self.engine.advance_time(seconds)?)
    }

    /// Reset the engine and replay the whole log.
    pub fn replay_full(&mut self) -> RuntimeResult<(LedgerState, String)> {
        let txs = self.log.load_all()?;
        let engine = replay::rebuild_engine(&txs)?;
        let hash = engine.canonical_hash()?;
        let state = engine.state().clone();
        self.engine = engine;
        Ok((state, hash))
    }

    /// Compare the latest snapshot with a replay of the log up to its
    /// sequence. `Ok(None)` when there is no snapshot yet.
    pub fn verify_latest_snapshot(&self) -> RuntimeResult<Option<bool>> {
        let Some(snap) = snapshot::load_latest_snapshot(&self.snapshot_dir())? else {
            return Ok(None);
        };
        let txs = self.log.load_all()?;
        let covered = usize::try_from(snap.sequence)
            .ok()
            .filter(|n| *n <= txs.len())
            .ok_or_else(|| {
                RuntimeError::Snapshot(format!(
                    "snapshot at {} is ahead of the log ({} transactions)",
                    snap.sequence,
                    txs.len()
                ))
            })?;
        let replayed = replay::rebuild_hash(&txs[..covered])?;
        let matches = snapshot::verify_snapshot_hash(&snap) && replayed == snap.hash;
        if !matches {
            warn!(
                session = %self.session_id,
                sequence = snap.sequence,
                snapshot = %snap.hash,
                replayed = %replayed,
                "snapshot does not match replay"
            );
        }
        Ok(Some(matches))
    }

    pub fn engine(&self) -> &LedgerEngine {
        &self.engine
    }

    pub fn state(&self) -> &LedgerState {
        self.engine.state()
    }

    pub fn current_hash(&self) -> RuntimeResult<String> {
        Ok(self.engine.canonical_hash()?)
    }

    pub fn current_sequence(&self) -> u64 {
        self.log.last_sequence()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_DIR)
    }

    /// Every persisted transaction.
    pub fn transactions(&self) -> RuntimeResult<Vec<Transaction>> {
        self.log.load_all()
    }
}

impl TxSink for Session {
    type Error = RuntimeError;

    fn submit(&mut self, sender: Address, value: Amount, call: Call) -> RuntimeResult<Receipt> {
        Session::submit(self, sender, value, call)
    }
}

/// Thread-safe session handle using Mutex.
#[derive(Debug)]
pub struct SharedSession {
    inner: Mutex<Session>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    fn lock(&self) -> RuntimeResult<MutexGuard<'_, Session>> {
        self.inner.lock().map_err(|_| RuntimeError::LockPoisoned)
    }

    pub fn apply_transaction(&self, tx: &Transaction) -> RuntimeResult<Receipt> {
        self.lock()?.apply_transaction(tx)
    }

    pub fn submit(&self, sender: Address, value: Amount, call: Call) -> RuntimeResult<Receipt> {
        self.lock()?.submit(sender, value, call)
    }

    pub fn advance_time(&self, seconds: u64) -> RuntimeResult<()> {
        self.lock()?.advance_time(seconds)
    }

    pub fn current_hash(&self) -> RuntimeResult<String> {
        self.lock()?.current_hash()
    }

    pub fn current_sequence(&self) -> RuntimeResult<u64> {
        Ok(self.lock()?.current_sequence())
    }

    /// Run `f` against the session under the lock.
    pub fn with<T>(&self, f: impl FnOnce(&mut Session) -> T) -> RuntimeResult<T> {
        let mut session = self.lock()?;
        Ok(f(&mut session))
    }

    pub fn into_inner(self) -> RuntimeResult<Session> {
        self.inner.into_inner().map_err(|_| RuntimeError::LockPoisoned)
    }
}

impl TxSink for &SharedSession {
    type Error = RuntimeError;

    fn submit(&mut self, sender: Address, value: Amount, call: Call) -> RuntimeResult<Receipt> {
        SharedSession::submit(*self, sender, value, call)
    }
}
