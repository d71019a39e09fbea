//! Ledger Engine: Engine
//!
//! Top-level orchestrator. Delegates mutation to transitions, validates
//! via invariants, commits only when both succeed.
//!
//! Strict sequence enforcement, genesis-first validation, monotonic clock.

use tracing::warn;

use crate::domain::{Address, Amount, Receipt, Timestamp};
use crate::errors::{EngineError, EngineResult};
use crate::events::{Call, Transaction, SCHEMA_VERSION};
use crate::hashing::canonical_hash;
use crate::invariants::validate_invariants;
use crate::state::LedgerState;
use crate::transitions::apply_transaction as transition_apply;

/// Stateful engine wrapping the pure transition layer.
#[derive(Debug, Clone, Default)]
pub struct LedgerEngine {
    state: LedgerState,
    last_sequence: u64,
    genesis_applied: bool,
    /// Timestamp stamped on transactions built by [`LedgerEngine::submit`].
    clock: Timestamp,
}

impl LedgerEngine {
    /// A fresh engine awaiting its genesis transaction.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn now(&self) -> Timestamp {
        self.state.now
    }

    /// Apply a single transaction:
    ///   1. Validate schema version (must be 1)
    ///   2. Validate sequence (strictly increasing, no gaps)
    ///   3. Validate clock (never moves backwards)
    ///   4. Validate genesis-first rule
    ///   5. Delegate to transitions
    ///   6. Validate invariants on the new state
    ///   7. Store and return the receipt
    pub fn apply_transaction(&mut self, tx: &Transaction) -> EngineResult<Receipt> {
        let outcome = self.check_envelope(tx).and_then(|()| {
            let (new_state, receipt) = transition_apply(&self.state, tx)?;
            validate_invariants(&new_state)?;
            Ok((new_state, receipt))
        });
        match outcome {
            Ok((new_state, receipt)) => {
                self.state = new_state;
                self.last_sequence = tx.sequence;
                self.genesis_applied = true;
                self.clock = self.clock.max(tx.timestamp);
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    sequence = tx.sequence,
                    method = tx.call.method(),
                    error = %e,
                    "transaction rejected"
                );
                Err(e)
            }
        }
    }

    fn check_envelope(&self, tx: &Transaction) -> EngineResult<()> {
        if tx.schema_version != SCHEMA_VERSION {
            return Err(EngineError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                got: tx.schema_version,
            });
        }

        let expected = self.last_sequence.checked_add(1).ok_or(EngineError::Overflow)?;
        if tx.sequence != expected {
            return Err(EngineError::SequenceViolation {
                expected,
                got: tx.sequence,
            });
        }

        if tx.timestamp < self.state.now {
            return Err(EngineError::ClockRegression {
                now: self.state.now,
                got: tx.timestamp,
            });
        }

        let is_genesis = matches!(tx.call, Call::Genesis { .. });
        match (self.genesis_applied, is_genesis) {
            (false, false) => Err(EngineError::GenesisRequired),
            (true, true) => Err(EngineError::GenesisRepeated),
            _ => Ok(()),
        }
    }

    /// Apply an ordered list of transactions. Stops at the first rejection;
    /// the transactions before it stay applied.
    pub fn apply_sequence(&mut self, txs: &[Transaction]) -> EngineResult<Vec<Receipt>> {
        txs.iter().map(|tx| self.apply_transaction(tx)).collect()
    }

    /// Event-sourced reconstruction: reset and replay.
    pub fn replay(txs: &[Transaction]) -> EngineResult<Self> {
        let mut engine = Self::new();
        engine.apply_sequence(txs)?;
        Ok(engine)
    }

    pub fn canonical_hash(&self) -> EngineResult<String> {
        canonical_hash(&self.state)
    }

    // -----------------------------------------------------------------------
    // Convenience submission with an engine-held clock
    // -----------------------------------------------------------------------

    /// The transaction `submit` would apply next.
    pub fn next_transaction(&self, sender: Address, value: Amount, call: Call) -> Transaction {
        Transaction::new(self.last_sequence + 1, self.clock, sender, call).with_value(value)
    }

    /// Builds the next transaction from the engine clock and applies it.
    pub fn submit(&mut self, sender: Address, value: Amount, call: Call) -> EngineResult<Receipt> {
        let tx = self.next_transaction(sender, value, call);
        self.apply_transaction(&tx)
    }

    /// Moves the submission clock. Cannot go behind ledger time.
    pub fn set_time(&mut self, timestamp: Timestamp) -> EngineResult<()> {
        if timestamp < self.state.now {
            return Err(EngineError::ClockRegression {
                now: self.state.now,
                got: timestamp,
            });
        }
        self.clock = timestamp;
        Ok(())
    }

    pub fn advance_time(&mut self, seconds: u64) -> EngineResult<()> {
        let target = self.clock.checked_add(seconds).ok_or(EngineError::Overflow)?;
        self.set_time(target)
    }
}
