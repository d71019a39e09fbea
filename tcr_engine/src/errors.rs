//! Ledger Engine: Errors
//!
//! Every rejected transaction surfaces exactly one of these. A rejection
//! leaves the ledger untouched.

use thiserror::Error;

use crate::contracts::ContractKind;
use crate::domain::{Address, Amount, CapabilityId, Hash32, Selector, Timestamp};

/// Error during ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // -- authority --
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Caller {0} is not the original poster")]
    NotPoster(Address),

    // -- directory / kernel --
    #[error("Capability {0} has no registered address")]
    NotRegistered(CapabilityId),

    #[error("{0:?} is not deployed")]
    NotDeployed(ContractKind),

    #[error("{0:?} is already deployed")]
    AlreadyDeployed(ContractKind),

    #[error("No {expected:?} contract at {address}")]
    UnknownContract {
        address: Address,
        expected: ContractKind,
    },

    #[error("{kind:?} requires library {library} to be linked")]
    UnlinkedLibrary { kind: ContractKind, library: String },

    #[error("Selector {selector} is not exported by {program}")]
    UnknownSelector { selector: Selector, program: Address },

    // -- entries --
    #[error("Duplicate entry {0}")]
    DuplicateEntry(Hash32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Entry {0} is not in the pending list")]
    NotPending(Hash32),

    #[error("Entry {0} is not in the voting list")]
    NotInVoting(Hash32),

    // -- polls --
    #[error("Poll for {0} has not started")]
    PollNotStarted(Hash32),

    #[error("Poll for {hash} closed at {end}")]
    PollClosed { hash: Hash32, end: Timestamp },

    #[error("Poll for {hash} ends at {end}")]
    PollNotEnded { hash: Hash32, end: Timestamp },

    #[error("Delist of {hash} refused: against={vote_against} does not exceed for={vote_for}")]
    DelistRefused {
        hash: Hash32,
        vote_for: Amount,
        vote_against: Amount,
    },

    #[error("Nothing withdrawable: {0}")]
    NotWithdrawable(String),

    #[error("Already withdrawn: {0}")]
    AlreadyWithdrawn(String),

    // -- value movement --
    #[error("Insufficient approval: allowance {allowance}, need {need}")]
    InsufficientApproval { allowance: Amount, need: Amount },

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Call does not accept native value")]
    NonPayable,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Arithmetic underflow")]
    Underflow,

    // -- ledger discipline --
    #[error("Schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },

    #[error("Sequence violation: expected {expected}, got {got}")]
    SequenceViolation { expected: u64, got: u64 },

    #[error("Clock moved backwards: ledger time {now}, transaction time {got}")]
    ClockRegression { now: Timestamp, got: Timestamp },

    #[error("First transaction must be genesis")]
    GenesisRequired,

    #[error("Genesis can only be the first transaction")]
    GenesisRepeated,

    #[error("Corrupt list: {0}")]
    CorruptList(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Result type for ledger operations.
pub type EngineResult<T> = Result<T, EngineError>;
