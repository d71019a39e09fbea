//! Airdrop programs reachable from forum posts.
//!
//! A post stores the program address and the selectors it expects the
//! program to export. Programs are called through [`AirdropHook`] rather
//! than by raw selector dispatch.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Address, Amount, Selector};
use crate::errors::{EngineError, EngineResult};
use crate::identifiers::selector;
use crate::token::{ledger_mut, TokenLedger};

pub const VALIDATE_SIGNATURE: &str = "validate(address)";
pub const EXECUTE_SIGNATURE: &str = "execute(address)";

pub trait AirdropHook {
    /// Whether `candidate` could claim right now.
    fn validate(&self, candidate: &Address) -> bool;

    /// Pays `candidate` from the program's token balance.
    fn execute(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        candidate: &Address,
    ) -> EngineResult<Amount>;
}

/// Claim bookkeeping shared by every program kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimBook {
    pub address: Address,
    pub token: Address,
    pub amount_per_claim: Amount,
    pub claimed: BTreeSet<Address>,
}

impl ClaimBook {
    fn pay(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        candidate: &Address,
    ) -> EngineResult<Amount> {
        if self.claimed.contains(candidate) {
            return Err(EngineError::AlreadyWithdrawn(format!(
                "airdrop {} to {candidate}",
                self.address
            )));
        }
        ledger_mut(tokens, &self.token)?.transfer(&self.address, candidate, self.amount_per_claim)?;
        self.claimed.insert(*candidate);
        Ok(self.amount_per_claim)
    }
}

/// Anyone may claim once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAirdrop {
    pub book: ClaimBook,
}

impl AirdropHook for OpenAirdrop {
    fn validate(&self, candidate: &Address) -> bool {
        !self.book.claimed.contains(candidate)
    }

    fn execute(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        candidate: &Address,
    ) -> EngineResult<Amount> {
        self.book.pay(tokens, candidate)
    }
}

/// Listed accounts may claim once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowlistAirdrop {
    pub book: ClaimBook,
    pub allowlist: BTreeSet<Address>,
}

impl AirdropHook for AllowlistAirdrop {
    fn validate(&self, candidate: &Address) -> bool {
        self.allowlist.contains(candidate) && !self.book.claimed.contains(candidate)
    }

    fn execute(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        candidate: &Address,
    ) -> EngineResult<Amount> {
        if !self.allowlist.contains(candidate) {
            return Err(EngineError::NotAuthorized(format!(
                "{candidate} is not on the allowlist of {}",
                self.book.address
            )));
        }
        self.book.pay(tokens, candidate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirdropProgram {
    Open(OpenAirdrop),
    Allowlist(AllowlistAirdrop),
}

impl AirdropProgram {
    pub fn new(
        address: Address,
        token: Address,
        amount_per_claim: Amount,
        allowlist: Option<Vec<Address>>,
    ) -> Self {
        let book = ClaimBook {
            address,
            token,
            amount_per_claim,
            claimed: BTreeSet::new(),
        };
        match allowlist {
            None => AirdropProgram::Open(OpenAirdrop { book }),
            Some(list) => AirdropProgram::Allowlist(AllowlistAirdrop {
                book,
                allowlist: list.into_iter().collect(),
            }),
        }
    }

    pub fn book(&self) -> &ClaimBook {
        match self {
            AirdropProgram::Open(p) => &p.book,
            AirdropProgram::Allowlist(p) => &p.book,
        }
    }

    pub fn hook(&self) -> &dyn AirdropHook {
        match self {
            AirdropProgram::Open(p) => p,
            AirdropProgram::Allowlist(p) => p,
        }
    }

    pub fn hook_mut(&mut self) -> &mut dyn AirdropHook {
        match self {
            AirdropProgram::Open(p) => p,
            AirdropProgram::Allowlist(p) => p,
        }
    }

    /// Every program exports the same two entry points.
    pub fn exports(&self, sel: &Selector) -> bool {
        *sel == selector(VALIDATE_SIGNATURE) || *sel == selector(EXECUTE_SIGNATURE)
    }
}

/// Program address and entry points recorded on an airdrop post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirdropTarget {
    pub program: Address,
    pub validate: Selector,
    pub execute: Selector,
}

impl AirdropTarget {
    pub fn standard(program: Address) -> Self {
        Self {
            program,
            validate: selector(VALIDATE_SIGNATURE),
            execute: selector(EXECUTE_SIGNATURE),
        }
    }
}
