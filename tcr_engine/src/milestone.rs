//! Milestone escrow with put options.
//!
//! Native currency posted with a milestone backs `value * price` milestone
//! tokens. Investors buy put options on part of that allocation (fee paid
//! in the forum's utility token), and may execute them before expiry to
//! sell milestone tokens back at the locked price. The poster withdraws
//! whatever native backing is left once the milestone has expired.
//!
//! While the escrow is live, `native_balance * price` always equals
//! `available_tokens + sum(put_options)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arithmetic::{checked_add, checked_mul, checked_sub, checked_sum};
use crate::domain::{Address, Amount, Timestamp};
use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MilestoneTerms {
    /// Token investors hand back when executing an option.
    pub token: Address,
    /// Milestone tokens per unit of native currency.
    pub price: Amount,
    pub end_time: Timestamp,
    pub fee_rate: Amount,
    /// `fee = amount * fee_rate` when set, `amount / fee_rate` otherwise.
    pub rate_gt_one: bool,
}

impl MilestoneTerms {
    pub fn fee_for(&self, amount: Amount) -> EngineResult<Amount> {
        if self.rate_gt_one {
            checked_mul(amount, self.fee_rate)
        } else if self.fee_rate == 0 {
            Err(EngineError::InvalidAmount("fee rate divisor is zero".to_string()))
        } else {
            Ok(amount / self.fee_rate)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Milestone {
    pub terms: MilestoneTerms,
    /// Allocation not yet covered by a put option.
    pub available_tokens: Amount,
    /// Native currency still held for this milestone.
    pub native_balance: Amount,
    pub put_options: BTreeMap<Address, Amount>,
    pub withdrawn: bool,
}

impl Milestone {
    pub fn open(terms: MilestoneTerms, value: Amount, now: Timestamp) -> EngineResult<Self> {
        if terms.price == 0 {
            return Err(EngineError::InvalidAmount("milestone price must be positive".to_string()));
        }
        if value == 0 {
            return Err(EngineError::InvalidAmount("milestone needs native backing".to_string()));
        }
        if terms.end_time <= now {
            return Err(EngineError::InvalidRange(format!(
                "milestone end {} is not after {now}",
                terms.end_time
            )));
        }
        // reject unusable fee terms up front
        terms.fee_for(0)?;
        Ok(Self {
            available_tokens: checked_mul(value, terms.price)?,
            native_balance: value,
            terms,
            put_options: BTreeMap::new(),
            withdrawn: false,
        })
    }

    pub fn option_balance(&self, investor: &Address) -> Amount {
        self.put_options.get(investor).copied().unwrap_or(0)
    }

    /// Reserves `amount` of the allocation for `investor` and returns the
    /// fee owed.
    pub fn purchase(&mut self, investor: Address, amount: Amount, now: Timestamp) -> EngineResult<Amount> {
        self.ensure_live(now)?;
        if amount == 0 {
            return Err(EngineError::InvalidAmount("option amount must be positive".to_string()));
        }
        if amount > self.available_tokens {
            return Err(EngineError::InvalidRange(format!(
                "option of {amount} exceeds available {}",
                self.available_tokens
            )));
        }
        let fee = self.terms.fee_for(amount)?;
        self.available_tokens -= amount;
        let held = checked_add(self.option_balance(&investor), amount)?;
        self.put_options.insert(investor, held);
        Ok(fee)
    }

    /// Consumes `amount` of the investor's options and returns the native
    /// currency owed for it.
    pub fn execute(&mut self, investor: Address, amount: Amount, now: Timestamp) -> EngineResult<Amount> {
        self.ensure_live(now)?;
        let held = self.option_balance(&investor);
        if amount == 0 || amount > held {
            return Err(EngineError::InvalidAmount(format!(
                "cannot execute {amount} of {held} held"
            )));
        }
        if amount % self.terms.price != 0 {
            return Err(EngineError::InvalidAmount(format!(
                "{amount} is not a multiple of price {}",
                self.terms.price
            )));
        }
        let refund = amount / self.terms.price;
        self.native_balance = checked_sub(self.native_balance, refund)?;
        let left = held - amount;
        if left == 0 {
            self.put_options.remove(&investor);
        } else {
            self.put_options.insert(investor, left);
        }
        Ok(refund)
    }

    /// Releases the remaining backing after expiry.
    pub fn release(&mut self, now: Timestamp) -> EngineResult<Amount> {
        if now < self.terms.end_time {
            return Err(EngineError::NotWithdrawable(format!(
                "milestone runs until {}",
                self.terms.end_time
            )));
        }
        if self.withdrawn {
            return Err(EngineError::AlreadyWithdrawn("milestone backing".to_string()));
        }
        let amount = self.native_balance;
        self.native_balance = 0;
        self.withdrawn = true;
        Ok(amount)
    }

    pub fn check_coverage(&self) -> EngineResult<()> {
        if self.withdrawn {
            return Ok(());
        }
        let backed = checked_mul(self.native_balance, self.terms.price)?;
        let committed = checked_add(
            self.available_tokens,
            checked_sum(self.put_options.values().copied())?,
        )?;
        if backed != committed {
            return Err(EngineError::InvariantViolation(format!(
                "milestone backs {backed} tokens but commits {committed}"
            )));
        }
        Ok(())
    }

    fn ensure_live(&self, now: Timestamp) -> EngineResult<()> {
        if now >= self.terms.end_time {
            return Err(EngineError::InvalidRange(format!(
                "milestone expired at {}",
                self.terms.end_time
            )));
        }
        Ok(())
    }
}
