//! Ledger Engine: Invariant Checks
//!
//! Hard-fail validation run after every transition. Returns the first
//! violation found.

use std::collections::BTreeMap;

use crate::arithmetic::{checked_add, checked_sum};
use crate::domain::{Address, Amount};
use crate::errors::{EngineError, EngineResult};
use crate::forum::PostExtension;
use crate::state::LedgerState;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every check. Fails on the first violation.
pub fn validate_invariants(state: &LedgerState) -> EngineResult<()> {
    check_token_supply(state)?;
    check_native_supply(state)?;
    check_registry_lists(state)?;
    check_registry_escrow(state)?;
    check_forum_coverage(state)?;
    check_milestone_coverage(state)?;
    check_handlers_bound_to_kernel(state)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn violation(tag: &str, detail: String) -> EngineError {
    EngineError::InvariantViolation(format!("[{tag}] {detail}"))
}

/// Per token, balances sum to the fixed total supply.
fn check_token_supply(state: &LedgerState) -> EngineResult<()> {
    for (address, token) in &state.tokens {
        let circulating = token.circulating()?;
        if circulating != token.total_supply {
            return Err(violation(
                "token_supply",
                format!("{address}: balances {circulating} != supply {}", token.total_supply),
            ));
        }
    }
    Ok(())
}

fn check_native_supply(state: &LedgerState) -> EngineResult<()> {
    let held = checked_sum(state.native.balances.values().copied())?;
    if held != state.native.supply {
        return Err(violation(
            "native_supply",
            format!("balances {held} != supply {}", state.native.supply),
        ));
    }
    Ok(())
}

fn check_registry_lists(state: &LedgerState) -> EngineResult<()> {
    for (address, registry) in &state.registries {
        registry
            .check_lists()
            .map_err(|e| violation("registry_lists", format!("{address}: {e}")))?;
    }
    Ok(())
}

/// Each registry holds at least the stake it still owes voters.
fn check_registry_escrow(state: &LedgerState) -> EngineResult<()> {
    for (address, registry) in &state.registries {
        let owed = registry.outstanding_escrow()?;
        let held = state.token_balance(&registry.token, address);
        if held < owed {
            return Err(violation(
                "registry_escrow",
                format!("{address}: holds {held}, owes {owed}"),
            ));
        }
    }
    Ok(())
}

/// Each forum holds, per token, its unwithdrawn rewards plus uncollected
/// fees, and enough native currency for its live milestones.
fn check_forum_coverage(state: &LedgerState) -> EngineResult<()> {
    for (address, forum) in &state.forums {
        let mut tokens: BTreeMap<Address, Amount> = BTreeMap::new();
        for post in forum.posts.values() {
            tokens.entry(post.token).or_insert(0);
        }
        for token in forum.fees.keys() {
            tokens.entry(*token).or_insert(0);
        }
        for token in tokens.keys() {
            let owed = forum.token_liability(token)?;
            let held = state.token_balance(token, address);
            if held < owed {
                return Err(violation(
                    "forum_tokens",
                    format!("{address}: holds {held} of {token}, owes {owed}"),
                ));
            }
        }
        let owed_native = forum.native_liability()?;
        let held_native = state.native_balance(address);
        if held_native < owed_native {
            return Err(violation(
                "forum_native",
                format!("{address}: holds {held_native}, owes {owed_native}"),
            ));
        }
    }
    Ok(())
}

fn check_milestone_coverage(state: &LedgerState) -> EngineResult<()> {
    for (address, forum) in &state.forums {
        for (hash, post) in &forum.posts {
            if let PostExtension::Milestone(m) = &post.extension {
                m.check_coverage()
                    .map_err(|e| violation("milestone", format!("{address}/{hash}: {e}")))?;
            }
        }
    }
    Ok(())
}

/// Handlers and exchanges point at the one kernel.
fn check_handlers_bound_to_kernel(state: &LedgerState) -> EngineResult<()> {
    let kernel = state.kernel.as_ref().map(|k| k.address);
    let mut bound: Vec<(Address, Address)> = Vec::new();
    if let Some(acl) = &state.acl {
        bound.push((acl.address, acl.kernel));
    }
    if let Some(dir) = &state.directory {
        bound.push((dir.address, dir.kernel));
    }
    for ex in state.exchanges.values() {
        bound.push((ex.address, ex.kernel));
    }
    for (module, k) in bound {
        if Some(k) != kernel {
            return Err(violation(
                "kernel_binding",
                format!("{module} is bound to {k}, which is not the deployed kernel"),
            ));
        }
    }
    Ok(())
}

/// Total liabilities of every module towards `token`. Used by drift
/// reports.
pub fn token_liabilities(state: &LedgerState, token: &Address) -> EngineResult<Amount> {
    let mut owed: Amount = 0;
    for registry in state.registries.values().filter(|r| r.token == *token) {
        owed = checked_add(owed, registry.outstanding_escrow()?)?;
    }
    for forum in state.forums.values() {
        owed = checked_add(owed, forum.token_liability(token)?)?;
    }
    Ok(owed)
}
