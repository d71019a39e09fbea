//! Drift detection: determinism verification and state comparison.
//!
//! Amounts are u128 token units; signed deltas are i128 and absent when
//! a side does not fit. No float arithmetic anywhere.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use tcr_engine::invariants::token_liabilities;
use tcr_engine::registry::ListKind;
use tcr_engine::{Address, Amount, CapabilityId, LedgerState, Transaction};

use crate::errors::{RuntimeError, RuntimeResult};
use crate::replay;

/// Replay the same transactions twice and require identical hashes.
/// Returns the agreed hash.
pub fn verify_determinism(txs: &[Transaction]) -> RuntimeResult<String> {
    let first = replay::rebuild_hash(txs)?;
    let second = replay::rebuild_hash(txs)?;
    if first != second {
        return Err(RuntimeError::Determinism { first, second });
    }
    Ok(first)
}

/// An amount observed in both states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmountDrift {
    pub a: Amount,
    pub b: Amount,
}

impl AmountDrift {
    pub fn delta(&self) -> Option<i128> {
        let a = i128::try_from(self.a).ok()?;
        let b = i128::try_from(self.b).ok()?;
        b.checked_sub(a)
    }

    pub fn changed(&self) -> bool {
        self.a != self.b
    }
}

/// List sizes of one registry. A registry missing from a state counts as
/// empty there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryDrift {
    pub registry: Address,
    pub pending: (u64, u64),
    pub voting: (u64, u64),
    pub whitelisted: (u64, u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenDrift {
    pub token: Address,
    pub supply: AmountDrift,
    /// Escrow and rewards the ledger's modules owe in this token.
    pub liabilities: AmountDrift,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rebinding {
    pub id: CapabilityId,
    pub from: Address,
    pub to: Address,
}

/// Structured comparison of two ledger states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub contract_count_a: i64,
    pub contract_count_b: i64,
    pub contract_count_delta: i64,
    pub native_supply: AmountDrift,
    pub registries: Vec<RegistryDrift>,
    pub tokens: Vec<TokenDrift>,
    pub added_entries: Vec<CapabilityId>,
    pub removed_entries: Vec<CapabilityId>,
    pub rebound_entries: Vec<Rebinding>,
}

impl DriftReport {
    /// True when nothing the report tracks differs.
    pub fn is_empty(&self) -> bool {
        self.contract_count_delta == 0
            && !self.native_supply.changed()
            && self.registries.iter().all(|r| {
                r.pending.0 == r.pending.1 && r.voting.0 == r.voting.1 && r.whitelisted.0 == r.whitelisted.1
            })
            && self.tokens.iter().all(|t| !t.supply.changed() && !t.liabilities.changed())
            && self.added_entries.is_empty()
            && self.removed_entries.is_empty()
            && self.rebound_entries.is_empty()
    }
}

fn list_len(state: &LedgerState, registry: &Address, list: ListKind) -> u64 {
    state.registries.get(registry).map_or(0, |r| r.list_len(list))
}

/// Compare `a` (before) with `b` (after).
pub fn compare_states(a: &LedgerState, b: &LedgerState) -> RuntimeResult<DriftReport> {
    let registry_ids: BTreeSet<&Address> = a.registries.keys().chain(b.registries.keys()).collect();
    let registries = registry_ids
        .into_iter()
        .map(|registry| {
            let sizes = |list| (list_len(a, registry, list), list_len(b, registry, list));
            RegistryDrift {
                registry: *registry,
                pending: sizes(ListKind::Pending),
                voting: sizes(ListKind::Voting),
                whitelisted: sizes(ListKind::Whitelisted),
            }
        })
        .collect();

    let token_ids: BTreeSet<&Address> = a.tokens.keys().chain(b.tokens.keys()).collect();
    let mut tokens = Vec::new();
    for token in token_ids {
        let supply = |s: &LedgerState| s.tokens.get(token).map_or(0, |t| t.total_supply);
        tokens.push(TokenDrift {
            token: *token,
            supply: AmountDrift { a: supply(a), b: supply(b) },
            liabilities: AmountDrift {
                a: token_liabilities(a, token)?,
                b: token_liabilities(b, token)?,
            },
        });
    }

    let empty: BTreeMap<CapabilityId, Address> = BTreeMap::new();
    let entries_a = a.directory.as_ref().map_or(&empty, |d| &d.entries);
    let entries_b = b.directory.as_ref().map_or(&empty, |d| &d.entries);
    let added_entries = entries_b.keys().filter(|id| !entries_a.contains_key(id)).copied().collect();
    let removed_entries = entries_a.keys().filter(|id| !entries_b.contains_key(id)).copied().collect();
    let rebound_entries = entries_a
        .iter()
        .filter_map(|(id, from)| match entries_b.get(id) {
            Some(to) if to != from => Some(Rebinding { id: *id, from: *from, to: *to }),
            _ => None,
        })
        .collect();

    let count_a = a.contracts.len() as i64;
    let count_b = b.contracts.len() as i64;
    Ok(DriftReport {
        contract_count_a: count_a,
        contract_count_b: count_b,
        contract_count_delta: count_b - count_a,
        native_supply: AmountDrift { a: a.native.supply, b: b.native.supply },
        registries,
        tokens,
        added_entries,
        removed_entries,
        rebound_entries,
    })
}
