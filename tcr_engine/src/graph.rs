//! Ledger Engine: Wiring Audit
//!
//! Read-only analysis of the module graph formed by ACL connections and
//! directory entries. Connecting a module does not check that its
//! dependencies resolve; these functions report the gaps instead.
//! All traversal is over sorted keys.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Address, CapabilityId};
use crate::state::LedgerState;

/// A declared dependency with no directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    pub module: Address,
    pub dependency: CapabilityId,
}

// ---------------------------------------------------------------------------
// Gaps
// ---------------------------------------------------------------------------

/// Connected modules whose declared dependencies are not registered.
pub fn unresolved_dependencies(state: &LedgerState) -> Vec<UnresolvedDependency> {
    let (Some(acl), Some(dir)) = (&state.acl, &state.directory) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (module, deps) in &acl.modules {
        for dep in deps {
            if !dir.contains(dep) {
                out.push(UnresolvedDependency {
                    module: *module,
                    dependency: *dep,
                });
            }
        }
    }
    out
}

/// Registered contract addresses that were never connected. Externally
/// owned accounts (the root) are skipped.
pub fn unconnected_modules(state: &LedgerState) -> Vec<(CapabilityId, Address)> {
    let Some(dir) = &state.directory else {
        return Vec::new();
    };
    let connected = |a: &Address| state.acl.as_ref().is_some_and(|acl| acl.is_connected(a));
    dir.entries
        .iter()
        .filter(|(_, addr)| state.contracts.contains_key(addr) && !connected(addr))
        .map(|(id, addr)| (*id, *addr))
        .collect()
}

/// Connected modules that declare `id` as a dependency.
pub fn dependents_of(state: &LedgerState, id: &CapabilityId) -> Vec<Address> {
    let Some(acl) = &state.acl else {
        return Vec::new();
    };
    acl.modules
        .iter()
        .filter(|(_, deps)| deps.contains(id))
        .map(|(module, _)| *module)
        .collect()
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Dependency cycles among connected modules, with dependencies resolved
/// through the directory. Iterative DFS with colour tracking.
pub fn detect_dependency_cycles(state: &LedgerState) -> Vec<Vec<Address>> {
    let (Some(acl), Some(dir)) = (&state.acl, &state.directory) else {
        return Vec::new();
    };

    let mut adj: BTreeMap<Address, Vec<Address>> = BTreeMap::new();
    for (module, deps) in &acl.modules {
        let mut targets: Vec<Address> = deps.iter().filter_map(|d| dir.entries.get(d).copied()).collect();
        targets.sort();
        targets.dedup();
        adj.insert(*module, targets);
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Colour {
        White,
        Grey,
        Black,
    }

    let nodes: BTreeSet<Address> = adj
        .keys()
        .copied()
        .chain(adj.values().flatten().copied())
        .collect();
    let mut colour: BTreeMap<Address, Colour> = nodes.iter().map(|n| (*n, Colour::White)).collect();
    let mut cycles = Vec::new();

    for start in &nodes {
        if colour.get(start) != Some(&Colour::White) {
            continue;
        }
        let mut stack: Vec<(Address, usize)> = vec![(*start, 0)];
        colour.insert(*start, Colour::Grey);

        while let Some(top) = stack.last_mut() {
            let (node, idx) = *top;
            let neighbours = adj.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if idx < neighbours.len() {
                top.1 = idx + 1;
                let next = neighbours[idx];
                match colour.get(&next).copied().unwrap_or(Colour::White) {
                    Colour::Grey => {
                        let mut cycle = vec![next];
                        for (n, _) in stack.iter().rev() {
                            cycle.push(*n);
                            if *n == next {
                                break;
                            }
                        }
                        cycles.push(cycle);
                    }
                    Colour::White => {
                        colour.insert(next, Colour::Grey);
                        stack.push((next, 0));
                    }
                    Colour::Black => {}
                }
            } else {
                colour.insert(node, Colour::Black);
                stack.pop();
            }
        }
    }
    cycles
}
