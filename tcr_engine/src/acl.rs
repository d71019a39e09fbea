//! Access Control Table.
//!
//! A cross-module call is authorized iff the
//! `(caller id, callee id, selector)` triple has been permitted.
//! Module connections record declared dependencies only; they grant
//! nothing.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Address, CapabilityId, Selector};
use crate::kernel::RootAuthority;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessControlTable {
    pub address: Address,
    pub kernel: Address,
    /// caller -> callee -> permitted selectors
    pub permits: BTreeMap<CapabilityId, BTreeMap<CapabilityId, BTreeSet<Selector>>>,
    /// connected module -> declared dependencies
    pub modules: BTreeMap<Address, Vec<CapabilityId>>,
}

impl AccessControlTable {
    pub fn new(address: Address, kernel: Address) -> Self {
        Self {
            address,
            kernel,
            permits: BTreeMap::new(),
            modules: BTreeMap::new(),
        }
    }

    /// Replaces the permitted selector set for the pair. An empty set
    /// revokes the pair.
    pub fn permit(
        &mut self,
        _root: &RootAuthority,
        caller: CapabilityId,
        callee: CapabilityId,
        selectors: BTreeSet<Selector>,
    ) {
        let per_caller = self.permits.entry(caller).or_default();
        if selectors.is_empty() {
            per_caller.remove(&callee);
        } else {
            per_caller.insert(callee, selectors);
        }
        if per_caller.is_empty() {
            self.permits.remove(&caller);
        }
    }

    pub fn check_permission(
        &self,
        caller: &CapabilityId,
        callee: &CapabilityId,
        selector: &Selector,
    ) -> bool {
        self.permits
            .get(caller)
            .and_then(|m| m.get(callee))
            .is_some_and(|set| set.contains(selector))
    }

    /// Records (or re-records) a module's declared dependencies.
    pub fn connect(&mut self, _root: &RootAuthority, module: Address, dependencies: Vec<CapabilityId>) {
        self.modules.insert(module, dependencies);
    }

    pub fn is_connected(&self, module: &Address) -> bool {
        self.modules.contains_key(module)
    }

    pub fn dependencies_of(&self, module: &Address) -> Option<&[CapabilityId]> {
        self.modules.get(module).map(Vec::as_slice)
    }
}
