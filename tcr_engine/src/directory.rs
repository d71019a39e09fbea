//! Contract Address Directory: capability identifier -> current address.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Address, CapabilityId};
use crate::errors::{EngineError, EngineResult};
use crate::kernel::RootAuthority;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractAddressDirectory {
    pub address: Address,
    pub kernel: Address,
    pub entries: BTreeMap<CapabilityId, Address>,
}

impl ContractAddressDirectory {
    pub fn new(address: Address, kernel: Address) -> Self {
        Self {
            address,
            kernel,
            entries: BTreeMap::new(),
        }
    }

    /// Binds `id` to `address`, returning the overwritten address if any.
    pub fn register(
        &mut self,
        _root: &RootAuthority,
        id: CapabilityId,
        address: Address,
    ) -> Option<Address> {
        self.entries.insert(id, address)
    }

    pub fn get(&self, id: &CapabilityId) -> EngineResult<Address> {
        self.entries
            .get(id)
            .copied()
            .ok_or(EngineError::NotRegistered(*id))
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.entries.contains_key(id)
    }

    /// Every identifier bound to `address`, in identifier order.
    pub fn identifiers_of(&self, address: &Address) -> Vec<CapabilityId> {
        self.entries
            .iter()
            .filter(|(_, a)| *a == address)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::account_address;
    use crate::identifiers::{derive_identifier, reputation_exchange_id, root_id};
    use crate::kernel::Kernel;

    fn fixture() -> (ContractAddressDirectory, Kernel, Address) {
        let root = account_address("root");
        let kernel = Kernel::new(Address([9; 20]), root);
        (ContractAddressDirectory::new(Address([8; 20]), kernel.address), kernel, root)
    }

    #[test]
    fn register_then_get() {
        let (mut dir, kernel, root) = fixture();
        let auth = kernel.authority(&root).unwrap();
        let addr = Address([3; 20]);
        assert_eq!(dir.register(&auth, reputation_exchange_id(), addr), None);
        assert_eq!(dir.get(&reputation_exchange_id()), Ok(addr));
    }

    #[test]
    fn second_register_overwrites() {
        let (mut dir, kernel, root) = fixture();
        let auth = kernel.authority(&root).unwrap();
        let id = derive_identifier("Forum");
        dir.register(&auth, id, Address([1; 20]));
        let prev = dir.register(&auth, id, Address([2; 20]));
        assert_eq!(prev, Some(Address([1; 20])));
        assert_eq!(dir.get(&id), Ok(Address([2; 20])));
        assert_eq!(dir.entries.len(), 1);
    }

    #[test]
    fn unregistered_lookup_fails() {
        let (dir, _, _) = fixture();
        assert_eq!(dir.get(&root_id()), Err(EngineError::NotRegistered(root_id())));
    }

    #[test]
    fn reverse_lookup() {
        let (mut dir, kernel, root) = fixture();
        let auth = kernel.authority(&root).unwrap();
        dir.register(&auth, root_id(), root);
        assert_eq!(dir.identifiers_of(&root), vec![root_id()]);
        assert!(dir.identifiers_of(&Address([7; 20])).is_empty());
    }

    #[test]
    fn reverse_lookup_returns_every_alias() {
        let (mut dir, kernel, root) = fixture();
        let auth = kernel.authority(&root).unwrap();
        let alias = derive_identifier("Alias");
        dir.register(&auth, root_id(), root);
        dir.register(&auth, alias, root);
        let mut expected = vec![root_id(), alias];
        expected.sort();
        assert_eq!(dir.identifiers_of(&root), expected);
    }
}
