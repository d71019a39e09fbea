//! Kernel: root authority over the directory and the access table.
//!
//! Directory and ACL mutations take a [`RootAuthority`], which only
//! [`Kernel::authority`] can mint, and only for the kernel's root.

use serde::{Deserialize, Serialize};

use crate::acl::AccessControlTable;
use crate::directory::ContractAddressDirectory;
use crate::domain::{Address, CapabilityId, Selector};
use crate::errors::{EngineError, EngineResult};
use crate::identifiers::{acl_handler_id, contract_address_handler_id};

/// Proof that the current sender is the kernel root. Not serializable
/// and not constructible outside this module.
#[derive(Debug)]
pub struct RootAuthority {
    _private: (),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Kernel {
    pub address: Address,
    /// Deployer of the kernel.
    pub root: Address,
}

impl Kernel {
    pub fn new(address: Address, root: Address) -> Self {
        Self { address, root }
    }

    pub fn authority(&self, sender: &Address) -> EngineResult<RootAuthority> {
        if *sender != self.root {
            return Err(EngineError::NotAuthorized(format!(
                "{sender} is not the kernel root"
            )));
        }
        Ok(RootAuthority { _private: () })
    }

    /// Records a handler address in the directory.
    pub fn register_handler(
        &self,
        auth: &RootAuthority,
        directory: &mut ContractAddressDirectory,
        id: CapabilityId,
        handler: Address,
    ) -> Option<Address> {
        directory.register(auth, id, handler)
    }

    pub fn connect(
        &self,
        auth: &RootAuthority,
        acl: &mut AccessControlTable,
        module: Address,
        dependencies: Vec<CapabilityId>,
    ) {
        acl.connect(auth, module, dependencies);
    }

    /// Both handlers are registered.
    pub fn is_configured(&self, directory: &ContractAddressDirectory) -> bool {
        directory.contains(&acl_handler_id()) && directory.contains(&contract_address_handler_id())
    }

    /// Whether `caller` may invoke `selector` on the module registered as
    /// `callee`. Any identifier the directory binds to the caller may hold
    /// the permit.
    pub fn authorize(
        &self,
        directory: &ContractAddressDirectory,
        acl: &AccessControlTable,
        caller: &Address,
        callee: &CapabilityId,
        selector: &Selector,
    ) -> EngineResult<()> {
        let caller_ids = directory.identifiers_of(caller);
        if caller_ids.is_empty() {
            return Err(EngineError::NotAuthorized(format!(
                "{caller} has no capability identifier"
            )));
        }
        if !caller_ids
            .iter()
            .any(|id| acl.check_permission(id, callee, selector))
        {
            return Err(EngineError::NotAuthorized(format!(
                "{caller} may not call {selector} on {callee}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::hashing::account_address;
    use crate::identifiers::{
        derive_identifier, reputation_exchange_id, root_id, selector, BATCH_EXCHANGE_SIGNATURE,
    };

    #[test]
    fn only_root_gets_authority() {
        let root = account_address("root");
        let kernel = Kernel::new(Address([1; 20]), root);
        assert!(kernel.authority(&root).is_ok());
        assert!(matches!(
            kernel.authority(&account_address("mallory")),
            Err(EngineError::NotAuthorized(_))
        ));
    }

    #[test]
    fn configured_after_both_handlers() {
        let root = account_address("root");
        let kernel = Kernel::new(Address([1; 20]), root);
        let auth = kernel.authority(&root).unwrap();
        let mut dir = ContractAddressDirectory::new(Address([2; 20]), kernel.address);
        kernel.register_handler(&auth, &mut dir, acl_handler_id(), Address([3; 20]));
        assert!(!kernel.is_configured(&dir));
        let handler = dir.address;
        kernel.register_handler(&auth, &mut dir, contract_address_handler_id(), handler);
        assert!(kernel.is_configured(&dir));
    }

    #[test]
    fn authorize_resolves_caller_through_directory() {
        let root = account_address("root");
        let kernel = Kernel::new(Address([1; 20]), root);
        let auth = kernel.authority(&root).unwrap();
        let mut dir = ContractAddressDirectory::new(Address([2; 20]), kernel.address);
        let mut acl = AccessControlTable::new(Address([3; 20]), kernel.address);
        let sel = selector(BATCH_EXCHANGE_SIGNATURE);

        // unknown caller
        assert!(kernel
            .authorize(&dir, &acl, &root, &reputation_exchange_id(), &sel)
            .is_err());

        dir.register(&auth, root_id(), root);
        assert!(kernel
            .authorize(&dir, &acl, &root, &reputation_exchange_id(), &sel)
            .is_err());

        acl.permit(&auth, root_id(), reputation_exchange_id(), BTreeSet::from([sel]));
        assert_eq!(
            kernel.authorize(&dir, &acl, &root, &reputation_exchange_id(), &sel),
            Ok(())
        );
    }

    #[test]
    fn authorize_accepts_any_alias_of_the_caller() {
        let root = account_address("root");
        let kernel = Kernel::new(Address([1; 20]), root);
        let auth = kernel.authority(&root).unwrap();
        let mut dir = ContractAddressDirectory::new(Address([2; 20]), kernel.address);
        let mut acl = AccessControlTable::new(Address([3; 20]), kernel.address);
        let sel = selector(BATCH_EXCHANGE_SIGNATURE);

        dir.register(&auth, root_id(), root);
        acl.permit(&auth, root_id(), reputation_exchange_id(), BTreeSet::from([sel]));

        // an alias sorting ahead of the permitted identifier
        let alias = (0..)
            .map(|i| derive_identifier(&format!("Alias{i}")))
            .find(|id| *id < root_id())
            .unwrap();
        dir.register(&auth, alias, root);
        assert_eq!(dir.identifiers_of(&root)[0], alias);
        assert_eq!(
            kernel.authorize(&dir, &acl, &root, &reputation_exchange_id(), &sel),
            Ok(())
        );
    }
}
