//! Ledger Engine: State
//!
//! The whole ledger as one serializable value. Every map is a BTreeMap so
//! the canonical serialization is order-stable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::acl::AccessControlTable;
use crate::airdrop::AirdropProgram;
use crate::contracts::ContractKind;
use crate::directory::ContractAddressDirectory;
use crate::domain::{Address, Amount, LedgerConstants, Timestamp};
use crate::errors::{EngineError, EngineResult};
use crate::exchange::ReputationExchange;
use crate::forum::Forum;
use crate::hashing::contract_address;
use crate::kernel::Kernel;
use crate::registry::Registry;
use crate::token::{NativeLedger, TokenLedger};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerState {
    pub constants: LedgerConstants,
    /// Timestamp of the last applied transaction.
    pub now: Timestamp,
    pub native: NativeLedger,
    /// Creations per deployer, used for address derivation.
    pub nonces: BTreeMap<Address, u64>,
    pub libraries: BTreeMap<String, Address>,
    pub links: BTreeMap<ContractKind, BTreeSet<String>>,
    pub contracts: BTreeMap<Address, ContractKind>,
    pub tokens: BTreeMap<Address, TokenLedger>,
    pub kernel: Option<Kernel>,
    pub acl: Option<AccessControlTable>,
    pub directory: Option<ContractAddressDirectory>,
    pub registries: BTreeMap<Address, Registry>,
    pub forums: BTreeMap<Address, Forum>,
    pub exchanges: BTreeMap<Address, ReputationExchange>,
    pub airdrops: BTreeMap<Address, AirdropProgram>,
}

impl LedgerState {
    /// Derives the next creation address for `deployer` and bumps its nonce.
    pub fn next_address(&mut self, deployer: &Address) -> EngineResult<Address> {
        let nonce = self.nonces.entry(*deployer).or_insert(0);
        let address = contract_address(deployer, *nonce);
        *nonce = nonce.checked_add(1).ok_or(EngineError::Overflow)?;
        if self.contracts.contains_key(&address) || self.libraries.values().any(|a| *a == address) {
            return Err(EngineError::InvariantViolation(format!("address {address} reused")));
        }
        Ok(address)
    }

    pub fn kernel(&self) -> EngineResult<&Kernel> {
        self.kernel.as_ref().ok_or(EngineError::NotDeployed(ContractKind::Kernel))
    }

    pub fn acl(&self) -> EngineResult<&AccessControlTable> {
        self.acl.as_ref().ok_or(EngineError::NotDeployed(ContractKind::AclHandler))
    }

    pub fn directory(&self) -> EngineResult<&ContractAddressDirectory> {
        self.directory
            .as_ref()
            .ok_or(EngineError::NotDeployed(ContractKind::ContractAddressHandler))
    }

    /// `address` must be the deployed kernel.
    pub fn expect_kernel(&self, address: &Address) -> EngineResult<&Kernel> {
        match &self.kernel {
            Some(k) if k.address == *address => Ok(k),
            _ => Err(EngineError::UnknownContract {
                address: *address,
                expected: ContractKind::Kernel,
            }),
        }
    }

    /// `address` must be a deployed token.
    pub fn expect_token(&self, address: &Address) -> EngineResult<&TokenLedger> {
        self.tokens.get(address).ok_or(EngineError::UnknownContract {
            address: *address,
            expected: ContractKind::UtilityToken,
        })
    }

    pub fn registry(&self, address: &Address) -> EngineResult<&Registry> {
        self.registries.get(address).ok_or(EngineError::UnknownContract {
            address: *address,
            expected: ContractKind::Registry,
        })
    }

    pub fn forum(&self, address: &Address) -> EngineResult<&Forum> {
        self.forums.get(address).ok_or(EngineError::UnknownContract {
            address: *address,
            expected: ContractKind::Forum,
        })
    }

    pub fn exchange(&self, address: &Address) -> EngineResult<&ReputationExchange> {
        self.exchanges.get(address).ok_or(EngineError::UnknownContract {
            address: *address,
            expected: ContractKind::ReputationExchange,
        })
    }

    /// Zero for unknown tokens or accounts.
    pub fn token_balance(&self, token: &Address, account: &Address) -> Amount {
        self.tokens.get(token).map_or(0, |t| t.balance_of(account))
    }

    pub fn native_balance(&self, account: &Address) -> Amount {
        self.native.balance_of(account)
    }
}
