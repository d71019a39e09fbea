//! Contract deployment and library linking.
//!
//! A contract kind can only be deployed once every library it requires
//! has been linked into that kind. Kernel, ACL handler and contract
//! address handler are singletons per ledger.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::acl::AccessControlTable;
use crate::airdrop::AirdropProgram;
use crate::directory::ContractAddressDirectory;
use crate::domain::{Address, Amount};
use crate::errors::{EngineError, EngineResult};
use crate::exchange::ReputationExchange;
use crate::forum::Forum;
use crate::kernel::Kernel;
use crate::registry::Registry;
use crate::state::LedgerState;
use crate::token::TokenLedger;

pub const SAFE_MATH: &str = "SafeMath";
pub const DLL_BYTES32: &str = "DLLBytes32";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    UtilityToken,
    Kernel,
    AclHandler,
    ContractAddressHandler,
    Registry,
    Forum,
    ReputationExchange,
    AirdropProgram,
}

impl ContractKind {
    pub fn required_libraries(&self) -> &'static [&'static str] {
        match self {
            ContractKind::UtilityToken => &[SAFE_MATH],
            ContractKind::Registry | ContractKind::Forum => &[SAFE_MATH, DLL_BYTES32],
            _ => &[],
        }
    }
}

/// Constructor arguments per contract kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractSpec {
    UtilityToken {
        supply: Amount,
        name: String,
        decimals: u8,
        symbol: String,
    },
    Kernel,
    AclHandler {
        kernel: Address,
    },
    ContractAddressHandler {
        kernel: Address,
    },
    Registry {
        token: Address,
    },
    Forum {
        token: Address,
    },
    ReputationExchange {
        kernel: Address,
        token: Address,
    },
    AirdropProgram {
        token: Address,
        amount_per_claim: Amount,
        #[serde(default)]
        allowlist: Option<Vec<Address>>,
    },
}

impl ContractSpec {
    pub fn kind(&self) -> ContractKind {
        match self {
            ContractSpec::UtilityToken { .. } => ContractKind::UtilityToken,
            ContractSpec::Kernel => ContractKind::Kernel,
            ContractSpec::AclHandler { .. } => ContractKind::AclHandler,
            ContractSpec::ContractAddressHandler { .. } => ContractKind::ContractAddressHandler,
            ContractSpec::Registry { .. } => ContractKind::Registry,
            ContractSpec::Forum { .. } => ContractKind::Forum,
            ContractSpec::ReputationExchange { .. } => ContractKind::ReputationExchange,
            ContractSpec::AirdropProgram { .. } => ContractKind::AirdropProgram,
        }
    }
}

pub fn deploy_library(state: &mut LedgerState, deployer: &Address, name: &str) -> EngineResult<Address> {
    if name.is_empty() {
        return Err(EngineError::InvalidRange("library name is empty".to_string()));
    }
    if state.libraries.contains_key(name) {
        return Err(EngineError::InvalidRange(format!("library {name} already deployed")));
    }
    let address = state.next_address(deployer)?;
    state.libraries.insert(name.to_string(), address);
    Ok(address)
}

pub fn link_library(state: &mut LedgerState, library: &str, targets: &[ContractKind]) -> EngineResult<()> {
    if !state.libraries.contains_key(library) {
        return Err(EngineError::NotFound(format!("library {library}")));
    }
    for target in targets {
        state
            .links
            .entry(*target)
            .or_insert_with(BTreeSet::new)
            .insert(library.to_string());
    }
    Ok(())
}

pub fn deploy_contract(state: &mut LedgerState, deployer: &Address, spec: &ContractSpec) -> EngineResult<Address> {
    let kind = spec.kind();
    for library in kind.required_libraries() {
        let linked = state.links.get(&kind).is_some_and(|l| l.contains(*library));
        if !linked {
            return Err(EngineError::UnlinkedLibrary {
                kind,
                library: library.to_string(),
            });
        }
    }

    // Validate constructor arguments before the nonce is consumed.
    match spec {
        ContractSpec::Kernel if state.kernel.is_some() => return Err(EngineError::AlreadyDeployed(kind)),
        ContractSpec::AclHandler { kernel } => {
            if state.acl.is_some() {
                return Err(EngineError::AlreadyDeployed(kind));
            }
            state.expect_kernel(kernel)?;
        }
        ContractSpec::ContractAddressHandler { kernel } => {
            if state.directory.is_some() {
                return Err(EngineError::AlreadyDeployed(kind));
            }
            state.expect_kernel(kernel)?;
        }
        ContractSpec::Registry { token } | ContractSpec::Forum { token } => {
            state.expect_token(token)?;
        }
        ContractSpec::ReputationExchange { kernel, token } => {
            state.expect_kernel(kernel)?;
            state.expect_token(token)?;
        }
        ContractSpec::AirdropProgram {
            token,
            amount_per_claim,
            ..
        } => {
            state.expect_token(token)?;
            if *amount_per_claim == 0 {
                return Err(EngineError::InvalidAmount("claim amount must be positive".to_string()));
            }
        }
        _ => {}
    }

    let address = state.next_address(deployer)?;
    match spec {
        ContractSpec::UtilityToken {
            supply,
            name,
            decimals,
            symbol,
        } => {
            state.tokens.insert(
                address,
                TokenLedger::issue(address, *deployer, *supply, name, *decimals, symbol),
            );
        }
        ContractSpec::Kernel => state.kernel = Some(Kernel::new(address, *deployer)),
        ContractSpec::AclHandler { kernel } => {
            state.acl = Some(AccessControlTable::new(address, *kernel));
        }
        ContractSpec::ContractAddressHandler { kernel } => {
            state.directory = Some(ContractAddressDirectory::new(address, *kernel));
        }
        ContractSpec::Registry { token } => {
            let registry = Registry::new(address, *token, &state.constants);
            state.registries.insert(address, registry);
        }
        ContractSpec::Forum { token } => {
            let forum = Forum::new(address, *deployer, *token, &state.constants);
            state.forums.insert(address, forum);
        }
        ContractSpec::ReputationExchange { kernel, token } => {
            state
                .exchanges
                .insert(address, ReputationExchange::new(address, *kernel, *token));
        }
        ContractSpec::AirdropProgram {
            token,
            amount_per_claim,
            allowlist,
        } => {
            let program = AirdropProgram::new(address, *token, *amount_per_claim, allowlist.clone());
            state.airdrops.insert(address, program);
        }
    }
    state.contracts.insert(address, kind);
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::account_address;

    fn vtx_spec() -> ContractSpec {
        ContractSpec::UtilityToken {
            supply: 10_000,
            name: "VetX".to_string(),
            decimals: 18,
            symbol: "VTX".to_string(),
        }
    }

    #[test]
    fn unlinked_library_blocks_deploy() {
        let mut state = LedgerState::default();
        let root = account_address("root");
        assert_eq!(
            deploy_contract(&mut state, &root, &vtx_spec()),
            Err(EngineError::UnlinkedLibrary {
                kind: ContractKind::UtilityToken,
                library: SAFE_MATH.to_string()
            })
        );
        deploy_library(&mut state, &root, SAFE_MATH).unwrap();
        link_library(&mut state, SAFE_MATH, &[ContractKind::UtilityToken]).unwrap();
        let token = deploy_contract(&mut state, &root, &vtx_spec()).unwrap();
        assert_eq!(state.tokens[&token].balance_of(&root), 10_000);
        assert_eq!(state.contracts[&token], ContractKind::UtilityToken);
    }

    #[test]
    fn link_requires_deployed_library() {
        let mut state = LedgerState::default();
        assert!(matches!(
            link_library(&mut state, DLL_BYTES32, &[ContractKind::Forum]),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn kernel_is_a_singleton_and_handlers_bind_to_it() {
        let mut state = LedgerState::default();
        let root = account_address("root");
        let kernel = deploy_contract(&mut state, &root, &ContractSpec::Kernel).unwrap();
        assert_eq!(
            deploy_contract(&mut state, &root, &ContractSpec::Kernel),
            Err(EngineError::AlreadyDeployed(ContractKind::Kernel))
        );
        let bogus = Address([0xee; 20]);
        assert!(matches!(
            deploy_contract(&mut state, &root, &ContractSpec::AclHandler { kernel: bogus }),
            Err(EngineError::UnknownContract { .. })
        ));
        deploy_contract(&mut state, &root, &ContractSpec::AclHandler { kernel }).unwrap();
        assert_eq!(state.kernel.as_ref().map(|k| k.root), Some(root));
    }

    #[test]
    fn addresses_are_unique_per_nonce() {
        let mut state = LedgerState::default();
        let root = account_address("root");
        let a = deploy_library(&mut state, &root, SAFE_MATH).unwrap();
        let b = deploy_library(&mut state, &root, DLL_BYTES32).unwrap();
        assert_ne!(a, b);
        assert_eq!(state.nonces[&root], 2);
    }
}
