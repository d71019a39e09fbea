//! Deployment choreography.
//!
//! Brings up a complete system through ordinary transactions, so a
//! deployment is itself part of the replayable log. Any failed step
//! aborts the whole run; earlier steps stay applied in the sink.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::contracts::{ContractKind, ContractSpec, DLL_BYTES32, SAFE_MATH};
use crate::domain::{Address, Amount, CapabilityId, Receipt};
use crate::engine::LedgerEngine;
use crate::errors::EngineError;
use crate::events::Call;
use crate::identifiers::{
    acl_handler_id, contract_address_handler_id, forum_id, registry_id, reputation_exchange_id,
    root_id, selector, BATCH_EXCHANGE_SIGNATURE,
};

/// Anything that accepts transactions on behalf of a sender.
pub trait TxSink {
    type Error: From<EngineError>;

    fn submit(&mut self, sender: Address, value: Amount, call: Call) -> Result<Receipt, Self::Error>;
}

impl TxSink for LedgerEngine {
    type Error = EngineError;

    fn submit(&mut self, sender: Address, value: Amount, call: Call) -> Result<Receipt, EngineError> {
        LedgerEngine::submit(self, sender, value, call)
    }
}

/// Utility token parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentParams {
    pub token_supply: Amount,
    pub token_name: String,
    pub token_decimals: u8,
    pub token_symbol: String,
}

impl Default for DeploymentParams {
    fn default() -> Self {
        Self {
            token_supply: 1_000_000 * 10u128.pow(18),
            token_name: "VetX".to_string(),
            token_decimals: 18,
            token_symbol: "VTX".to_string(),
        }
    }
}

/// Addresses of everything [`deploy_system`] created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub root: Address,
    pub safe_math: Address,
    pub dll_bytes32: Address,
    pub token: Address,
    pub kernel: Address,
    pub acl: Address,
    pub directory: Address,
    pub registry: Address,
    pub forum: Address,
    pub exchange: Address,
}

fn created(receipt: &Receipt, what: &str) -> Result<Address, EngineError> {
    receipt
        .created
        .ok_or_else(|| EngineError::InvariantViolation(format!("deploying {what} created nothing")))
}

fn deploy<S: TxSink>(sink: &mut S, root: Address, contract: ContractSpec) -> Result<Address, S::Error> {
    let kind = contract.kind();
    let receipt = sink.submit(root, 0, Call::Deploy { contract })?;
    let address = created(&receipt, &format!("{kind:?}"))?;
    info!(?kind, %address, "contract deployed");
    Ok(address)
}

fn library<S: TxSink>(sink: &mut S, root: Address, name: &str, targets: &[ContractKind]) -> Result<Address, S::Error> {
    let receipt = sink.submit(root, 0, Call::DeployLibrary { name: name.to_string() })?;
    let address = created(&receipt, name)?;
    sink.submit(
        root,
        0,
        Call::LinkLibrary {
            library: name.to_string(),
            targets: targets.to_vec(),
        },
    )?;
    info!(library = name, %address, ?targets, "library deployed and linked");
    Ok(address)
}

fn connect<S: TxSink>(sink: &mut S, root: Address, module: Address, dependencies: Vec<CapabilityId>) -> Result<(), S::Error> {
    sink.submit(root, 0, Call::Connect { module, dependencies })?;
    Ok(())
}

fn register<S: TxSink>(sink: &mut S, root: Address, id: CapabilityId, address: Address) -> Result<(), S::Error> {
    sink.submit(root, 0, Call::RegisterContract { id, address })?;
    Ok(())
}

/// Runs the full bring-up as `root`. The sink must already hold genesis.
pub fn deploy_system<S: TxSink>(sink: &mut S, root: Address, params: &DeploymentParams) -> Result<Deployment, S::Error> {
    // 1. libraries
    let safe_math = library(
        sink,
        root,
        SAFE_MATH,
        &[ContractKind::UtilityToken, ContractKind::Registry, ContractKind::Forum],
    )?;
    let dll_bytes32 = library(sink, root, DLL_BYTES32, &[ContractKind::Forum, ContractKind::Registry])?;

    // 2. token
    let token = deploy(
        sink,
        root,
        ContractSpec::UtilityToken {
            supply: params.token_supply,
            name: params.token_name.clone(),
            decimals: params.token_decimals,
            symbol: params.token_symbol.clone(),
        },
    )?;

    // 3. kernel and handlers
    let kernel = deploy(sink, root, ContractSpec::Kernel)?;
    let acl = deploy(sink, root, ContractSpec::AclHandler { kernel })?;
    let directory = deploy(sink, root, ContractSpec::ContractAddressHandler { kernel })?;

    // 4. business modules
    let registry = deploy(sink, root, ContractSpec::Registry { token })?;
    let forum = deploy(sink, root, ContractSpec::Forum { token })?;
    let exchange = deploy(sink, root, ContractSpec::ReputationExchange { kernel, token })?;

    // 5. handlers
    sink.submit(
        root,
        0,
        Call::RegisterHandler {
            id: acl_handler_id(),
            handler: acl,
        },
    )?;
    sink.submit(
        root,
        0,
        Call::RegisterHandler {
            id: contract_address_handler_id(),
            handler: directory,
        },
    )?;
    info!(%acl, %directory, "handlers registered");

    // 6-7. connections
    connect(sink, root, acl, Vec::new())?;
    connect(sink, root, directory, Vec::new())?;
    connect(
        sink,
        root,
        exchange,
        vec![acl_handler_id(), contract_address_handler_id()],
    )?;
    connect(sink, root, registry, Vec::new())?;
    connect(sink, root, forum, Vec::new())?;
    info!("modules connected");

    // 8-9. directory
    register(sink, root, root_id(), root)?;
    register(sink, root, registry_id(), registry)?;
    register(sink, root, forum_id(), forum)?;
    register(sink, root, reputation_exchange_id(), exchange)?;
    info!("directory populated");

    // 10. permissions
    sink.submit(
        root,
        0,
        Call::Permit {
            caller: root_id(),
            callee: reputation_exchange_id(),
            selectors: vec![selector(BATCH_EXCHANGE_SIGNATURE)],
        },
    )?;
    info!(%kernel, %exchange, "deployment complete");

    Ok(Deployment {
        root,
        safe_math,
        dll_bytes32,
        token,
        kernel,
        acl,
        directory,
        registry,
        forum,
        exchange,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedgerConstants, NativeAllocation};
    use crate::graph::{unconnected_modules, unresolved_dependencies};
    use crate::hashing::account_address;

    fn booted() -> (LedgerEngine, Deployment) {
        let root = account_address("root");
        let mut engine = LedgerEngine::new();
        engine
            .submit(
                root,
                0,
                Call::Genesis {
                    constants: LedgerConstants::default(),
                    allocations: vec![NativeAllocation { account: root, amount: 100 }],
                },
            )
            .unwrap();
        let deployment = deploy_system(&mut engine, root, &DeploymentParams::default()).unwrap();
        (engine, deployment)
    }

    #[test]
    fn deploys_a_configured_system() {
        let (engine, d) = booted();
        let state = engine.state();
        let kernel = state.kernel().unwrap();
        assert_eq!(kernel.address, d.kernel);
        assert!(kernel.is_configured(state.directory().unwrap()));
        assert_eq!(state.directory().unwrap().get(&reputation_exchange_id()), Ok(d.exchange));
        assert_eq!(state.token_balance(&d.token, &d.root), DeploymentParams::default().token_supply);
        assert!(state.acl().unwrap().check_permission(
            &root_id(),
            &reputation_exchange_id(),
            &selector(BATCH_EXCHANGE_SIGNATURE)
        ));
    }

    #[test]
    fn deployed_wiring_has_no_gaps() {
        let (engine, _) = booted();
        assert!(unresolved_dependencies(engine.state()).is_empty());
        assert!(unconnected_modules(engine.state()).is_empty());
    }

    #[test]
    fn second_deployment_is_refused() {
        let (mut engine, d) = booted();
        let before = engine.last_sequence();
        let err = deploy_system(&mut engine, d.root, &DeploymentParams::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(_)));
        assert_eq!(engine.last_sequence(), before);
    }

    #[test]
    fn foreign_kernel_blocks_deployment() {
        let root = account_address("root");
        let mut engine = LedgerEngine::new();
        engine
            .submit(
                root,
                0,
                Call::Genesis {
                    constants: LedgerConstants::default(),
                    allocations: Vec::new(),
                },
            )
            .unwrap();
        // mallory owns the only kernel slot.
        let mallory = account_address("mallory");
        engine.submit(mallory, 0, Call::Deploy { contract: ContractSpec::Kernel }).unwrap();
        let err = deploy_system(&mut engine, root, &DeploymentParams::default()).unwrap_err();
        assert_eq!(err, EngineError::AlreadyDeployed(ContractKind::Kernel));
    }
}
