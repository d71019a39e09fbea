//! Wiring and invariant audit of a ledger state, for operators.

use serde::Serialize;

use tcr_engine::graph::{detect_dependency_cycles, unconnected_modules, unresolved_dependencies};
use tcr_engine::invariants::validate_invariants;
use tcr_engine::{Address, CapabilityId, LedgerState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDependency {
    pub module: Address,
    pub dependency: CapabilityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Both handlers are registered with the kernel.
    pub kernel_configured: bool,
    pub missing_dependencies: Vec<MissingDependency>,
    /// Registered in the directory but never connected.
    pub unconnected: Vec<(CapabilityId, Address)>,
    pub dependency_cycles: Vec<Vec<Address>>,
    /// First failing invariant, if any.
    pub invariant_violation: Option<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.kernel_configured
            && self.missing_dependencies.is_empty()
            && self.unconnected.is_empty()
            && self.dependency_cycles.is_empty()
            && self.invariant_violation.is_none()
    }
}

pub fn audit_state(state: &LedgerState) -> AuditReport {
    let kernel_configured = match (&state.kernel, &state.directory) {
        (Some(kernel), Some(dir)) => kernel.is_configured(dir),
        _ => false,
    };
    AuditReport {
        kernel_configured,
        missing_dependencies: unresolved_dependencies(state)
            .into_iter()
            .map(|u| MissingDependency {
                module: u.module,
                dependency: u.dependency,
            })
            .collect(),
        unconnected: unconnected_modules(state),
        dependency_cycles: detect_dependency_cycles(state),
        invariant_violation: validate_invariants(state).err().map(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcr_engine::domain::LedgerConstants;
    use tcr_engine::hashing::account_address;
    use tcr_engine::identifiers::derive_identifier;
    use tcr_engine::{deploy_system, Call, DeploymentParams, LedgerEngine};

    fn deployed() -> (LedgerEngine, Address) {
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
        deploy_system(&mut engine, root, &DeploymentParams::default()).unwrap();
        (engine, root)
    }

    #[test]
    fn fresh_ledger_is_not_configured() {
        let report = audit_state(&LedgerState::default());
        assert!(!report.kernel_configured);
        assert!(!report.is_clean());
    }

    #[test]
    fn standard_deployment_is_clean() {
        let (engine, _) = deployed();
        assert!(audit_state(engine.state()).is_clean());
    }

    #[test]
    fn connecting_to_an_unknown_capability_is_reported() {
        let (mut engine, root) = deployed();
        let forum = *engine.state().forums.keys().next().unwrap();
        let oracle = derive_identifier("Oracle");
        engine
            .submit(root, 0, Call::Connect { module: forum, dependencies: vec![oracle] })
            .unwrap();
        let report = audit_state(engine.state());
        assert_eq!(
            report.missing_dependencies,
            vec![MissingDependency { module: forum, dependency: oracle }]
        );
        assert!(report.invariant_violation.is_none());
    }
}
