//! Shared fixture: a fully deployed system with funded accounts.

#![allow(dead_code)]

use tcr_engine::domain::{LedgerConstants, NativeAllocation};
use tcr_engine::hashing::account_address;
use tcr_engine::{deploy_system, Address, Amount, Call, Deployment, DeploymentParams, EngineResult, Hash32, LedgerEngine, Receipt};

pub const NATIVE_PER_ACCOUNT: Amount = 1_000_000;

pub struct Harness {
    pub engine: LedgerEngine,
    pub d: Deployment,
}

pub fn account(label: &str) -> Address {
    account_address(label)
}

pub fn hash(n: u64) -> Hash32 {
    Hash32::from_low_u64(n)
}

pub fn boot(constants: LedgerConstants) -> Harness {
    let root = account("root");
    let mut engine = LedgerEngine::new();
    let allocations = ["root", "poster", "investor"]
        .iter()
        .map(|label| NativeAllocation {
            account: account(label),
            amount: NATIVE_PER_ACCOUNT,
        })
        .collect();
    engine
        .submit(root, 0, Call::Genesis { constants, allocations })
        .unwrap();
    let d = deploy_system(&mut engine, root, &DeploymentParams::default()).unwrap();
    Harness { engine, d }
}

impl Harness {
    pub fn root(&self) -> Address {
        self.d.root
    }

    pub fn call(&mut self, sender: Address, call: Call) -> EngineResult<Receipt> {
        self.engine.submit(sender, 0, call)
    }

    /// Sends utility tokens from root.
    pub fn fund(&mut self, to: Address, amount: Amount) {
        let token = self.d.token;
        self.call(self.root(), Call::Transfer { token, to, amount }).unwrap();
    }

    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) {
        let token = self.d.token;
        self.call(owner, Call::Approve { token, spender, amount }).unwrap();
    }

    pub fn balance(&self, account: &Address) -> Amount {
        self.engine.state().token_balance(&self.d.token, account)
    }

    pub fn advance(&mut self, seconds: u64) {
        self.engine.advance_time(seconds).unwrap();
    }
}
