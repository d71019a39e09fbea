//! Replay determinism: the same transactions always produce the same
//! canonical hash, and rejected transactions leave no trace.

mod common;

use common::{account, hash};
use tcr_engine::domain::{LedgerConstants, NativeAllocation};
use tcr_engine::hashing::canonical_serialize;
use tcr_engine::{
    deploy_system, Address, Amount, Call, DeploymentParams, EngineError, LedgerEngine, Receipt,
    Transaction, TxSink, ENGINE_VERSION,
};

/// Engine plus the log of every accepted transaction.
struct Recorder {
    engine: LedgerEngine,
    log: Vec<Transaction>,
}

impl TxSink for Recorder {
    type Error = EngineError;

    fn submit(&mut self, sender: Address, value: Amount, call: Call) -> Result<Receipt, EngineError> {
        let tx = self.engine.next_transaction(sender, value, call);
        let receipt = self.engine.apply_transaction(&tx)?;
        self.log.push(tx);
        Ok(receipt)
    }
}

impl Recorder {
    fn call(&mut self, sender: &str, call: Call) {
        self.submit(account(sender), 0, call).unwrap();
    }
}

fn scenario() -> Recorder {
    let mut r = Recorder {
        engine: LedgerEngine::new(),
        log: Vec::new(),
    };
    r.call(
        "root",
        Call::Genesis {
            constants: LedgerConstants {
                vote_duration: 50,
                ..LedgerConstants::default()
            },
            allocations: vec![NativeAllocation {
                account: account("root"),
                amount: 10,
            }],
        },
    );
    let d = deploy_system(&mut r, account("root"), &DeploymentParams::default()).unwrap();
    let (registry, token) = (d.registry, d.token);
    r.call("root", Call::Transfer { token, to: account("voter"), amount: 500 });
    r.call("voter", Call::Approve { token, spender: registry, amount: 500 });
    r.call("root", Call::AddProject { registry, hash: hash(1) });
    r.call("root", Call::StartPoll { registry, hash: hash(1) });
    r.call(
        "voter",
        Call::Vote {
            registry,
            voter: account("voter"),
            hash: hash(1),
            support: true,
            stake: 500,
        },
    );
    r.engine.advance_time(50).unwrap();
    r.call("root", Call::Whitelist { registry, hash: hash(1) });
    r.call("voter", Call::WithdrawStake { registry, hash: hash(1) });
    r
}

#[test]
fn replay_reproduces_the_hash() {
    let live = scenario();
    let replayed = LedgerEngine::replay(&live.log).unwrap();
    assert_eq!(replayed.canonical_hash().unwrap(), live.engine.canonical_hash().unwrap());
    assert_eq!(replayed.last_sequence(), live.log.len() as u64);
}

#[test]
fn two_runs_agree() {
    let a = scenario();
    let b = scenario();
    assert_eq!(a.log, b.log);
    assert_eq!(a.engine.canonical_hash().unwrap(), b.engine.canonical_hash().unwrap());
}

#[test]
fn rejected_transactions_do_not_change_the_hash() {
    let mut r = scenario();
    let before = r.engine.canonical_hash().unwrap();
    let registry = r.engine.state().registries.keys().next().copied().unwrap();
    // already resolved
    assert_eq!(
        r.submit(account("root"), 0, Call::Whitelist { registry, hash: hash(1) }),
        Err(EngineError::NotInVoting(hash(1)))
    );
    assert_eq!(r.engine.canonical_hash().unwrap(), before);
}

#[test]
fn canonical_form_leads_with_engine_version() {
    let r = scenario();
    let bytes = canonical_serialize(r.engine.state()).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with(&format!("{{\"engine_version\":{ENGINE_VERSION},")));
}

#[test]
fn replaying_a_truncated_head_fails() {
    let r = scenario();
    assert_eq!(
        LedgerEngine::replay(&r.log[1..]).unwrap_err(),
        EngineError::SequenceViolation { expected: 1, got: 2 }
    );
}

#[test]
fn log_survives_json() {
    let r = scenario();
    let json = serde_json::to_string(&r.log).unwrap();
    let back: Vec<Transaction> = serde_json::from_str(&json).unwrap();
    let replayed = LedgerEngine::replay(&back).unwrap();
    assert_eq!(replayed.canonical_hash().unwrap(), r.engine.canonical_hash().unwrap());
}
