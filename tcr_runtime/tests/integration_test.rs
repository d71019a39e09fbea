//! Integration tests for tcr_runtime.
//!
//! All tests use temporary directories for isolation.

use std::fs;
use std::path::Path;

use tcr_engine::domain::{Hash32, LedgerConstants, NativeAllocation};
use tcr_engine::hashing::account_address;
use tcr_engine::multihash::Multihash;
use tcr_engine::forum::NewPost;
use tcr_engine::{deploy_system, Call, Deployment, DeploymentParams, EngineError, LedgerEngine};

use tcr_runtime::drift::{compare_states, verify_determinism};
use tcr_runtime::replay;
use tcr_runtime::session::{Session, SharedSession, LOG_FILE};
use tcr_runtime::snapshot;
use tcr_runtime::{RuntimeConfig, RuntimeError, TxLog};

fn genesis() -> Call {
    Call::Genesis {
        constants: LedgerConstants {
            vote_duration: 100,
            ..LedgerConstants::default()
        },
        allocations: vec![NativeAllocation {
            account: account_address("root"),
            amount: 1_000,
        }],
    }
}

/// Genesis, deployment, one resolved poll and one rewarded post.
fn run_scenario(session: &mut Session) -> Deployment {
    let root = account_address("root");
    let voter = account_address("voter");
    let poster = account_address("poster");
    let hash = Hash32::from_low_u64;

    session.submit(root, 0, genesis()).unwrap();
    let d = deploy_system(session, root, &DeploymentParams::default()).unwrap();
    let (token, registry, forum) = (d.token, d.registry, d.forum);

    session.submit(root, 0, Call::Transfer { token, to: voter, amount: 400 }).unwrap();
    session.submit(voter, 0, Call::Approve { token, spender: registry, amount: 300 }).unwrap();
    session.submit(root, 0, Call::AddProject { registry, hash: hash(1) }).unwrap();
    session.submit(root, 0, Call::StartPoll { registry, hash: hash(1) }).unwrap();
    session
        .submit(
            voter,
            0,
            Call::Vote { registry, voter, hash: hash(1), support: true, stake: 300 },
        )
        .unwrap();
    session.advance_time(100).unwrap();
    session.submit(root, 0, Call::Whitelist { registry, hash: hash(1) }).unwrap();
    session.submit(voter, 0, Call::WithdrawStake { registry, hash: hash(1) }).unwrap();

    session.submit(root, 0, Call::AddBoard { forum, board: hash(0xb0), token }).unwrap();
    session
        .submit(
            poster,
            0,
            Call::Post {
                forum,
                post: NewPost {
                    board: hash(0xb0),
                    parent: Hash32::ZERO,
                    hash: hash(2),
                    content: Multihash::sha2_256(hash(3)),
                    post_type: None,
                },
            },
        )
        .unwrap();
    session.submit(voter, 0, Call::Approve { token, spender: forum, amount: 100 }).unwrap();
    session
        .submit(voter, 0, Call::Upvote { forum, payer: voter, hash: hash(2), amount: 100 })
        .unwrap();
    session.submit(poster, 0, Call::WithdrawReward { forum, hash: hash(2) }).unwrap();
    d
}

fn log_path(base: &Path, session: &str) -> std::path::PathBuf {
    base.join(session).join(LOG_FILE)
}

#[test]
fn persisted_log_replays_to_the_live_hash() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::open(dir.path(), "main", 5).unwrap();
    let d = run_scenario(&mut session);
    let live = session.current_hash().unwrap();

    let state = session.state();
    assert_eq!(state.token_balance(&d.token, &account_address("voter")), 300);
    assert_eq!(state.token_balance(&d.token, &account_address("poster")), 100);

    let txs = TxLog::open(&log_path(dir.path(), "main")).unwrap().load_all().unwrap();
    assert_eq!(txs.len() as u64, session.current_sequence());
    assert_eq!(replay::rebuild_hash(&txs).unwrap(), live);
    assert_eq!(verify_determinism(&txs).unwrap(), live);

    drop(session);
    let reopened = Session::open(dir.path(), "main", 5).unwrap();
    assert_eq!(reopened.current_hash().unwrap(), live);
    assert_eq!(reopened.verify_latest_snapshot().unwrap(), Some(true));
}

#[test]
fn sessions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut a = Session::open(dir.path(), "a", 0).unwrap();
    let mut b = Session::open(dir.path(), "b", 0).unwrap();
    run_scenario(&mut a);
    b.submit(account_address("root"), 0, genesis()).unwrap();

    assert_eq!(b.current_sequence(), 1);
    assert_ne!(a.current_hash().unwrap(), b.current_hash().unwrap());

    let report = compare_states(b.state(), a.state()).unwrap();
    assert!(!report.is_empty());
    assert!(report.registries.iter().all(|r| r.whitelisted == (0, 1)));
    assert_eq!(report.contract_count_a, 0);
}

#[test]
fn schema_version_is_rejected_and_not_logged() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::open(dir.path(), "s", 0).unwrap();
    session.submit(account_address("root"), 0, genesis()).unwrap();

    let mut bad = session.engine().next_transaction(
        account_address("root"),
        0,
        Call::DeployLibrary { name: "SafeMath".to_string() },
    );
    bad.schema_version = 99;
    assert!(matches!(
        session.apply_transaction(&bad),
        Err(RuntimeError::Engine(EngineError::SchemaMismatch { expected: 1, got: 99 }))
    ));
    assert_eq!(session.transactions().unwrap().len(), 1);
}

#[test]
fn corrupted_log_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut session = Session::open(dir.path(), "s", 0).unwrap();
        run_scenario(&mut session);
    }
    let path = log_path(dir.path(), "s");
    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..data.len() - 10]).unwrap();

    assert!(matches!(Session::open(dir.path(), "s", 0), Err(RuntimeError::Frame(_))));
}

#[test]
fn tampered_snapshot_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::open(dir.path(), "s", 4).unwrap();
    run_scenario(&mut session);

    let snap_dir = session.snapshot_dir();
    let mut latest = snapshot::load_latest_snapshot(&snap_dir).unwrap().unwrap();
    let other = LedgerEngine::replay(&session.transactions().unwrap()[..1]).unwrap();
    latest.canonical_json = snapshot::encode_state(other.state()).unwrap();
    latest.hash = snapshot::json_hash(&latest.canonical_json);
    fs::write(
        snap_dir.join(format!("snapshot_{:06}.json", latest.sequence)),
        serde_json::to_string(&latest).unwrap(),
    )
    .unwrap();

    assert_eq!(session.verify_latest_snapshot().unwrap(), Some(false));
}

#[test]
fn deployment_runs_through_a_shared_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::from_toml_str(
        r#"
        session = "shared"
        snapshot_interval = 0
        root = "operator"

        [deployment]
        supply_tokens = 10
        token_decimals = 0
        "#,
    )
    .unwrap();

    let shared = SharedSession::new(
        Session::open(dir.path(), &config.session, config.snapshot_interval).unwrap(),
    );
    let root = config.root_address();
    shared.submit(root, 0, config.genesis_call()).unwrap();
    let mut sink = &shared;
    let d = deploy_system(&mut sink, root, &config.deployment_params().unwrap()).unwrap();

    let session = shared.into_inner().unwrap();
    assert_eq!(d.root, root);
    assert_eq!(session.state().token_balance(&d.token, &root), 10);
    assert_eq!(session.state().kernel.as_ref().map(|k| k.root), Some(root));
    assert!(snapshot::load_latest_snapshot(&session.snapshot_dir()).unwrap().is_none());
}
