//! tcr-ledger: operator binary for a ledger session.
//!
//! Deploys the standard system into a session, replays and verifies its
//! transaction log, audits the wiring, lists forum content and compares
//! sessions.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcr_engine::deploy_system;
use tcr_runtime::audit::audit_state;
use tcr_runtime::content::{find_by_content, list_posts};
use tcr_runtime::drift::{compare_states, verify_determinism};
use tcr_runtime::snapshot::export_state;
use tcr_runtime::{RuntimeConfig, RuntimeError, RuntimeResult, Session};

#[derive(Parser)]
#[command(name = "tcr-ledger")]
#[command(about = "Deterministic ledger for the registry, forum and reputation exchange")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tcr-ledger.toml", env = "TCR_LEDGER_CONFIG")]
    config: PathBuf,

    /// Session directory (overrides config file)
    #[arg(long, env = "TCR_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Session name (overrides config file)
    #[arg(short, long, env = "TCR_SESSION")]
    session: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write genesis and deploy the full system into an empty session
    Deploy,
    /// Replay the transaction log and print the state hash
    Replay,
    /// Replay twice and check the latest snapshot against the log
    Verify,
    /// Report wiring gaps and invariant failures
    Audit,
    /// List forum posts with their base-58 content
    Posts {
        /// Only posts whose content is this base-58 multihash
        #[arg(long)]
        content: Option<String>,
    },
    /// Write the canonical state JSON to a file
    Export {
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Compare this session's state with another session's
    Diff {
        /// Name of the other session under the same directory
        other: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> RuntimeResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> RuntimeResult<RuntimeConfig> {
    let mut config = if cli.config.exists() {
        RuntimeConfig::load(&cli.config)?
    } else {
        info!("Config file not found, using defaults");
        RuntimeConfig::default()
    };
    if let Some(dir) = &cli.session_dir {
        config.session_dir = dir.clone();
    }
    if let Some(session) = &cli.session {
        config.session = session.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open(config: &RuntimeConfig, name: &str) -> RuntimeResult<Session> {
    Session::open(&config.session_dir, name, config.snapshot_interval)
}

fn run(cli: Cli) -> RuntimeResult<()> {
    let config = load_config(&cli)?;
    info!(
        session_dir = %config.session_dir.display(),
        session = %config.session,
        "using session"
    );

    match cli.command {
        Command::Deploy => {
            let mut session = open(&config, &config.session)?;
            if session.current_sequence() > 0 {
                return Err(RuntimeError::InvalidConfig(format!(
                    "session {} already holds {} transactions",
                    config.session,
                    session.current_sequence()
                )));
            }
            let root = config.root_address();
            session.submit(root, 0, config.genesis_call())?;
            let deployment = deploy_system(&mut session, root, &config.deployment_params()?)?;
            info!(
                sequence = session.current_sequence(),
                hash = %session.current_hash()?,
                "system deployed"
            );
            print_json(&deployment)
        }
        Command::Replay => {
            let mut session = open(&config, &config.session)?;
            let (_, hash) = session.replay_full()?;
            println!("{} {}", session.current_sequence(), hash);
            Ok(())
        }
        Command::Verify => {
            let session = open(&config, &config.session)?;
            let hash = verify_determinism(&session.transactions()?)?;
            match session.verify_latest_snapshot()? {
                Some(false) => Err(RuntimeError::Snapshot(
                    "latest snapshot does not match the log".to_string(),
                )),
                checked => {
                    info!(snapshot_checked = checked.is_some(), "log is deterministic");
                    println!("{hash}");
                    Ok(())
                }
            }
        }
        Command::Audit => {
            let session = open(&config, &config.session)?;
            let report = audit_state(session.state());
            print_json(&report)?;
            if report.is_clean() {
                Ok(())
            } else {
                Err(RuntimeError::InvalidConfig("audit found problems".to_string()))
            }
        }
        Command::Posts { content } => {
            let session = open(&config, &config.session)?;
            let posts = match content {
                Some(encoded) => find_by_content(session.state(), &encoded)?,
                None => list_posts(session.state()),
            };
            print_json(&posts)
        }
        Command::Export { out } => {
            let session = open(&config, &config.session)?;
            export_state(session.state(), &out)?;
            info!(path = %out.display(), "exported state");
            Ok(())
        }
        Command::Diff { other } => {
            let ours = open(&config, &config.session)?;
            let theirs = open(&config, &other)?;
            print_json(&compare_states(ours.state(), theirs.state())?)
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tcr_runtime=info,tcr_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "tcr-ledger failed");
            ExitCode::FAILURE
        }
    }
}
