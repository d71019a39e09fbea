//! Runtime configuration, loaded from TOML.
//!
//! TOML integers are signed 64-bit, so the token supply is given in whole
//! tokens and scaled by `10^decimals` here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tcr_engine::domain::{LedgerConstants, NativeAllocation};
use tcr_engine::hashing::account_address;
use tcr_engine::{Address, Call, DeploymentParams};

use crate::errors::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Directory holding one subdirectory per session.
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,

    #[serde(default = "default_session")]
    pub session: String,

    /// Snapshot every N transactions. Zero disables snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,

    /// Account label of the deployer, who becomes kernel root.
    #[serde(default = "default_root")]
    pub root: String,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub constants: LedgerConstants,

    #[serde(default = "default_allocations")]
    pub allocations: Vec<AllocationConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Supply in whole tokens.
    #[serde(default = "default_supply_tokens")]
    pub supply_tokens: u64,
    #[serde(default = "default_token_name")]
    pub token_name: String,
    #[serde(default = "default_decimals")]
    pub token_decimals: u8,
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
}

/// Native currency granted to a labelled account at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationConfig {
    pub account: String,
    pub amount: u64,
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("ledger-data")
}
fn default_session() -> String {
    "default".to_string()
}
fn default_snapshot_interval() -> u64 {
    100
}
fn default_root() -> String {
    "root".to_string()
}
fn default_supply_tokens() -> u64 {
    1_000_000
}
fn default_token_name() -> String {
    "VetX".to_string()
}
fn default_decimals() -> u8 {
    18
}
fn default_token_symbol() -> String {
    "VTX".to_string()
}
fn default_allocations() -> Vec<AllocationConfig> {
    vec![AllocationConfig {
        account: default_root(),
        amount: 1_000_000,
    }]
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            supply_tokens: default_supply_tokens(),
            token_name: default_token_name(),
            token_decimals: default_decimals(),
            token_symbol: default_token_symbol(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
            session: default_session(),
            snapshot_interval: default_snapshot_interval(),
            root: default_root(),
            deployment: DeploymentConfig::default(),
            constants: LedgerConstants::default(),
            allocations: default_allocations(),
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> RuntimeResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.session.is_empty() || self.session.contains(['/', '\\']) {
            return Err(RuntimeError::InvalidConfig(format!(
                "session name {:?} must be a single path component",
                self.session
            )));
        }
        if self.root.is_empty() {
            return Err(RuntimeError::InvalidConfig("root label is empty".to_string()));
        }
        if self.constants.forum_fee_percentage > 100 {
            return Err(RuntimeError::InvalidConfig(format!(
                "forum_fee_percentage {} exceeds 100",
                self.constants.forum_fee_percentage
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for alloc in &self.allocations {
            if !seen.insert(alloc.account.as_str()) {
                return Err(RuntimeError::InvalidConfig(format!(
                    "account {} is allocated twice",
                    alloc.account
                )));
            }
        }
        self.deployment_params().map(|_| ())
    }

    pub fn root_address(&self) -> Address {
        account_address(&self.root)
    }

    pub fn deployment_params(&self) -> RuntimeResult<DeploymentParams> {
        let d = &self.deployment;
        let supply = 10u128
            .checked_pow(u32::from(d.token_decimals))
            .and_then(|unit| unit.checked_mul(u128::from(d.supply_tokens)))
            .ok_or_else(|| {
                RuntimeError::InvalidConfig(format!(
                    "{} tokens at {} decimals overflow",
                    d.supply_tokens, d.token_decimals
                ))
            })?;
        Ok(DeploymentParams {
            token_supply: supply,
            token_name: d.token_name.clone(),
            token_decimals: d.token_decimals,
            token_symbol: d.token_symbol.clone(),
        })
    }

    /// The genesis transaction's call.
    pub fn genesis_call(&self) -> Call {
        Call::Genesis {
            constants: self.constants.clone(),
            allocations: self
                .allocations
                .iter()
                .map(|a| NativeAllocation {
                    account: account_address(&a.account),
                    amount: u128::from(a.amount),
                })
                .collect(),
        }
    }
}
