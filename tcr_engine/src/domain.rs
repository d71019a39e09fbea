//! Ledger Engine: Core Domain Types
//!
//! Pure data. Fixed-size byte identifiers, ledger constants and the
//! receipt/log types produced by transitions.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::contracts::ContractKind;

/// Token and native-currency quantities.
pub type Amount = u128;

/// Ledger time in seconds.
pub type Timestamp = u64;

// ── Fixed-size byte values ─────────────────────────────────────────

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;
            pub const ZERO: Self = Self([0u8; $len]);

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(bytes).ok().map(Self)
            }

            /// Lowercase hex with a `0x` prefix.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Accepts hex with or without the `0x` prefix.
            pub fn from_hex(s: &str) -> Option<Self> {
                let raw = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(raw).ok()?;
                Self::from_slice(&bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "invalid {} hex {:?}: expected {} bytes",
                        stringify!($name),
                        s,
                        $len
                    ))
                })
            }
        }
    };
}

fixed_bytes!(
    /// 20-byte account or contract address.
    Address,
    20
);

fixed_bytes!(
    /// 32-byte content hash (registry entries, posts, boards).
    Hash32,
    32
);

fixed_bytes!(
    /// Stable capability identifier derived from a module name.
    CapabilityId,
    32
);

fixed_bytes!(
    /// 4-byte function selector derived from a canonical signature.
    Selector,
    4
);

impl Hash32 {
    /// Hash whose last eight bytes hold `n` big-endian. Handy for ids.
    pub fn from_low_u64(n: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&n.to_be_bytes());
        Self(out)
    }
}

// ── Ledger constants ──────────────────────────────────────────────

/// Ledger-wide parameters, injected by the genesis transaction.
///
/// Registries and forums copy the values they need when deployed, so a
/// module's behaviour is fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConstants {
    /// Length of a registry poll in seconds.
    pub vote_duration: u64,
    /// Minimum `vote_for + vote_against` required to whitelist.
    pub quorum_floor: Amount,
    /// Percentage (0..=100) withheld from every forum upvote.
    pub forum_fee_percentage: u8,
}

impl Default for LedgerConstants {
    fn default() -> Self {
        Self {
            vote_duration: 7 * 24 * 60 * 60,
            quorum_floor: 1,
            forum_fee_percentage: 0,
        }
    }
}

/// Native currency credited to an account at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeAllocation {
    pub account: Address,
    pub amount: Amount,
}

// ── Receipts ──────────────────────────────────────────────────────

/// Log entry emitted by an accepted transaction.
///
/// Externally tagged: amounts are `u128`, which serde cannot buffer
/// through an internally tagged representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    Genesis {
        native_supply: Amount,
    },
    LibraryDeployed {
        name: String,
        address: Address,
    },
    LibraryLinked {
        library: String,
        targets: Vec<ContractKind>,
    },
    ContractDeployed {
        kind: ContractKind,
        address: Address,
        deployer: Address,
    },
    HandlerRegistered {
        id: CapabilityId,
        handler: Address,
    },
    ModuleConnected {
        module: Address,
        dependencies: Vec<CapabilityId>,
    },
    ContractRegistered {
        id: CapabilityId,
        address: Address,
        previous: Option<Address>,
    },
    Permitted {
        caller: CapabilityId,
        callee: CapabilityId,
        selectors: Vec<Selector>,
    },
    ProjectAdded {
        registry: Address,
        hash: Hash32,
    },
    PollStarted {
        registry: Address,
        hash: Hash32,
        start: Timestamp,
        end: Timestamp,
    },
    Voted {
        registry: Address,
        hash: Hash32,
        voter: Address,
        support: bool,
        stake: Amount,
    },
    Whitelist {
        registry: Address,
        hash: Hash32,
        success: bool,
    },
    Delist {
        registry: Address,
        hash: Hash32,
    },
    StakeWithdrawn {
        registry: Address,
        hash: Hash32,
        voter: Address,
        amount: Amount,
    },
    BoardAdded {
        forum: Address,
        board: Hash32,
        token: Address,
    },
    BoardTokenSet {
        forum: Address,
        board: Hash32,
        token: Address,
    },
    Posted {
        forum: Address,
        board: Hash32,
        parent: Hash32,
        hash: Hash32,
        poster: Address,
    },
    PostUpdated {
        forum: Address,
        hash: Hash32,
    },
    Upvoted {
        forum: Address,
        hash: Hash32,
        payer: Address,
        amount: Amount,
        fee: Amount,
    },
    RewardWithdrawn {
        forum: Address,
        hash: Hash32,
        poster: Address,
        amount: Amount,
    },
    FeesCollected {
        forum: Address,
        token: Address,
        amount: Amount,
    },
    AirdropClaimed {
        forum: Address,
        hash: Hash32,
        claimer: Address,
        amount: Amount,
    },
    PutOptionPurchased {
        forum: Address,
        hash: Hash32,
        investor: Address,
        amount: Amount,
        fee: Amount,
    },
    PutOptionExecuted {
        forum: Address,
        hash: Hash32,
        investor: Address,
        amount: Amount,
        refund: Amount,
    },
    MilestoneWithdrawn {
        forum: Address,
        hash: Hash32,
        poster: Address,
        amount: Amount,
    },
    PurchaseReputation {
        sender: Address,
        purchaser: Address,
        value: Amount,
    },
    BatchExchange {
        admin: Address,
        beneficiaries: Vec<Address>,
        values: Vec<Amount>,
    },
}

/// Outcome of an accepted transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub sequence: u64,
    pub events: Vec<LogEvent>,
    /// Address of the contract or library created by this transaction.
    pub created: Option<Address>,
}

impl Receipt {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    pub fn emit(&mut self, event: LogEvent) {
        self.events.push(event);
    }

    /// The `success` flag of the first `Whitelist` event, if any.
    pub fn whitelist_outcome(&self) -> Option<bool> {
        self.events.iter().find_map(|e| match e {
            LogEvent::Whitelist { success, .. } => Some(*success),
            _ => None,
        })
    }
}
