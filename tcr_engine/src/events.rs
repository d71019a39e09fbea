//! Ledger Engine: Transactions
//!
//! Transactions are pure data. They carry sender, attached value and the
//! call to make, and contain no transition logic.
//!
//! Schema version is locked at 1. Transactions with any other
//! schema_version are rejected by the engine.

use serde::{Deserialize, Serialize};

use crate::airdrop::AirdropTarget;
use crate::contracts::{ContractKind, ContractSpec};
use crate::domain::{
    Address, Amount, CapabilityId, Hash32, LedgerConstants, NativeAllocation, Selector, Timestamp,
};
use crate::forum::NewPost;
use crate::milestone::MilestoneTerms;
use crate::multihash::Multihash;

/// Schema version for v1 transactions.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub schema_version: u32,
    pub sequence: u64,
    /// Ledger time in seconds. Non-decreasing across the log.
    pub timestamp: Timestamp,
    pub sender: Address,
    /// Native currency attached to the call.
    #[serde(default)]
    pub value: Amount,
    pub call: Call,
}

impl Transaction {
    pub fn new(sequence: u64, timestamp: Timestamp, sender: Address, call: Call) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            sequence,
            timestamp,
            sender,
            value: 0,
            call,
        }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

/// Every state-changing operation. Externally tagged so `u128` amounts
/// deserialize without buffering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    Genesis {
        constants: LedgerConstants,
        allocations: Vec<NativeAllocation>,
    },

    // -- deployment --
    DeployLibrary {
        name: String,
    },
    LinkLibrary {
        library: String,
        targets: Vec<ContractKind>,
    },
    Deploy {
        contract: ContractSpec,
    },

    // -- tokens --
    Transfer {
        token: Address,
        to: Address,
        amount: Amount,
    },
    Approve {
        token: Address,
        spender: Address,
        amount: Amount,
    },
    TransferFrom {
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    /// Approve `spender`, then make `then` (addressed to `spender`) as the
    /// same sender, atomically.
    ApproveAndCall {
        token: Address,
        spender: Address,
        amount: Amount,
        then: Box<Call>,
    },

    // -- kernel, directory, acl --
    RegisterHandler {
        id: CapabilityId,
        handler: Address,
    },
    Connect {
        module: Address,
        dependencies: Vec<CapabilityId>,
    },
    RegisterContract {
        id: CapabilityId,
        address: Address,
    },
    Permit {
        caller: CapabilityId,
        callee: CapabilityId,
        selectors: Vec<Selector>,
    },

    // -- registry --
    AddProject {
        registry: Address,
        hash: Hash32,
    },
    StartPoll {
        registry: Address,
        hash: Hash32,
    },
    Vote {
        registry: Address,
        voter: Address,
        hash: Hash32,
        support: bool,
        stake: Amount,
    },
    Whitelist {
        registry: Address,
        hash: Hash32,
    },
    Delist {
        registry: Address,
        hash: Hash32,
    },
    WithdrawStake {
        registry: Address,
        hash: Hash32,
    },

    // -- forum --
    AddBoard {
        forum: Address,
        board: Hash32,
        token: Address,
    },
    SetBoardToken {
        forum: Address,
        board: Hash32,
        token: Address,
    },
    Post {
        forum: Address,
        post: NewPost,
    },
    UpdatePost {
        forum: Address,
        hash: Hash32,
        content: Multihash,
    },
    Upvote {
        forum: Address,
        payer: Address,
        hash: Hash32,
        amount: Amount,
    },
    WithdrawReward {
        forum: Address,
        hash: Hash32,
    },
    CollectFees {
        forum: Address,
        token: Address,
    },
    PostAirdrop {
        forum: Address,
        post: NewPost,
        target: AirdropTarget,
    },
    AirdropCall {
        forum: Address,
        hash: Hash32,
    },
    /// Payable: the attached value becomes the milestone's backing.
    PostMilestone {
        forum: Address,
        post: NewPost,
        terms: MilestoneTerms,
    },
    PurchasePutOption {
        forum: Address,
        hash: Hash32,
        amount: Amount,
    },
    ExecutePutOption {
        forum: Address,
        hash: Hash32,
        amount: Amount,
    },
    MilestoneWithdraw {
        forum: Address,
        hash: Hash32,
    },

    // -- reputation exchange --
    PurchaseReputation {
        exchange: Address,
        purchaser: Address,
        value: Amount,
    },
    BatchExchange {
        exchange: Address,
        beneficiaries: Vec<Address>,
        values: Vec<Amount>,
    },
}

impl Call {
    pub fn is_payable(&self) -> bool {
        matches!(self, Call::PostMilestone { .. })
    }

    /// Contract the call is addressed to, for calls made on a deployed
    /// module.
    pub fn target(&self) -> Option<Address> {
        match self {
            Call::Transfer { token, .. }
            | Call::Approve { token, .. }
            | Call::TransferFrom { token, .. }
            | Call::ApproveAndCall { token, .. } => Some(*token),
            Call::AddProject { registry, .. }
            | Call::StartPoll { registry, .. }
            | Call::Vote { registry, .. }
            | Call::Whitelist { registry, .. }
            | Call::Delist { registry, .. }
            | Call::WithdrawStake { registry, .. } => Some(*registry),
            Call::AddBoard { forum, .. }
            | Call::SetBoardToken { forum, .. }
            | Call::Post { forum, .. }
            | Call::UpdatePost { forum, .. }
            | Call::Upvote { forum, .. }
            | Call::WithdrawReward { forum, .. }
            | Call::CollectFees { forum, .. }
            | Call::PostAirdrop { forum, .. }
            | Call::AirdropCall { forum, .. }
            | Call::PostMilestone { forum, .. }
            | Call::PurchasePutOption { forum, .. }
            | Call::ExecutePutOption { forum, .. }
            | Call::MilestoneWithdraw { forum, .. } => Some(*forum),
            Call::PurchaseReputation { exchange, .. } | Call::BatchExchange { exchange, .. } => {
                Some(*exchange)
            }
            _ => None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Call::Genesis { .. } => "genesis",
            Call::DeployLibrary { .. } => "deploy_library",
            Call::LinkLibrary { .. } => "link_library",
            Call::Deploy { .. } => "deploy",
            Call::Transfer { .. } => "transfer",
            Call::Approve { .. } => "approve",
            Call::TransferFrom { .. } => "transfer_from",
            Call::ApproveAndCall { .. } => "approve_and_call",
            Call::RegisterHandler { .. } => "register_handler",
            Call::Connect { .. } => "connect",
            Call::RegisterContract { .. } => "register_contract",
            Call::Permit { .. } => "permit",
            Call::AddProject { .. } => "add_project",
            Call::StartPoll { .. } => "start_poll",
            Call::Vote { .. } => "vote",
            Call::Whitelist { .. } => "whitelist",
            Call::Delist { .. } => "delist",
            Call::WithdrawStake { .. } => "withdraw_stake",
            Call::AddBoard { .. } => "add_board",
            Call::SetBoardToken { .. } => "set_board_token",
            Call::Post { .. } => "post",
            Call::UpdatePost { .. } => "update_post",
            Call::Upvote { .. } => "upvote",
            Call::WithdrawReward { .. } => "withdraw_reward",
            Call::CollectFees { .. } => "collect_fees",
            Call::PostAirdrop { .. } => "post_airdrop",
            Call::AirdropCall { .. } => "airdrop_call",
            Call::PostMilestone { .. } => "post_milestone",
            Call::PurchasePutOption { .. } => "purchase_put_option",
            Call::ExecutePutOption { .. } => "execute_put_option",
            Call::MilestoneWithdraw { .. } => "milestone_withdraw",
            Call::PurchaseReputation { .. } => "purchase_reputation",
            Call::BatchExchange { .. } => "batch_exchange",
        }
    }
}
