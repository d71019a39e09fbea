//! Ledger Engine: Centralized Transition Logic
//!
//! ALL state mutation is dispatched from here. The input state is never
//! mutated: a clone is made first and returned only on success.

use std::collections::BTreeSet;

use tracing::debug;

use crate::acl::AccessControlTable;
use crate::contracts::{deploy_contract, deploy_library, link_library, ContractKind};
use crate::directory::ContractAddressDirectory;
use crate::domain::{Address, Amount, LogEvent, Receipt, Timestamp};
use crate::errors::{EngineError, EngineResult};
use crate::events::{Call, Transaction};
use crate::forum::{Forum, NewPost};
use crate::kernel::RootAuthority;
use crate::registry::Registry;
use crate::state::LedgerState;
use crate::token::ledger_mut;

/// Who is calling, with what, and when.
#[derive(Debug, Clone, Copy)]
struct TxContext {
    sender: Address,
    value: Amount,
    now: Timestamp,
}

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

/// Apply `tx` to `state` and return `(new_state, receipt)`.
pub fn apply_transaction(state: &LedgerState, tx: &Transaction) -> EngineResult<(LedgerState, Receipt)> {
    if tx.value > 0 && !tx.call.is_payable() {
        return Err(EngineError::NonPayable);
    }
    let mut new_state = state.clone();
    new_state.now = tx.timestamp;
    let ctx = TxContext {
        sender: tx.sender,
        value: tx.value,
        now: tx.timestamp,
    };
    let mut receipt = Receipt::new(tx.sequence);
    dispatch(&mut new_state, &ctx, &tx.call, &mut receipt)?;
    debug!(
        sequence = tx.sequence,
        method = tx.call.method(),
        events = receipt.events.len(),
        "transaction applied"
    );
    Ok((new_state, receipt))
}

fn dispatch(state: &mut LedgerState, ctx: &TxContext, call: &Call, receipt: &mut Receipt) -> EngineResult<()> {
    match call {
        Call::Genesis {
            constants,
            allocations,
        } => {
            if constants.forum_fee_percentage > 100 {
                return Err(EngineError::InvalidRange(format!(
                    "forum fee percentage {} exceeds 100",
                    constants.forum_fee_percentage
                )));
            }
            state.constants = constants.clone();
            for alloc in allocations {
                state.native.credit_genesis(&alloc.account, alloc.amount)?;
            }
            receipt.emit(LogEvent::Genesis {
                native_supply: state.native.supply,
            });
        }

        // -- deployment --
        Call::DeployLibrary { name } => {
            let address = deploy_library(state, &ctx.sender, name)?;
            receipt.created = Some(address);
            receipt.emit(LogEvent::LibraryDeployed {
                name: name.clone(),
                address,
            });
        }
        Call::LinkLibrary { library, targets } => {
            link_library(state, library, targets)?;
            receipt.emit(LogEvent::LibraryLinked {
                library: library.clone(),
                targets: targets.clone(),
            });
        }
        Call::Deploy { contract } => {
            let address = deploy_contract(state, &ctx.sender, contract)?;
            receipt.created = Some(address);
            receipt.emit(LogEvent::ContractDeployed {
                kind: contract.kind(),
                address,
                deployer: ctx.sender,
            });
        }

        // -- tokens --
        Call::Transfer { token, to, amount } => {
            ledger_mut(&mut state.tokens, token)?.transfer(&ctx.sender, to, *amount)?;
        }
        Call::Approve {
            token,
            spender,
            amount,
        } => {
            ledger_mut(&mut state.tokens, token)?.approve(&ctx.sender, spender, *amount);
        }
        Call::TransferFrom {
            token,
            from,
            to,
            amount,
        } => {
            ledger_mut(&mut state.tokens, token)?.transfer_from(&ctx.sender, from, to, *amount)?;
        }
        Call::ApproveAndCall {
            token,
            spender,
            amount,
            then,
        } => {
            match then.as_ref() {
                Call::Genesis { .. } => return Err(EngineError::GenesisRepeated),
                Call::ApproveAndCall { .. } => {
                    return Err(EngineError::InvalidRange(
                        "approve_and_call cannot nest".to_string(),
                    ))
                }
                inner if inner.target() != Some(*spender) => {
                    return Err(EngineError::InvalidRange(format!(
                        "{} is not addressed to spender {spender}",
                        inner.method()
                    )))
                }
                _ => {}
            }
            ledger_mut(&mut state.tokens, token)?.approve(&ctx.sender, spender, *amount);
            dispatch(state, ctx, then, receipt)?;
        }

        // -- kernel, directory, acl --
        Call::RegisterHandler { id, handler } => {
            let auth = root_authority(state, ctx)?;
            let kernel = state.kernel()?.clone();
            let directory = directory_mut(state)?;
            kernel.register_handler(&auth, directory, *id, *handler);
            receipt.emit(LogEvent::HandlerRegistered {
                id: *id,
                handler: *handler,
            });
        }
        Call::Connect {
            module,
            dependencies,
        } => {
            let auth = root_authority(state, ctx)?;
            if !state.contracts.contains_key(module) {
                return Err(EngineError::NotFound(format!("contract {module}")));
            }
            let kernel = state.kernel()?.clone();
            let acl = acl_mut(state)?;
            kernel.connect(&auth, acl, *module, dependencies.clone());
            receipt.emit(LogEvent::ModuleConnected {
                module: *module,
                dependencies: dependencies.clone(),
            });
        }
        Call::RegisterContract { id, address } => {
            let auth = root_authority(state, ctx)?;
            let previous = directory_mut(state)?.register(&auth, *id, *address);
            receipt.emit(LogEvent::ContractRegistered {
                id: *id,
                address: *address,
                previous,
            });
        }
        Call::Permit {
            caller,
            callee,
            selectors,
        } => {
            let auth = root_authority(state, ctx)?;
            let set: BTreeSet<_> = selectors.iter().copied().collect();
            acl_mut(state)?.permit(&auth, *caller, *callee, set);
            receipt.emit(LogEvent::Permitted {
                caller: *caller,
                callee: *callee,
                selectors: selectors.clone(),
            });
        }

        // -- registry --
        Call::AddProject { registry, hash } => {
            registry_mut(state, registry)?.add_project(*hash)?;
            receipt.emit(LogEvent::ProjectAdded {
                registry: *registry,
                hash: *hash,
            });
        }
        Call::StartPoll { registry, hash } => {
            let poll = registry_mut(state, registry)?.start_poll(*hash, ctx.now)?;
            receipt.emit(LogEvent::PollStarted {
                registry: *registry,
                hash: *hash,
                start: poll.start,
                end: poll.end,
            });
        }
        Call::Vote {
            registry,
            voter,
            hash,
            support,
            stake,
        } => {
            if *voter != ctx.sender {
                return Err(EngineError::NotAuthorized(format!(
                    "{} cannot vote as {voter}",
                    ctx.sender
                )));
            }
            let reg = state.registries.get_mut(registry).ok_or(unknown_registry(registry))?;
            let token = ledger_mut(&mut state.tokens, &reg.token)?;
            reg.vote(token, *voter, *hash, *support, *stake, ctx.now)?;
            receipt.emit(LogEvent::Voted {
                registry: *registry,
                hash: *hash,
                voter: *voter,
                support: *support,
                stake: *stake,
            });
        }
        Call::Whitelist { registry, hash } => {
            let success = registry_mut(state, registry)?.whitelist(*hash, ctx.now)?;
            receipt.emit(LogEvent::Whitelist {
                registry: *registry,
                hash: *hash,
                success,
            });
        }
        Call::Delist { registry, hash } => {
            registry_mut(state, registry)?.delist(*hash, ctx.now)?;
            receipt.emit(LogEvent::Delist {
                registry: *registry,
                hash: *hash,
            });
        }
        Call::WithdrawStake { registry, hash } => {
            let reg = state.registries.get_mut(registry).ok_or(unknown_registry(registry))?;
            let token = ledger_mut(&mut state.tokens, &reg.token)?;
            let amount = reg.withdraw(token, ctx.sender, *hash, ctx.now)?;
            receipt.emit(LogEvent::StakeWithdrawn {
                registry: *registry,
                hash: *hash,
                voter: ctx.sender,
                amount,
            });
        }

        // -- forum --
        Call::AddBoard {
            forum,
            board,
            token,
        } => {
            state.expect_token(token)?;
            forum_mut(state, forum)?.add_board(&ctx.sender, *board, *token)?;
            receipt.emit(LogEvent::BoardAdded {
                forum: *forum,
                board: *board,
                token: *token,
            });
        }
        Call::SetBoardToken {
            forum,
            board,
            token,
        } => {
            state.expect_token(token)?;
            forum_mut(state, forum)?.set_board_token(&ctx.sender, *board, *token)?;
            receipt.emit(LogEvent::BoardTokenSet {
                forum: *forum,
                board: *board,
                token: *token,
            });
        }
        Call::Post { forum, post } => {
            forum_mut(state, forum)?.post(ctx.sender, post.clone())?;
            receipt.emit(posted(forum, post, ctx.sender));
        }
        Call::UpdatePost {
            forum,
            hash,
            content,
        } => {
            forum_mut(state, forum)?.update_post(&ctx.sender, *hash, *content)?;
            receipt.emit(LogEvent::PostUpdated {
                forum: *forum,
                hash: *hash,
            });
        }
        Call::Upvote {
            forum,
            payer,
            hash,
            amount,
        } => {
            if *payer != ctx.sender {
                return Err(EngineError::NotAuthorized(format!(
                    "{} cannot upvote on behalf of {payer}",
                    ctx.sender
                )));
            }
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            let fee = f.upvote(&mut state.tokens, *payer, *hash, *amount)?;
            receipt.emit(LogEvent::Upvoted {
                forum: *forum,
                hash: *hash,
                payer: *payer,
                amount: *amount,
                fee,
            });
        }
        Call::WithdrawReward { forum, hash } => {
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            let amount = f.withdraw(&mut state.tokens, ctx.sender, *hash)?;
            receipt.emit(LogEvent::RewardWithdrawn {
                forum: *forum,
                hash: *hash,
                poster: ctx.sender,
                amount,
            });
        }
        Call::CollectFees { forum, token } => {
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            let amount = f.collect_fees(&mut state.tokens, &ctx.sender, *token)?;
            receipt.emit(LogEvent::FeesCollected {
                forum: *forum,
                token: *token,
                amount,
            });
        }
        Call::PostAirdrop {
            forum,
            post,
            target,
        } => {
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            f.post_airdrop(&state.airdrops, ctx.sender, post.clone(), *target)?;
            receipt.emit(posted(forum, post, ctx.sender));
        }
        Call::AirdropCall { forum, hash } => {
            let f = state.forums.get(forum).ok_or(unknown_forum(forum))?;
            let amount = f.airdrop_call(&mut state.airdrops, &mut state.tokens, hash, &ctx.sender)?;
            receipt.emit(LogEvent::AirdropClaimed {
                forum: *forum,
                hash: *hash,
                claimer: ctx.sender,
                amount,
            });
        }
        Call::PostMilestone { forum, post, terms } => {
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            f.post_milestone(
                &mut state.native,
                &state.tokens,
                ctx.sender,
                post.clone(),
                terms.clone(),
                ctx.value,
                ctx.now,
            )?;
            receipt.emit(posted(forum, post, ctx.sender));
        }
        Call::PurchasePutOption {
            forum,
            hash,
            amount,
        } => {
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            let fee = f.purchase_put_option(&mut state.tokens, ctx.sender, *hash, *amount, ctx.now)?;
            receipt.emit(LogEvent::PutOptionPurchased {
                forum: *forum,
                hash: *hash,
                investor: ctx.sender,
                amount: *amount,
                fee,
            });
        }
        Call::ExecutePutOption {
            forum,
            hash,
            amount,
        } => {
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            let refund = f.execute_put_option(
                &mut state.tokens,
                &mut state.native,
                ctx.sender,
                *hash,
                *amount,
                ctx.now,
            )?;
            receipt.emit(LogEvent::PutOptionExecuted {
                forum: *forum,
                hash: *hash,
                investor: ctx.sender,
                amount: *amount,
                refund,
            });
        }
        Call::MilestoneWithdraw { forum, hash } => {
            let f = state.forums.get_mut(forum).ok_or(unknown_forum(forum))?;
            let amount = f.milestone_withdraw(&mut state.native, ctx.sender, *hash, ctx.now)?;
            receipt.emit(LogEvent::MilestoneWithdrawn {
                forum: *forum,
                hash: *hash,
                poster: ctx.sender,
                amount,
            });
        }

        // -- reputation exchange --
        Call::PurchaseReputation {
            exchange,
            purchaser,
            value,
        } => {
            let ex = state.exchange(exchange)?.clone();
            ex.purchase_reputation(&mut state.tokens, ctx.sender, *value)?;
            receipt.emit(LogEvent::PurchaseReputation {
                sender: ctx.sender,
                purchaser: *purchaser,
                value: *value,
            });
        }
        Call::BatchExchange {
            exchange,
            beneficiaries,
            values,
        } => {
            let ex = state
                .exchanges
                .get(exchange)
                .ok_or(EngineError::UnknownContract {
                    address: *exchange,
                    expected: ContractKind::ReputationExchange,
                })?;
            let kernel = state.kernel.as_ref().ok_or(EngineError::NotDeployed(
                ContractKind::Kernel,
            ))?;
            let directory = state.directory.as_ref().ok_or(EngineError::NotDeployed(
                ContractKind::ContractAddressHandler,
            ))?;
            let acl = state.acl.as_ref().ok_or(EngineError::NotDeployed(
                ContractKind::AclHandler,
            ))?;
            ex.batch_exchange(
                kernel,
                directory,
                acl,
                &mut state.tokens,
                &ctx.sender,
                beneficiaries,
                values,
            )?;
            receipt.emit(LogEvent::BatchExchange {
                admin: ctx.sender,
                beneficiaries: beneficiaries.clone(),
                values: values.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers (private)
// ---------------------------------------------------------------------------

fn root_authority(state: &LedgerState, ctx: &TxContext) -> EngineResult<RootAuthority> {
    state.kernel()?.authority(&ctx.sender)
}

fn directory_mut(state: &mut LedgerState) -> EngineResult<&mut ContractAddressDirectory> {
    state.directory.as_mut().ok_or(EngineError::NotDeployed(
        ContractKind::ContractAddressHandler,
    ))
}

fn acl_mut(state: &mut LedgerState) -> EngineResult<&mut AccessControlTable> {
    state
        .acl
        .as_mut()
        .ok_or(EngineError::NotDeployed(ContractKind::AclHandler))
}

fn registry_mut<'a>(
    state: &'a mut LedgerState,
    address: &Address,
) -> EngineResult<&'a mut Registry> {
    state
        .registries
        .get_mut(address)
        .ok_or(unknown_registry(address))
}

fn forum_mut<'a>(state: &'a mut LedgerState, address: &Address) -> EngineResult<&'a mut Forum> {
    state.forums.get_mut(address).ok_or(unknown_forum(address))
}

fn unknown_registry(address: &Address) -> EngineError {
    EngineError::UnknownContract {
        address: *address,
        expected: ContractKind::Registry,
    }
}

fn unknown_forum(address: &Address) -> EngineError {
    EngineError::UnknownContract {
        address: *address,
        expected: ContractKind::Forum,
    }
}

fn posted(forum: &Address, post: &NewPost, poster: Address) -> LogEvent {
    LogEvent::Posted {
        forum: *forum,
        board: post.board,
        parent: post.parent,
        hash: post.hash,
        poster,
    }
}
