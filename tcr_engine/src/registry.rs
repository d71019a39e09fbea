//! Token-Curated Registry
//!
//! Candidate entries live in an arena keyed by content hash. Each entry is
//! a member of at most one of three sentinel-anchored lists (Pending,
//! Voting, Whitelisted); its `Membership` carries the prev/next links for
//! that list. Every splice validates both neighbours before it writes.
//!
//! Polls stay in the arena after resolution so voters can withdraw.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arithmetic::{checked_add, checked_sub, mul_div};
use crate::domain::{Address, Amount, Hash32, LedgerConstants, Timestamp};
use crate::errors::{EngineError, EngineResult};
use crate::token::TokenLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Pending,
    Voting,
    Whitelisted,
}

impl ListKind {
    pub const ALL: [ListKind; 3] = [ListKind::Pending, ListKind::Voting, ListKind::Whitelisted];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListAnchor {
    pub head: Option<Hash32>,
    pub tail: Option<Hash32>,
    pub len: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Links {
    pub prev: Option<Hash32>,
    pub next: Option<Hash32>,
}

/// Where an entry currently is. `Rejected` and `Delisted` entries are off
/// every list but keep their hash reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Listed { list: ListKind, links: Links },
    Rejected,
    Delisted,
}

impl Membership {
    pub fn list(&self) -> Option<ListKind> {
        match self {
            Membership::Listed { list, .. } => Some(*list),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoterStake {
    pub stake_for: Amount,
    pub stake_against: Amount,
    pub withdrawn: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Poll {
    pub start: Timestamp,
    pub end: Timestamp,
    pub vote_for: Amount,
    pub vote_against: Amount,
    pub voters: BTreeMap<Address, VoterStake>,
    /// Stake already returned to voters.
    pub paid_out: Amount,
}

impl Poll {
    pub fn total(&self) -> EngineResult<Amount> {
        checked_add(self.vote_for, self.vote_against)
    }

    /// Ties go to the against side.
    pub fn for_wins(&self) -> bool {
        self.vote_for > self.vote_against
    }

    /// Own winning-side stake plus a pro-rata share of the losing pool.
    /// Losing-side stake is forfeited.
    pub fn payout(&self, stake: &VoterStake) -> EngineResult<Amount> {
        let (own, winning_pool, losing_pool) = if self.for_wins() {
            (stake.stake_for, self.vote_for, self.vote_against)
        } else {
            (stake.stake_against, self.vote_against, self.vote_for)
        };
        if own == 0 {
            return Ok(0);
        }
        checked_add(own, mul_div(losing_pool, own, winning_pool)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    pub membership: Membership,
    pub poll: Option<Poll>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    pub address: Address,
    /// Staking token.
    pub token: Address,
    pub vote_duration: u64,
    pub quorum_floor: Amount,
    pub pending: ListAnchor,
    pub voting: ListAnchor,
    pub whitelisted: ListAnchor,
    pub entries: BTreeMap<Hash32, Entry>,
}

impl Registry {
    pub fn new(address: Address, token: Address, constants: &LedgerConstants) -> Self {
        Self {
            address,
            token,
            vote_duration: constants.vote_duration,
            quorum_floor: constants.quorum_floor,
            pending: ListAnchor::default(),
            voting: ListAnchor::default(),
            whitelisted: ListAnchor::default(),
            entries: BTreeMap::new(),
        }
    }

    // ── Transitions ───────────────────────────────────────────────

    pub fn add_project(&mut self, hash: Hash32) -> EngineResult<()> {
        if hash.is_zero() {
            return Err(EngineError::InvalidRange(
                "the zero hash is the list sentinel".to_string(),
            ));
        }
        if self.entries.contains_key(&hash) {
            return Err(EngineError::DuplicateEntry(hash));
        }
        self.entries.insert(
            hash,
            Entry {
                membership: Membership::Rejected,
                poll: None,
            },
        );
        self.push_back(ListKind::Pending, hash)
    }

    /// Moves a pending entry to Voting and opens `[now, now + duration)`.
    pub fn start_poll(&mut self, hash: Hash32, now: Timestamp) -> EngineResult<Poll> {
        if self.list_of(&hash) != Some(ListKind::Pending) {
            return Err(EngineError::NotPending(hash));
        }
        let end = now.checked_add(self.vote_duration).ok_or(EngineError::Overflow)?;
        self.unlink(hash)?;
        self.push_back(ListKind::Voting, hash)?;
        let poll = Poll {
            start: now,
            end,
            vote_for: 0,
            vote_against: 0,
            voters: BTreeMap::new(),
            paid_out: 0,
        };
        self.entry_mut(&hash)?.poll = Some(poll.clone());
        Ok(poll)
    }

    /// Pulls `stake` from the voter into escrow. Contributions are
    /// additive and a voter may back both sides.
    pub fn vote(
        &mut self,
        token: &mut TokenLedger,
        voter: Address,
        hash: Hash32,
        support: bool,
        stake: Amount,
        now: Timestamp,
    ) -> EngineResult<()> {
        if self.list_of(&hash) != Some(ListKind::Voting) {
            return Err(EngineError::PollNotStarted(hash));
        }
        let registry = self.address;
        let poll = self.poll_mut(&hash)?;
        if now < poll.start {
            return Err(EngineError::PollNotStarted(hash));
        }
        if now >= poll.end {
            return Err(EngineError::PollClosed { hash, end: poll.end });
        }
        if stake == 0 {
            return Err(EngineError::InvalidAmount("stake must be positive".to_string()));
        }

        token.transfer_from(&registry, &voter, &registry, stake)?;

        let voter_stake = poll.voters.entry(voter).or_default();
        if support {
            voter_stake.stake_for = checked_add(voter_stake.stake_for, stake)?;
            poll.vote_for = checked_add(poll.vote_for, stake)?;
        } else {
            voter_stake.stake_against = checked_add(voter_stake.stake_against, stake)?;
            poll.vote_against = checked_add(poll.vote_against, stake)?;
        }
        Ok(())
    }

    /// Resolves a finished poll. Returns whether the entry was approved.
    pub fn whitelist(&mut self, hash: Hash32, now: Timestamp) -> EngineResult<bool> {
        let poll = self.ended_voting_poll(hash, now)?;
        let approved = poll.for_wins() && poll.total()? >= self.quorum_floor;
        self.unlink(hash)?;
        if approved {
            self.push_back(ListKind::Whitelisted, hash)?;
        } else {
            self.entry_mut(&hash)?.membership = Membership::Rejected;
        }
        Ok(approved)
    }

    /// Removes a finished poll's entry when against strictly beats for.
    pub fn delist(&mut self, hash: Hash32, now: Timestamp) -> EngineResult<()> {
        let poll = self.ended_voting_poll(hash, now)?;
        if poll.vote_against <= poll.vote_for {
            return Err(EngineError::DelistRefused {
                hash,
                vote_for: poll.vote_for,
                vote_against: poll.vote_against,
            });
        }
        self.unlink(hash)?;
        self.entry_mut(&hash)?.membership = Membership::Delisted;
        Ok(())
    }

    /// Pays out the voter's settlement once the poll has ended. Allowed
    /// once per (entry, voter), whether or not the poll was resolved.
    pub fn withdraw(
        &mut self,
        token: &mut TokenLedger,
        voter: Address,
        hash: Hash32,
        now: Timestamp,
    ) -> EngineResult<Amount> {
        let registry = self.address;
        let poll = self.poll_mut(&hash)?;
        if now < poll.end {
            return Err(EngineError::NotWithdrawable(format!(
                "poll for {hash} ends at {}",
                poll.end
            )));
        }
        let stake = poll.voters.get(&voter).copied().ok_or_else(|| {
            EngineError::NotWithdrawable(format!("{voter} did not vote on {hash}"))
        })?;
        if stake.withdrawn {
            return Err(EngineError::AlreadyWithdrawn(format!("{voter} on {hash}")));
        }
        let amount = poll.payout(&stake)?;

        token.transfer(&registry, &voter, amount)?;

        poll.paid_out = checked_add(poll.paid_out, amount)?;
        if let Some(s) = poll.voters.get_mut(&voter) {
            s.withdrawn = true;
        }
        Ok(amount)
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Successor of `prev` in `list`. A zero `prev` yields the head; the
    /// zero hash marks the end of the list.
    pub fn next_project_hash(&self, list: ListKind, prev: Hash32) -> EngineResult<Hash32> {
        if prev.is_zero() {
            return Ok(self.anchor(list).head.unwrap_or(Hash32::ZERO));
        }
        match self.entries.get(&prev).map(|e| e.membership) {
            Some(Membership::Listed { list: l, links }) if l == list => {
                Ok(links.next.unwrap_or(Hash32::ZERO))
            }
            _ => Err(EngineError::NotFound(format!("{prev} in {list:?} list"))),
        }
    }

    /// `(vote_for, vote_against)`, zero before the poll starts.
    pub fn poll_votes(&self, hash: &Hash32) -> EngineResult<(Amount, Amount)> {
        Ok(self
            .entry(hash)?
            .poll
            .as_ref()
            .map_or((0, 0), |p| (p.vote_for, p.vote_against)))
    }

    pub fn poll_votes_by_address(
        &self,
        hash: &Hash32,
        voter: &Address,
    ) -> EngineResult<(Amount, Amount)> {
        Ok(self
            .entry(hash)?
            .poll
            .as_ref()
            .and_then(|p| p.voters.get(voter))
            .map_or((0, 0), |s| (s.stake_for, s.stake_against)))
    }

    pub fn poll_window(&self, hash: &Hash32) -> EngineResult<(Timestamp, Timestamp)> {
        self.entry(hash)?
            .poll
            .as_ref()
            .map(|p| (p.start, p.end))
            .ok_or(EngineError::PollNotStarted(*hash))
    }

    /// Entries of `list` in insertion order.
    pub fn projects(&self, list: ListKind) -> EngineResult<Vec<Hash32>> {
        let mut out = Vec::new();
        let mut cursor = self.next_project_hash(list, Hash32::ZERO)?;
        while !cursor.is_zero() {
            if out.len() as u64 >= self.anchor(list).len {
                return Err(EngineError::CorruptList(format!("{list:?} list longer than its length")));
            }
            out.push(cursor);
            cursor = self.next_project_hash(list, cursor)?;
        }
        Ok(out)
    }

    pub fn list_len(&self, list: ListKind) -> u64 {
        self.anchor(list).len
    }

    pub fn membership(&self, hash: &Hash32) -> Option<Membership> {
        self.entries.get(hash).map(|e| e.membership)
    }

    /// Stake still owed to voters across all polls.
    pub fn outstanding_escrow(&self) -> EngineResult<Amount> {
        let mut owed: Amount = 0;
        for poll in self.entries.values().filter_map(|e| e.poll.as_ref()) {
            owed = checked_add(owed, checked_sub(poll.total()?, poll.paid_out)?)?;
        }
        Ok(owed)
    }

    /// Walks every list forwards and checks links, lengths and that every
    /// listed entry is reachable.
    pub fn check_lists(&self) -> EngineResult<()> {
        let mut reached = 0u64;
        for list in ListKind::ALL {
            let mut prev: Option<Hash32> = None;
            let mut cursor = self.anchor(list).head;
            let mut count = 0u64;
            while let Some(hash) = cursor {
                let links = match self.entries.get(&hash).map(|e| e.membership) {
                    Some(Membership::Listed { list: l, links }) if l == list => links,
                    _ => {
                        return Err(EngineError::CorruptList(format!(
                            "{hash} reached from {list:?} head is not a member"
                        )))
                    }
                };
                if links.prev != prev {
                    return Err(EngineError::CorruptList(format!("{hash} has a stale prev link")));
                }
                count += 1;
                if count > self.anchor(list).len {
                    return Err(EngineError::CorruptList(format!("{list:?} list has a cycle")));
                }
                prev = Some(hash);
                cursor = links.next;
            }
            if prev != self.anchor(list).tail || count != self.anchor(list).len {
                return Err(EngineError::CorruptList(format!("{list:?} anchor out of date")));
            }
            reached += count;
        }
        let listed = self
            .entries
            .values()
            .filter(|e| e.membership.list().is_some())
            .count() as u64;
        if listed != reached {
            return Err(EngineError::CorruptList(format!(
                "{listed} listed entries but {reached} reachable"
            )));
        }
        Ok(())
    }

    // ── List mechanics ────────────────────────────────────────────

    fn anchor(&self, list: ListKind) -> &ListAnchor {
        match list {
            ListKind::Pending => &self.pending,
            ListKind::Voting => &self.voting,
            ListKind::Whitelisted => &self.whitelisted,
        }
    }

    fn anchor_mut(&mut self, list: ListKind) -> &mut ListAnchor {
        match list {
            ListKind::Pending => &mut self.pending,
            ListKind::Voting => &mut self.voting,
            ListKind::Whitelisted => &mut self.whitelisted,
        }
    }

    fn list_of(&self, hash: &Hash32) -> Option<ListKind> {
        self.entries.get(hash).and_then(|e| e.membership.list())
    }

    fn entry(&self, hash: &Hash32) -> EngineResult<&Entry> {
        self.entries
            .get(hash)
            .ok_or_else(|| EngineError::NotFound(format!("registry entry {hash}")))
    }

    fn entry_mut(&mut self, hash: &Hash32) -> EngineResult<&mut Entry> {
        self.entries
            .get_mut(hash)
            .ok_or_else(|| EngineError::NotFound(format!("registry entry {hash}")))
    }

    fn poll_mut(&mut self, hash: &Hash32) -> EngineResult<&mut Poll> {
        self.entry_mut(hash)?
            .poll
            .as_mut()
            .ok_or(EngineError::PollNotStarted(*hash))
    }

    fn ended_voting_poll(&self, hash: Hash32, now: Timestamp) -> EngineResult<Poll> {
        if self.list_of(&hash) != Some(ListKind::Voting) {
            return Err(EngineError::NotInVoting(hash));
        }
        let poll = self
            .entry(&hash)?
            .poll
            .clone()
            .ok_or(EngineError::NotInVoting(hash))?;
        if now < poll.end {
            return Err(EngineError::PollNotEnded { hash, end: poll.end });
        }
        Ok(poll)
    }

    /// Links of `hash`, which must be a member of `list`.
    fn links_mut(&mut self, hash: &Hash32, list: ListKind) -> EngineResult<&mut Links> {
        match self.entries.get_mut(hash).map(|e| &mut e.membership) {
            Some(Membership::Listed { list: l, links }) if *l == list => Ok(links),
            _ => Err(EngineError::CorruptList(format!("{hash} is not linked into {list:?}"))),
        }
    }

    fn push_back(&mut self, list: ListKind, hash: Hash32) -> EngineResult<()> {
        let tail = self.anchor(list).tail;
        match tail {
            Some(t) => {
                let links = self.links_mut(&t, list)?;
                if links.next.is_some() {
                    return Err(EngineError::CorruptList(format!("tail {t} has a successor")));
                }
                links.next = Some(hash);
            }
            None => self.anchor_mut(list).head = Some(hash),
        }
        self.entry_mut(&hash)?.membership = Membership::Listed {
            list,
            links: Links { prev: tail, next: None },
        };
        let anchor = self.anchor_mut(list);
        anchor.tail = Some(hash);
        anchor.len += 1;
        Ok(())
    }

    /// Splices `hash` out of its list. The entry is left `Rejected`;
    /// callers overwrite the membership.
    fn unlink(&mut self, hash: Hash32) -> EngineResult<()> {
        let (list, links) = match self.entry(&hash)?.membership {
            Membership::Listed { list, links } => (list, links),
            _ => return Err(EngineError::CorruptList(format!("{hash} is not listed"))),
        };

        // Validate both neighbours before touching anything.
        match links.prev {
            Some(p) => {
                if self.links_mut(&p, list)?.next != Some(hash) {
                    return Err(EngineError::CorruptList(format!("{p} does not point to {hash}")));
                }
            }
            None if self.anchor(list).head != Some(hash) => {
                return Err(EngineError::CorruptList(format!("{hash} is not the {list:?} head")));
            }
            None => {}
        }
        match links.next {
            Some(n) => {
                if self.links_mut(&n, list)?.prev != Some(hash) {
                    return Err(EngineError::CorruptList(format!("{n} does not point back to {hash}")));
                }
            }
            None if self.anchor(list).tail != Some(hash) => {
                return Err(EngineError::CorruptList(format!("{hash} is not the {list:?} tail")));
            }
            None => {}
        }

        match links.prev {
            Some(p) => self.links_mut(&p, list)?.next = links.next,
            None => self.anchor_mut(list).head = links.next,
        }
        match links.next {
            Some(n) => self.links_mut(&n, list)?.prev = links.prev,
            None => self.anchor_mut(list).tail = links.prev,
        }
        let anchor = self.anchor_mut(list);
        anchor.len = anchor.len.checked_sub(1).ok_or(EngineError::Underflow)?;
        self.entry_mut(&hash)?.membership = Membership::Rejected;
        Ok(())
    }
}
