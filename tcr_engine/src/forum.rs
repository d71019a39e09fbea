//! Forum: content-addressed posts with token-weighted upvotes.
//!
//! Boards map to the token their posts are rewarded in. A post keeps the
//! token its board had when it was created. Upvote fees are retained by
//! the forum per token until the owner collects them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::airdrop::{AirdropProgram, AirdropTarget};
use crate::arithmetic::{checked_add, checked_sub, percent_of};
use crate::contracts::ContractKind;
use crate::domain::{Address, Amount, Hash32, LedgerConstants, Timestamp};
use crate::errors::{EngineError, EngineResult};
use crate::milestone::{Milestone, MilestoneTerms};
use crate::multihash::Multihash;
use crate::token::{ledger_mut, NativeLedger, TokenLedger};

/// What a post carries beyond its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostExtension {
    Plain,
    Airdrop(AirdropTarget),
    Milestone(Milestone),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Post {
    pub board: Hash32,
    /// Zero for a top-level topic.
    pub parent: Hash32,
    pub poster: Address,
    pub token: Address,
    pub content: Multihash,
    pub post_type: Option<Hash32>,
    pub reward: Amount,
    pub reply_count: u64,
    pub reward_withdrawn: bool,
    pub extension: PostExtension,
}

/// Fields shared by every kind of post call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPost {
    pub board: Hash32,
    pub parent: Hash32,
    pub hash: Hash32,
    pub content: Multihash,
    #[serde(default)]
    pub post_type: Option<Hash32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Forum {
    pub address: Address,
    pub owner: Address,
    /// Utility token used for put-option fees.
    pub token: Address,
    pub fee_percentage: u8,
    /// board -> reward token
    pub boards: BTreeMap<Hash32, Address>,
    pub posts: BTreeMap<Hash32, Post>,
    /// board -> parent -> children in posting order
    pub threads: BTreeMap<Hash32, BTreeMap<Hash32, Vec<Hash32>>>,
    /// token -> uncollected upvote fees
    pub fees: BTreeMap<Address, Amount>,
}

impl Forum {
    pub fn new(address: Address, owner: Address, token: Address, constants: &LedgerConstants) -> Self {
        Self {
            address,
            owner,
            token,
            fee_percentage: constants.forum_fee_percentage,
            boards: BTreeMap::new(),
            posts: BTreeMap::new(),
            threads: BTreeMap::new(),
            fees: BTreeMap::new(),
        }
    }

    fn ensure_owner(&self, sender: &Address) -> EngineResult<()> {
        if *sender != self.owner {
            return Err(EngineError::NotAuthorized(format!(
                "{sender} does not own forum {}",
                self.address
            )));
        }
        Ok(())
    }

    // ── Boards ────────────────────────────────────────────────────

    pub fn add_board(&mut self, sender: &Address, board: Hash32, token: Address) -> EngineResult<()> {
        self.ensure_owner(sender)?;
        if self.boards.contains_key(&board) {
            return Err(EngineError::DuplicateEntry(board));
        }
        self.boards.insert(board, token);
        Ok(())
    }

    pub fn set_board_token(&mut self, sender: &Address, board: Hash32, token: Address) -> EngineResult<()> {
        self.ensure_owner(sender)?;
        let slot = self
            .boards
            .get_mut(&board)
            .ok_or_else(|| EngineError::NotFound(format!("board {board}")))?;
        *slot = token;
        Ok(())
    }

    pub fn board_token(&self, board: &Hash32) -> EngineResult<Address> {
        self.boards
            .get(board)
            .copied()
            .ok_or_else(|| EngineError::NotFound(format!("board {board}")))
    }

    // ── Posting ───────────────────────────────────────────────────

    pub fn post(&mut self, poster: Address, new: NewPost) -> EngineResult<()> {
        self.insert_post(poster, new, PostExtension::Plain)
    }

    /// Registers a post whose claims are delegated to an airdrop program.
    /// The program must export both selectors named by `target`.
    pub fn post_airdrop(
        &mut self,
        airdrops: &BTreeMap<Address, AirdropProgram>,
        poster: Address,
        new: NewPost,
        target: AirdropTarget,
    ) -> EngineResult<()> {
        let program = airdrops.get(&target.program).ok_or(EngineError::UnknownContract {
            address: target.program,
            expected: ContractKind::AirdropProgram,
        })?;
        for sel in [target.validate, target.execute] {
            if !program.exports(&sel) {
                return Err(EngineError::UnknownSelector {
                    selector: sel,
                    program: target.program,
                });
            }
        }
        self.insert_post(poster, new, PostExtension::Airdrop(target))
    }

    /// Registers a post backed by `value` native currency, already held
    /// by the sender.
    #[allow(clippy::too_many_arguments)]
    pub fn post_milestone(
        &mut self,
        native: &mut NativeLedger,
        tokens: &BTreeMap<Address, TokenLedger>,
        poster: Address,
        new: NewPost,
        terms: MilestoneTerms,
        value: Amount,
        now: Timestamp,
    ) -> EngineResult<()> {
        if !tokens.contains_key(&terms.token) {
            return Err(EngineError::UnknownContract {
                address: terms.token,
                expected: ContractKind::UtilityToken,
            });
        }
        let milestone = Milestone::open(terms, value, now)?;
        native.transfer(&poster, &self.address, value)?;
        self.insert_post(poster, new, PostExtension::Milestone(milestone))
    }

    fn insert_post(&mut self, poster: Address, new: NewPost, extension: PostExtension) -> EngineResult<()> {
        let NewPost {
            board,
            parent,
            hash,
            content,
            post_type,
        } = new;
        if hash.is_zero() {
            return Err(EngineError::InvalidRange(
                "the zero hash marks a top-level parent".to_string(),
            ));
        }
        if self.posts.contains_key(&hash) {
            return Err(EngineError::DuplicateEntry(hash));
        }
        let token = self.board_token(&board)?;
        if !parent.is_zero() {
            let parent_post = self
                .posts
                .get_mut(&parent)
                .ok_or_else(|| EngineError::NotFound(format!("parent post {parent}")))?;
            if parent_post.board != board {
                return Err(EngineError::InvalidRange(format!(
                    "parent {parent} is not on board {board}"
                )));
            }
            parent_post.reply_count += 1;
        }
        self.threads
            .entry(board)
            .or_default()
            .entry(parent)
            .or_default()
            .push(hash);
        self.posts.insert(
            hash,
            Post {
                board,
                parent,
                poster,
                token,
                content,
                post_type,
                reward: 0,
                reply_count: 0,
                reward_withdrawn: false,
                extension,
            },
        );
        Ok(())
    }

    pub fn update_post(&mut self, sender: &Address, hash: Hash32, content: Multihash) -> EngineResult<()> {
        let post = self.post_mut(&hash)?;
        if post.poster != *sender {
            return Err(EngineError::NotPoster(*sender));
        }
        post.content = content;
        Ok(())
    }

    // ── Rewards ───────────────────────────────────────────────────

    /// Pulls `amount` of the post's token from `payer`. Returns the fee
    /// withheld; the rest is credited to the post.
    pub fn upvote(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        payer: Address,
        hash: Hash32,
        amount: Amount,
    ) -> EngineResult<Amount> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount("upvote must be positive".to_string()));
        }
        let forum = self.address;
        let fee = percent_of(amount, self.fee_percentage)?;
        let post = self.post_mut(&hash)?;
        if post.reward_withdrawn {
            return Err(EngineError::AlreadyWithdrawn(format!("rewards of {hash}")));
        }
        let token = post.token;
        ledger_mut(tokens, &token)?.transfer_from(&forum, &payer, &forum, amount)?;
        post.reward = checked_add(post.reward, checked_sub(amount, fee)?)?;
        let collected = self.fees.entry(token).or_default();
        *collected = checked_add(*collected, fee)?;
        Ok(fee)
    }

    /// Pays the whole reward balance to the poster, once.
    pub fn withdraw(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        sender: Address,
        hash: Hash32,
    ) -> EngineResult<Amount> {
        let forum = self.address;
        let post = self.post_mut(&hash)?;
        if post.poster != sender {
            return Err(EngineError::NotPoster(sender));
        }
        if post.reward_withdrawn {
            return Err(EngineError::AlreadyWithdrawn(format!("rewards of {hash}")));
        }
        let amount = post.reward;
        ledger_mut(tokens, &post.token)?.transfer(&forum, &sender, amount)?;
        post.reward = 0;
        post.reward_withdrawn = true;
        Ok(amount)
    }

    pub fn collect_fees(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        sender: &Address,
        token: Address,
    ) -> EngineResult<Amount> {
        self.ensure_owner(sender)?;
        let amount = self.fees.get(&token).copied().unwrap_or(0);
        if amount == 0 {
            return Err(EngineError::NotWithdrawable(format!("no fees in {token}")));
        }
        ledger_mut(tokens, &token)?.transfer(&self.address, sender, amount)?;
        self.fees.remove(&token);
        Ok(amount)
    }

    // ── Airdrops ──────────────────────────────────────────────────

    fn airdrop_target(&self, hash: &Hash32) -> EngineResult<AirdropTarget> {
        match &self.get_post(hash)?.extension {
            PostExtension::Airdrop(target) => Ok(*target),
            _ => Err(EngineError::NotFound(format!("airdrop post {hash}"))),
        }
    }

    pub fn airdrop_validate(
        &self,
        airdrops: &BTreeMap<Address, AirdropProgram>,
        hash: &Hash32,
        candidate: &Address,
    ) -> EngineResult<bool> {
        let target = self.airdrop_target(hash)?;
        let program = airdrops.get(&target.program).ok_or(EngineError::UnknownContract {
            address: target.program,
            expected: ContractKind::AirdropProgram,
        })?;
        Ok(program.hook().validate(candidate))
    }

    /// Runs the post's program for `claimer` and returns the amount paid.
    pub fn airdrop_call(
        &self,
        airdrops: &mut BTreeMap<Address, AirdropProgram>,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        hash: &Hash32,
        claimer: &Address,
    ) -> EngineResult<Amount> {
        let target = self.airdrop_target(hash)?;
        let program = airdrops.get_mut(&target.program).ok_or(EngineError::UnknownContract {
            address: target.program,
            expected: ContractKind::AirdropProgram,
        })?;
        program.hook_mut().execute(tokens, claimer)
    }

    // ── Milestones ────────────────────────────────────────────────

    fn milestone_mut(&mut self, hash: &Hash32) -> EngineResult<(Address, &mut Milestone)> {
        let post = self.post_mut(hash)?;
        let poster = post.poster;
        match &mut post.extension {
            PostExtension::Milestone(m) => Ok((poster, m)),
            _ => Err(EngineError::NotFound(format!("milestone post {hash}"))),
        }
    }

    /// Charges the option fee in the utility token, paid to the poster.
    /// Returns the fee.
    pub fn purchase_put_option(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        investor: Address,
        hash: Hash32,
        amount: Amount,
        now: Timestamp,
    ) -> EngineResult<Amount> {
        let forum = self.address;
        let utility = self.token;
        let (poster, milestone) = self.milestone_mut(&hash)?;
        let fee = milestone.purchase(investor, amount, now)?;
        ledger_mut(tokens, &utility)?.transfer_from(&forum, &investor, &poster, fee)?;
        Ok(fee)
    }

    /// Swaps milestone tokens (to the poster) for native currency (to the
    /// investor). Returns the native refund.
    pub fn execute_put_option(
        &mut self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        native: &mut NativeLedger,
        investor: Address,
        hash: Hash32,
        amount: Amount,
        now: Timestamp,
    ) -> EngineResult<Amount> {
        let forum = self.address;
        let (poster, milestone) = self.milestone_mut(&hash)?;
        let refund = milestone.execute(investor, amount, now)?;
        let milestone_token = milestone.terms.token;
        ledger_mut(tokens, &milestone_token)?.transfer_from(&forum, &investor, &poster, amount)?;
        native.transfer(&forum, &investor, refund)?;
        Ok(refund)
    }

    pub fn milestone_withdraw(
        &mut self,
        native: &mut NativeLedger,
        sender: Address,
        hash: Hash32,
        now: Timestamp,
    ) -> EngineResult<Amount> {
        let forum = self.address;
        let (poster, milestone) = self.milestone_mut(&hash)?;
        if poster != sender {
            return Err(EngineError::NotPoster(sender));
        }
        let amount = milestone.release(now)?;
        native.transfer(&forum, &sender, amount)?;
        Ok(amount)
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn get_post(&self, hash: &Hash32) -> EngineResult<&Post> {
        self.posts
            .get(hash)
            .ok_or_else(|| EngineError::NotFound(format!("post {hash}")))
    }

    fn post_mut(&mut self, hash: &Hash32) -> EngineResult<&mut Post> {
        self.posts
            .get_mut(hash)
            .ok_or_else(|| EngineError::NotFound(format!("post {hash}")))
    }

    pub fn content_by_post(&self, hash: &Hash32) -> EngineResult<Multihash> {
        Ok(self.get_post(hash)?.content)
    }

    pub fn rewards(&self, hash: &Hash32) -> EngineResult<Amount> {
        Ok(self.get_post(hash)?.reward)
    }

    /// Posts directly under `parent` on `board`, in posting order.
    pub fn batch_posts_by_hashes(&self, board: &Hash32, parent: &Hash32) -> Vec<Hash32> {
        self.threads
            .get(board)
            .and_then(|t| t.get(parent))
            .cloned()
            .unwrap_or_default()
    }

    pub fn batch_contents_by_posts(&self, hashes: &[Hash32]) -> EngineResult<Vec<Multihash>> {
        hashes.iter().map(|h| self.content_by_post(h)).collect()
    }

    /// Token balance the forum must hold for `token`: unwithdrawn rewards
    /// plus uncollected fees.
    pub fn token_liability(&self, token: &Address) -> EngineResult<Amount> {
        let mut owed = self.fees.get(token).copied().unwrap_or(0);
        for post in self.posts.values().filter(|p| p.token == *token) {
            owed = checked_add(owed, post.reward)?;
        }
        Ok(owed)
    }

    /// Native currency held for live milestones.
    pub fn native_liability(&self) -> EngineResult<Amount> {
        let mut owed: Amount = 0;
        for post in self.posts.values() {
            if let PostExtension::Milestone(m) = &post.extension {
                owed = checked_add(owed, m.native_balance)?;
            }
        }
        Ok(owed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::account_address;
    use crate::multihash::SHA2_256;

    fn board(n: u64) -> Hash32 {
        Hash32::from_low_u64(0x100 + n)
    }

    fn post_hash(n: u64) -> Hash32 {
        Hash32::from_low_u64(0x200 + n)
    }

    fn content(n: u8) -> Multihash {
        Multihash::new(Hash32([n; 32]), SHA2_256, 32)
    }

    fn topic(b: Hash32, h: Hash32, c: u8) -> NewPost {
        NewPost {
            board: b,
            parent: Hash32::ZERO,
            hash: h,
            content: content(c),
            post_type: None,
        }
    }

    struct Fixture {
        forum: Forum,
        tokens: BTreeMap<Address, TokenLedger>,
        token: Address,
        root: Address,
        user1: Address,
        user2: Address,
    }

    fn fixture(fee_percentage: u8) -> Fixture {
        let root = account_address("root");
        let user1 = account_address("user1");
        let user2 = account_address("user2");
        let token = Address([1; 20]);
        let mut vtx = TokenLedger::issue(token, root, 10_000, "VetX", 18, "VTX");
        vtx.transfer(&root, &user1, 1000).unwrap();
        vtx.transfer(&root, &user2, 500).unwrap();
        let constants = LedgerConstants {
            forum_fee_percentage: fee_percentage,
            ..Default::default()
        };
        let mut forum = Forum::new(Address([2; 20]), root, token, &constants);
        forum.add_board(&root, board(1), token).unwrap();
        Fixture {
            forum,
            tokens: BTreeMap::from([(token, vtx)]),
            token,
            root,
            user1,
            user2,
        }
    }

    #[test]
    fn boards_are_owner_only() {
        let mut f = fixture(0);
        assert!(matches!(
            f.forum.add_board(&f.user1, board(2), f.token),
            Err(EngineError::NotAuthorized(_))
        ));
        assert!(matches!(
            f.forum.set_board_token(&f.user1, board(1), f.token),
            Err(EngineError::NotAuthorized(_))
        ));
        f.forum.set_board_token(&f.root, board(1), f.token).unwrap();
        assert_eq!(f.forum.board_token(&board(1)), Ok(f.token));
        assert_eq!(f.forum.add_board(&f.root, board(1), f.token), Err(EngineError::DuplicateEntry(board(1))));
    }

    #[test]
    fn update_by_poster_only() {
        let mut f = fixture(0);
        f.forum.post(f.user1, topic(board(1), post_hash(0), 0)).unwrap();
        f.forum.update_post(&f.user1, post_hash(0), content(1)).unwrap();
        assert_eq!(f.forum.content_by_post(&post_hash(0)).map(|c| c.digest), Ok(Hash32([1; 32])));
        assert_eq!(
            f.forum.update_post(&f.user2, post_hash(0), content(2)),
            Err(EngineError::NotPoster(f.user2))
        );
    }

    #[test]
    fn replies_count_and_thread_order() {
        let mut f = fixture(0);
        for n in 0..3 {
            f.forum.post(f.user1, topic(board(1), post_hash(n), n as u8)).unwrap();
        }
        let reply = NewPost {
            parent: post_hash(0),
            ..topic(board(1), post_hash(9), 9)
        };
        f.forum.post(f.user2, reply).unwrap();
        assert_eq!(
            f.forum.batch_posts_by_hashes(&board(1), &Hash32::ZERO),
            vec![post_hash(0), post_hash(1), post_hash(2)]
        );
        assert_eq!(f.forum.batch_posts_by_hashes(&board(1), &post_hash(0)), vec![post_hash(9)]);
        assert_eq!(f.forum.get_post(&post_hash(0)).unwrap().reply_count, 1);
        let contents = f
            .forum
            .batch_contents_by_posts(&[post_hash(0), post_hash(1), post_hash(2)])
            .unwrap();
        assert_eq!(contents, vec![content(0), content(1), content(2)]);
    }

    #[test]
    fn post_errors() {
        let mut f = fixture(0);
        f.forum.post(f.user1, topic(board(1), post_hash(0), 0)).unwrap();
        assert_eq!(
            f.forum.post(f.user1, topic(board(1), post_hash(0), 0)),
            Err(EngineError::DuplicateEntry(post_hash(0)))
        );
        assert!(matches!(
            f.forum.post(f.user1, topic(board(7), post_hash(1), 0)),
            Err(EngineError::NotFound(_))
        ));
        let orphan = NewPost {
            parent: post_hash(5),
            ..topic(board(1), post_hash(2), 0)
        };
        assert!(matches!(f.forum.post(f.user1, orphan), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn upvote_without_fee_credits_full_amount() {
        let mut f = fixture(0);
        f.forum.post(f.user1, topic(board(1), post_hash(0), 0)).unwrap();
        ledger_mut(&mut f.tokens, &f.token).unwrap().approve(&f.user2, &f.forum.address, 100);
        assert_eq!(f.forum.upvote(&mut f.tokens, f.user2, post_hash(0), 100), Ok(0));
        assert_eq!(f.forum.rewards(&post_hash(0)), Ok(100));
    }

    #[test]
    fn upvote_fee_is_retained_and_collectable() {
        let mut f = fixture(10);
        f.forum.post(f.user1, topic(board(1), post_hash(0), 0)).unwrap();
        ledger_mut(&mut f.tokens, &f.token).unwrap().approve(&f.user2, &f.forum.address, 100);
        assert_eq!(f.forum.upvote(&mut f.tokens, f.user2, post_hash(0), 100), Ok(10));
        assert_eq!(f.forum.rewards(&post_hash(0)), Ok(90));
        assert_eq!(f.forum.token_liability(&f.token), Ok(100));

        let before = f.tokens[&f.token].balance_of(&f.root);
        assert_eq!(f.forum.collect_fees(&mut f.tokens, &f.root, f.token), Ok(10));
        assert_eq!(f.tokens[&f.token].balance_of(&f.root), before + 10);
        assert!(f.forum.collect_fees(&mut f.tokens, &f.root, f.token).is_err());
    }

    #[test]
    fn withdraw_pays_poster_once() {
        let mut f = fixture(0);
        f.forum.post(f.user1, topic(board(1), post_hash(0), 0)).unwrap();
        ledger_mut(&mut f.tokens, &f.token).unwrap().approve(&f.user2, &f.forum.address, 100);
        f.forum.upvote(&mut f.tokens, f.user2, post_hash(0), 100).unwrap();

        assert_eq!(
            f.forum.withdraw(&mut f.tokens, f.user2, post_hash(0)),
            Err(EngineError::NotPoster(f.user2))
        );
        let before = f.tokens[&f.token].balance_of(&f.user1);
        assert_eq!(f.forum.withdraw(&mut f.tokens, f.user1, post_hash(0)), Ok(100));
        assert_eq!(f.tokens[&f.token].balance_of(&f.user1) - before, 100);
        assert_eq!(f.forum.rewards(&post_hash(0)), Ok(0));
        assert!(matches!(
            f.forum.withdraw(&mut f.tokens, f.user1, post_hash(0)),
            Err(EngineError::AlreadyWithdrawn(_))
        ));
        assert!(matches!(
            f.forum.upvote(&mut f.tokens, f.user2, post_hash(0), 1),
            Err(EngineError::AlreadyWithdrawn(_))
        ));
    }
}
