//! Forum post listings with content in its base-58 multihash form.

use serde::Serialize;

use tcr_engine::multihash::Multihash;
use tcr_engine::{Address, Amount, Hash32, LedgerState};

use crate::errors::RuntimeResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostListing {
    pub forum: Address,
    pub hash: Hash32,
    pub board: Hash32,
    pub parent: Hash32,
    pub poster: Address,
    /// `None` when the post carries an empty digest.
    pub content: Option<String>,
    pub reward: Amount,
}

/// Every post across all forums, in forum then post order.
pub fn list_posts(state: &LedgerState) -> Vec<PostListing> {
    state
        .forums
        .iter()
        .flat_map(|(forum, f)| {
            f.posts.iter().map(move |(hash, post)| PostListing {
                forum: *forum,
                hash: *hash,
                board: post.board,
                parent: post.parent,
                poster: post.poster,
                content: post.content.to_base58(),
                reward: post.reward,
            })
        })
        .collect()
}

/// Posts whose content matches the base-58 multihash `encoded`.
pub fn find_by_content(state: &LedgerState, encoded: &str) -> RuntimeResult<Vec<PostListing>> {
    let wanted = Multihash::from_base58(encoded)?;
    let wanted = wanted.to_base58();
    Ok(list_posts(state)
        .into_iter()
        .filter(|p| p.content == wanted)
        .collect())
}
