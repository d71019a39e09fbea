//! Capability identifiers and function selectors.
//!
//! Both are pure functions of a fixed ASCII string, so the same logical
//! system yields the same identifiers on every deployment.

use sha2::{Digest, Sha256};

use crate::domain::{CapabilityId, Selector};

pub const ROOT: &str = "Root";
pub const ACL_HANDLER: &str = "ACLHandler";
pub const CONTRACT_ADDRESS_HANDLER: &str = "ContractAddressHandler";
pub const REPUTATION_EXCHANGE: &str = "ReputationExchange";
pub const REGISTRY: &str = "Registry";
pub const FORUM: &str = "Forum";

/// Canonical signature gated by the reputation exchange.
pub const BATCH_EXCHANGE_SIGNATURE: &str = "batchExchange(address[],uint[])";

/// SHA-256 of the name.
pub fn derive_identifier(name: &str) -> CapabilityId {
    CapabilityId(Sha256::digest(name.as_bytes()).into())
}

/// First four bytes of the SHA-256 of a canonical signature such as
/// `batchExchange(address[],uint[])`.
pub fn selector(signature: &str) -> Selector {
    let digest = Sha256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    Selector(out)
}

pub fn root_id() -> CapabilityId {
    derive_identifier(ROOT)
}

pub fn acl_handler_id() -> CapabilityId {
    derive_identifier(ACL_HANDLER)
}

pub fn contract_address_handler_id() -> CapabilityId {
    derive_identifier(CONTRACT_ADDRESS_HANDLER)
}

pub fn reputation_exchange_id() -> CapabilityId {
    derive_identifier(REPUTATION_EXCHANGE)
}

pub fn registry_id() -> CapabilityId {
    derive_identifier(REGISTRY)
}

pub fn forum_id() -> CapabilityId {
    derive_identifier(FORUM)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn identifiers_are_deterministic() {
        assert_eq!(derive_identifier("ACLHandler"), derive_identifier("ACLHandler"));
        assert_eq!(acl_handler_id(), derive_identifier(ACL_HANDLER));
    }

    #[test]
    fn module_names_do_not_collide() {
        let names = [
            ROOT,
            ACL_HANDLER,
            CONTRACT_ADDRESS_HANDLER,
            REPUTATION_EXCHANGE,
            REGISTRY,
            FORUM,
        ];
        let ids: BTreeSet<_> = names.iter().map(|n| derive_identifier(n)).collect();
        assert_eq!(ids.len(), names.len());
    }

    #[test]
    fn selector_is_digest_prefix() {
        let s = selector(BATCH_EXCHANGE_SIGNATURE);
        let digest = Sha256::digest(BATCH_EXCHANGE_SIGNATURE.as_bytes());
        assert_eq!(&s.0[..], &digest[..4]);
        assert_ne!(s, selector("purchaseReputation(address,uint256)"));
    }
}
