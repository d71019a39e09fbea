//! Proto ↔ engine conversion bridge.
//!
//! Converts between the protobuf frame (proto_types.rs) and the engine's
//! `Transaction`. Decoding checks the sender width, the value width and
//! the payload digest before the call JSON is parsed.

use sha2::{Digest, Sha256};

use tcr_engine::{Address, Call, Transaction};

use crate::errors::{RuntimeError, RuntimeResult};
use crate::proto_types::{ProtoCall, ProtoTransaction};

/// Engine transaction → protobuf frame.
pub fn transaction_to_proto(tx: &Transaction) -> RuntimeResult<ProtoTransaction> {
    let payload = serde_json::to_vec(&tx.call)?;
    let digest = Sha256::digest(&payload).to_vec();
    let value = if tx.value == 0 {
        Vec::new()
    } else {
        tx.value.to_be_bytes().to_vec()
    };
    Ok(ProtoTransaction {
        schema_version: tx.schema_version,
        sequence: tx.sequence,
        timestamp: tx.timestamp,
        sender: tx.sender.as_bytes().to_vec(),
        value,
        call: Some(ProtoCall {
            method: tx.call.method().to_string(),
            payload,
            digest,
        }),
    })
}

/// Protobuf frame → engine transaction.
pub fn proto_to_transaction(proto: &ProtoTransaction) -> RuntimeResult<Transaction> {
    let sender = Address::from_slice(&proto.sender).ok_or_else(|| {
        RuntimeError::Frame(format!(
            "sequence {}: sender has {} bytes",
            proto.sequence,
            proto.sender.len()
        ))
    })?;

    let value = match proto.value.len() {
        0 => 0,
        16 => {
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&proto.value);
            u128::from_be_bytes(buf)
        }
        n => {
            return Err(RuntimeError::Frame(format!(
                "sequence {}: value has {n} bytes",
                proto.sequence
            )))
        }
    };

    let call = proto
        .call
        .as_ref()
        .ok_or_else(|| RuntimeError::Frame(format!("sequence {}: no call", proto.sequence)))?;
    if Sha256::digest(&call.payload).as_slice() != call.digest.as_slice() {
        return Err(RuntimeError::Frame(format!(
            "sequence {}: payload digest mismatch",
            proto.sequence
        )));
    }
    let decoded: Call = serde_json::from_slice(&call.payload)?;
    if decoded.method() != call.method {
        return Err(RuntimeError::Frame(format!(
            "sequence {}: frame says {} but payload is {}",
            proto.sequence,
            call.method,
            decoded.method()
        )));
    }

    Ok(Transaction {
        schema_version: proto.schema_version,
        sequence: proto.sequence,
        timestamp: proto.timestamp,
        sender,
        value,
        call: decoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcr_engine::domain::Hash32;
    use tcr_engine::forum::NewPost;
    use tcr_engine::milestone::MilestoneTerms;
    use tcr_engine::multihash::Multihash;

    fn milestone_tx() -> Transaction {
        let forum = Address([7; 20]);
        Transaction::new(
            12,
            3_600,
            Address([1; 20]),
            Call::PostMilestone {
                forum,
                post: NewPost {
                    board: Hash32::from_low_u64(1),
                    parent: Hash32::ZERO,
                    hash: Hash32::from_low_u64(2),
                    content: Multihash::sha2_256(Hash32::from_low_u64(3)),
                    post_type: None,
                },
                terms: MilestoneTerms {
                    token: Address([8; 20]),
                    price: 10,
                    end_time: 7_200,
                    fee_rate: 2,
                    rate_gt_one: true,
                },
            },
        )
        .with_value(u128::MAX - 1)
    }

    #[test]
    fn frame_carries_the_whole_transaction() {
        let tx = milestone_tx();
        let proto = transaction_to_proto(&tx).unwrap();
        assert_eq!(proto.call.as_ref().map(|c| c.method.as_str()), Some("post_milestone"));
        assert_eq!(proto_to_transaction(&proto).unwrap(), tx);
    }

    #[test]
    fn zero_value_is_omitted() {
        let tx = Transaction::new(
            1,
            0,
            Address([1; 20]),
            Call::DeployLibrary {
                name: "SafeMath".to_string(),
            },
        );
        let proto = transaction_to_proto(&tx).unwrap();
        assert!(proto.value.is_empty());
        assert_eq!(proto_to_transaction(&proto).unwrap().value, 0);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let mut proto = transaction_to_proto(&milestone_tx()).unwrap();
        if let Some(call) = proto.call.as_mut() {
            call.payload.push(b' ');
        }
        assert!(matches!(proto_to_transaction(&proto), Err(RuntimeError::Frame(_))));
    }

    #[test]
    fn short_sender_is_rejected() {
        let mut proto = transaction_to_proto(&milestone_tx()).unwrap();
        proto.sender.pop();
        assert!(matches!(proto_to_transaction(&proto), Err(RuntimeError::Frame(_))));
    }
}
