//! Hand-written protobuf types for the transaction log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! The call itself travels as its JSON encoding, guarded by a SHA-256
//! digest, so adding a call kind never changes the frame schema.

use prost::Message;

// ── Transaction frame ──────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoTransaction {
    #[prost(uint32, tag = "1")]
    pub schema_version: u32,
    #[prost(uint64, tag = "2")]
    pub sequence: u64,
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    /// 20-byte sender address.
    #[prost(bytes = "vec", tag = "4")]
    pub sender: Vec<u8>,
    /// Attached native value as a 16-byte big-endian integer. Empty
    /// means zero.
    #[prost(bytes = "vec", tag = "5")]
    pub value: Vec<u8>,
    #[prost(message, optional, tag = "6")]
    pub call: Option<ProtoCall>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoCall {
    /// Method name, for inspection without decoding the payload.
    #[prost(string, tag = "1")]
    pub method: String,
    /// JSON encoding of the call.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    /// SHA-256 of `payload`.
    #[prost(bytes = "vec", tag = "3")]
    pub digest: Vec<u8>,
}
