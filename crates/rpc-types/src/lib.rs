//! DTOs for the overlay API façade.  The façade itself lives outside this
//! workspace; these types pin down the message contract it relays.

use serde::{Deserialize, Serialize};
use tapnet_primitives::buf::Buf32;

/// Submission of raw transaction bytes (or a PSBT) for broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastTxRequest {
    #[serde(with = "hex_bytes")]
    pub raw: Vec<u8>,
    pub psbt: bool,
    pub id: Option<Buf32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastTxResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,

    /// Human-readable failure description; never a stack trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub finalized_transaction: bool,

    /// Chain-assigned txid once accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Buf32>,
}

impl BroadcastTxResponse {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_type: None,
            error: Some(reason.into()),
            finalized_transaction: false,
            identifier: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurrentIndexerBlock {
    pub block_number: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidateBlockHeadersRequest {
    pub block_number: u64,
    pub checksum_root: Buf32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidateBlockHeadersResponse {
    pub has_stored_header: bool,
    pub has_valid_proofs: bool,
}

/// Recommended fee rates in sat/vB.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MempoolFees {
    pub conservative: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

mod hex_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_request_roundtrip() {
        let req = BroadcastTxRequest {
            raw: vec![0xde, 0xad],
            psbt: false,
            id: None,
        };
        let s = serde_json::to_string(&req).unwrap();
        assert!(s.contains("\"dead\""));
        let back: BroadcastTxRequest = serde_json::from_str(&s).unwrap();
        assert_eq!(back.raw, vec![0xde, 0xad]);
    }

    #[test]
    fn test_rejection_shape() {
        let resp = BroadcastTxResponse::rejected("too large");
        let s = serde_json::to_string(&resp).unwrap();
        assert!(s.contains("too large"));
        assert!(!s.contains("transaction_type"));
    }
}
