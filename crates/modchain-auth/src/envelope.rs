//! The signed envelope carried alongside an authenticated request.

use serde::{Deserialize, Serialize};

use modchain_core::{Address, Ed25519Signature};

use crate::error::Result;

/// A signed, timestamped claim over a payload hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Hash of the payload (hex Blake3, or the payload itself in identity mode).
    pub data_hash: String,
    /// Signing time (Unix milliseconds).
    pub time: i64,
    /// Caller-declared cost of the request.
    pub cost: u64,
    /// Signer address.
    pub key: Address,
    /// Signature over [`Envelope::signing_bytes`].
    pub signature: Ed25519Signature,
}

/// The signed subset. Field order is part of the wire format.
#[derive(Serialize)]
struct SignedFields<'a> {
    data_hash: &'a str,
    time: i64,
    cost: u64,
}

impl Envelope {
    /// Compact JSON of `{data_hash, time, cost}`, in that order.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        signing_bytes(&self.data_hash, self.time, self.cost)
    }

    /// Serialize for transport (e.g. a request header).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from transport form.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

pub(crate) fn signing_bytes(data_hash: &str, time: i64, cost: u64) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&SignedFields {
        data_hash,
        time,
        cost,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_bytes_field_order() {
        let bytes = signing_bytes("ab", 5, 1).unwrap();
        assert_eq!(bytes, br#"{"data_hash":"ab","time":5,"cost":1}"#);
    }

    #[test]
    fn test_json_rejects_garbage() {
        assert!(Envelope::from_json("{}").is_err());
        assert!(Envelope::from_json("not json").is_err());
    }
}
