//! Bearer proof type.
//!
//! A proof is a fixed-amount bearer secret plus the mint's signature material.
//! The signature material is opaque to the wallet: producing and checking it is
//! the mint's side of the published proof protocol.

use serde::{Deserialize, Serialize};

/// A single bearer proof, redeemable once at its issuing mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Amount in the unit's minor denomination
    pub amount: u64,
    /// Unique bearer identifier; the dedup key within one mint's stored set
    pub secret: String,
    /// Opaque signature material issued by the mint
    #[serde(rename = "C")]
    pub c: String,
    /// Keyset the proof was signed under
    #[serde(rename = "id")]
    pub keyset_id: String,
}

impl Proof {
    pub fn new(
        amount: u64,
        secret: impl Into<String>,
        c: impl Into<String>,
        keyset_id: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            secret: secret.into(),
            c: c.into(),
            keyset_id: keyset_id.into(),
        }
    }
}

/// Sum of amounts over a proof set.
pub fn proof_total(proofs: &[Proof]) -> u64 {
    proofs.iter().map(|p| p.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_sums_amounts() {
        let proofs = vec![
            Proof::new(1, "s1", "c1", "k1"),
            Proof::new(2, "s2", "c2", "k1"),
            Proof::new(8, "s3", "c3", "k1"),
        ];
        assert_eq!(proof_total(&proofs), 11);
        assert_eq!(proof_total(&[]), 0);
    }

    #[test]
    fn serde_uses_protocol_field_names() {
        let proof = Proof::new(64, "secret-bytes", "02abcdef", "009a1f29");
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["C"], "02abcdef");
        assert_eq!(json["id"], "009a1f29");
        assert_eq!(json["amount"], 64);

        let back: Proof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }
}
