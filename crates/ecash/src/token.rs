//! Portable bearer-token codec.
//!
//! Tokens use the Cashu V3 wire format: a `cashuA` prefix followed by the
//! base64url-encoded JSON bundle `{token: [{mint, proofs}], unit, memo}`. The
//! bundle is self-describing: decoding recovers the issuing mint without
//! consulting any ledger, which is what makes cross-mint receive detection
//! possible.

use crate::canonical_mint_url;
use crate::error::{Error, Result};
use crate::proof::{proof_total, Proof};
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

/// Version prefix for the supported token serialization.
const TOKEN_PREFIX: &str = "cashuA";

/// A decoded bearer token: proofs from one mint, usable by any holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    /// Issuing mint endpoint (canonicalized)
    pub mint: String,
    /// Currency unit in minor denomination (e.g. "sat")
    pub unit: String,
    /// The bearer proofs covered by this token
    pub proofs: Vec<Proof>,
    /// Optional human-readable note carried with the token
    pub memo: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TokenEnvelope {
    token: Vec<TokenEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TokenEntry {
    mint: String,
    proofs: Vec<Proof>,
}

impl BearerToken {
    pub fn new(mint: impl Into<String>, unit: impl Into<String>, proofs: Vec<Proof>) -> Self {
        Self {
            mint: canonical_mint_url(&mint.into()),
            unit: unit.into(),
            proofs,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Total amount carried by the token.
    pub fn amount(&self) -> u64 {
        proof_total(&self.proofs)
    }

    /// Encode as a portable `cashuA...` string.
    pub fn encode(&self) -> Result<String> {
        let envelope = TokenEnvelope {
            token: vec![TokenEntry {
                mint: self.mint.clone(),
                proofs: self.proofs.clone(),
            }],
            unit: Some(self.unit.clone()),
            memo: self.memo.clone(),
        };
        let json = serde_json::to_vec(&envelope)?;
        Ok(format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(json)))
    }

    /// Decode a `cashuA...` string. Fails with [`Error::MalformedToken`] on
    /// any structural problem; never depends on ledger state.
    pub fn decode(encoded: &str) -> Result<Self> {
        let body = encoded
            .trim()
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| Error::MalformedToken("missing cashuA prefix".into()))?;

        // Emitters disagree on padding; accept both.
        let bytes = URL_SAFE_NO_PAD
            .decode(body)
            .or_else(|_| URL_SAFE.decode(body))
            .map_err(|e| Error::MalformedToken(format!("invalid base64: {}", e)))?;

        let envelope: TokenEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| Error::MalformedToken(format!("invalid token body: {}", e)))?;

        let mut entries = envelope.token.into_iter();
        let first = entries
            .next()
            .ok_or_else(|| Error::MalformedToken("token carries no mint entry".into()))?;

        let mint = canonical_mint_url(&first.mint);
        let mut proofs = first.proofs;
        for entry in entries {
            if canonical_mint_url(&entry.mint) != mint {
                return Err(Error::MalformedToken(
                    "multi-mint tokens are not supported".into(),
                ));
            }
            proofs.extend(entry.proofs);
        }

        if proofs.is_empty() {
            return Err(Error::MalformedToken("token carries no proofs".into()));
        }

        Ok(Self {
            mint,
            unit: envelope.unit.unwrap_or_else(|| "sat".to_string()),
            proofs,
            memo: envelope.memo,
        })
    }
}
