//! Minimal signed-event layer.
//!
//! Only what the correlated RPC channel needs: build, sign and verify an
//! event, hash its id, and read tags. General relay-protocol validation is
//! out of scope here.

use crate::error::{Error, Result};
use bitcoin::hashes::{sha256, Hash};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{schnorr, Message, SecretKey, XOnlyPublicKey};
use serde::{Deserialize, Serialize};

/// A signed event as carried over the relay protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Lowercase hex sha256 of the serialized event data
    pub id: String,
    /// Lowercase hex x-only public key of the creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Array of arrays of strings
    pub tags: Vec<Vec<String>>,
    /// Payload (encrypted for wallet-connect kinds)
    pub content: String,
    /// Lowercase hex schnorr signature
    pub sig: String,
}

/// An event before signing; the pubkey comes from the signing key.
#[derive(Debug, Clone)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl Event {
    /// First value of the named tag, if present.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }
}

fn hash_fields(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String> {
    // NIP-01 serialization: [0, pubkey, created_at, kind, tags, content]
    let serialized = serde_json::to_string(&serde_json::json!([
        0, pubkey, created_at, kind, tags, content
    ]))?;
    let hash = sha256::Hash::hash(serialized.as_bytes());
    Ok(hex::encode(hash.as_byte_array()))
}

/// Sign a template with a secret key, producing a complete signed event.
pub fn finalize_event(template: &EventTemplate, secret_key: &[u8; 32]) -> Result<Event> {
    let secp = Secp256k1::new();

    let sk = SecretKey::from_slice(secret_key).map_err(|e| Error::Signing(e.to_string()))?;
    let (xonly, _parity) = sk.x_only_public_key(&secp);
    let pubkey = hex::encode(xonly.serialize());

    let id = hash_fields(
        &pubkey,
        template.created_at,
        template.kind,
        &template.tags,
        &template.content,
    )?;

    let id_bytes = hex::decode(&id).map_err(|e| Error::Signing(e.to_string()))?;
    let message = Message::from_digest_slice(&id_bytes).map_err(|e| Error::Signing(e.to_string()))?;
    let keypair = bitcoin::secp256k1::Keypair::from_secret_key(&secp, &sk);
    let sig = secp.sign_schnorr_no_aux_rand(&message, &keypair);

    Ok(Event {
        id,
        pubkey,
        created_at: template.created_at,
        kind: template.kind,
        tags: template.tags.clone(),
        content: template.content.clone(),
        sig: hex::encode(sig.serialize()),
    })
}

/// Verify an event's id and schnorr signature.
pub fn verify_event(event: &Event) -> Result<bool> {
    let computed = hash_fields(
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    )?;
    if computed != event.id {
        return Ok(false);
    }

    let secp = Secp256k1::verification_only();
    let id_bytes = hex::decode(&event.id).map_err(|e| Error::Signing(e.to_string()))?;
    let message =
        Message::from_digest_slice(&id_bytes).map_err(|e| Error::Signing(e.to_string()))?;
    let sig_bytes = hex::decode(&event.sig).map_err(|e| Error::Signing(e.to_string()))?;
    let sig =
        schnorr::Signature::from_slice(&sig_bytes).map_err(|e| Error::Signing(e.to_string()))?;
    let pubkey_bytes = hex::decode(&event.pubkey).map_err(|e| Error::Signing(e.to_string()))?;
    let pubkey =
        XOnlyPublicKey::from_slice(&pubkey_bytes).map_err(|e| Error::Signing(e.to_string()))?;

    Ok(secp.verify_schnorr(&sig, &message, &pubkey).is_ok())
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> [u8; 32] {
        let mut key = [1u8; 32];
        key[31] = 7;
        key
    }

    fn template() -> EventTemplate {
        EventTemplate {
            created_at: 1_700_000_000,
            kind: 23194,
            tags: vec![vec!["p".to_string(), "ab".repeat(32)]],
            content: "payload".to_string(),
        }
    }

    #[test]
    fn sign_and_verify() {
        let event = finalize_event(&template(), &secret()).unwrap();
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.pubkey.len(), 64);
        assert_eq!(event.sig.len(), 128);
        assert!(verify_event(&event).unwrap());
    }

    #[test]
    fn hash_is_deterministic() {
        let a = finalize_event(&template(), &secret()).unwrap();
        let b = finalize_event(&template(), &secret()).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn tampered_content_fails_verification() {
        let mut event = finalize_event(&template(), &secret()).unwrap();
        event.content = "other".to_string();
        assert!(!verify_event(&event).unwrap());
    }

    #[test]
    fn tampered_sig_fails_verification() {
        let mut event = finalize_event(&template(), &secret()).unwrap();
        event.sig = "00".repeat(64);
        assert!(!verify_event(&event).unwrap());
    }

    #[test]
    fn tag_value_lookup() {
        let mut tpl = template();
        tpl.tags.push(vec!["e".to_string(), "req-id".to_string()]);
        let event = finalize_event(&tpl, &secret()).unwrap();
        assert_eq!(event.tag_value("e"), Some("req-id"));
        assert_eq!(event.tag_value("p"), Some("ab".repeat(32).as_str()));
        assert_eq!(event.tag_value("x"), None);
    }

    #[test]
    fn serde_round_trip() {
        let event = finalize_event(&template(), &secret()).unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
