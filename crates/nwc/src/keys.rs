//! Key material for the two RPC parties.
//!
//! Identities are secp256k1 x-only public keys, written either as 64 hex
//! characters or bech32 (`npub...`). Local keys derive their public half
//! deterministically from the 32-byte secret.

use crate::error::{Error, Result};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::SecretKey;
use rand::RngCore;

/// Human-readable part for bech32-encoded public keys
const NPUB_HRP: &str = "npub";

/// A local keypair: 32-byte secret plus derived x-only public key.
#[derive(Clone)]
pub struct Keypair {
    secret: [u8; 32],
    public: [u8; 32],
}

impl Keypair {
    /// Derive a keypair from secret bytes.
    pub fn from_secret_bytes(secret: [u8; 32]) -> Result<Self> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&secret).map_err(|e| Error::InvalidKey(e.to_string()))?;
        let (xonly, _parity) = sk.x_only_public_key(&secp);
        Ok(Self {
            secret,
            public: xonly.serialize(),
        })
    }

    /// Derive a keypair from a 64-character hex secret.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex).map_err(|e| Error::InvalidKey(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKey("secret must be 32 bytes".into()))?;
        Self::from_secret_bytes(secret)
    }

    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        loop {
            let mut secret = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            // Rejection-sample the negligible out-of-range case.
            if let Ok(keypair) = Self::from_secret_bytes(secret) {
                return keypair;
            }
        }
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public)
    }

    pub fn npub(&self) -> Result<String> {
        encode_npub(&self.public)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_key_hex())
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// Encode a 32-byte public key as an npub bech32 string.
pub fn encode_npub(public_key: &[u8; 32]) -> Result<String> {
    use bech32::{Bech32, Hrp};
    let hrp = Hrp::parse(NPUB_HRP).map_err(|e| Error::InvalidKey(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, public_key).map_err(|e| Error::InvalidKey(e.to_string()))
}

/// Decode a public key from either 64 hex characters or an npub string.
pub fn decode_public_key(identity: &str) -> Result<[u8; 32]> {
    if identity.len() == 64 && identity.chars().all(|c| c.is_ascii_hexdigit()) {
        let bytes = hex::decode(identity).map_err(|e| Error::InvalidKey(e.to_string()))?;
        return bytes
            .try_into()
            .map_err(|_| Error::InvalidKey("public key must be 32 bytes".into()));
    }

    let (hrp, data) = bech32::decode(identity).map_err(|e| Error::InvalidKey(e.to_string()))?;
    if hrp.as_str() != NPUB_HRP {
        return Err(Error::InvalidKey(format!(
            "expected hrp {}, got {}",
            NPUB_HRP,
            hrp.as_str()
        )));
    }
    data.try_into()
        .map_err(|_| Error::InvalidKey("npub payload must be 32 bytes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "d217c1ff2f8a65c3e3a1740db3b9f58b8c848bb45e26d00ed4714e4a0f4ceecf";

    #[test]
    fn derives_public_key_deterministically() {
        let a = Keypair::from_secret_hex(TEST_SECRET).unwrap();
        let b = Keypair::from_secret_hex(TEST_SECRET).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.public_key_hex().len(), 64);
    }

    #[test]
    fn npub_round_trip() {
        let keypair = Keypair::from_secret_hex(TEST_SECRET).unwrap();
        let npub = keypair.npub().unwrap();
        assert!(npub.starts_with("npub1"));
        assert_eq!(&decode_public_key(&npub).unwrap(), keypair.public_key());
    }

    #[test]
    fn hex_identity_round_trip() {
        let keypair = Keypair::from_secret_hex(TEST_SECRET).unwrap();
        let decoded = decode_public_key(&keypair.public_key_hex()).unwrap();
        assert_eq!(&decoded, keypair.public_key());
    }

    #[test]
    fn rejects_short_hex_secret() {
        assert!(matches!(
            Keypair::from_secret_hex("abcd"),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_wrong_hrp() {
        let keypair = Keypair::from_secret_hex(TEST_SECRET).unwrap();
        use bech32::{Bech32, Hrp};
        let nsec = bech32::encode::<Bech32>(Hrp::parse("nsec").unwrap(), keypair.secret_bytes())
            .unwrap();
        assert!(matches!(decode_public_key(&nsec), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn rejects_garbage_identity() {
        assert!(decode_public_key("not-a-key").is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let keypair = Keypair::generate();
        let debug = format!("{:?}", keypair);
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains(&hex::encode(keypair.secret_bytes())));
    }

    #[test]
    fn generate_produces_distinct_keys() {
        assert_ne!(Keypair::generate().public_key(), Keypair::generate().public_key());
    }
}
