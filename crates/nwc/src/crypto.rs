//! Payload encryption for the wallet-connect channel.
//!
//! Both sides derive the same conversation key from an ECDH exchange and
//! wrap payloads with XChaCha20-Poly1305 under a fresh random nonce. The
//! wire form is base64(nonce || ciphertext).

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{PublicKey, Scalar, SecretKey};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;

/// XChaCha20 extended nonce length in bytes.
pub const NONCE_SIZE: usize = 24;

/// Derive the shared conversation key for a secret key and an x-only remote
/// public key.
///
/// The remote key is lifted with an even-parity prefix; the x coordinate of
/// the shared point is the same for either lift, so both parties agree on
/// the key without exchanging parity.
pub fn conversation_key(secret: &[u8; 32], remote_xonly: &[u8; 32]) -> Result<[u8; 32]> {
    let secp = Secp256k1::new();

    SecretKey::from_slice(secret).map_err(|e| Error::Crypto(e.to_string()))?;
    let scalar = Scalar::from_be_bytes(*secret).map_err(|e| Error::Crypto(e.to_string()))?;

    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(remote_xonly);
    let remote = PublicKey::from_slice(&compressed).map_err(|e| Error::Crypto(e.to_string()))?;

    let shared = remote
        .mul_tweak(&secp, &scalar)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    let shared_x = &shared.serialize()[1..33];

    let hash = sha256::Hash::hash(shared_x);
    Ok(*hash.as_byte_array())
}

/// Encrypt a payload under a conversation key.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| Error::Crypto("encryption failed".to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

/// Decrypt a payload produced by [`encrypt`] with the same conversation key.
pub fn decrypt(key: &[u8; 32], payload: &str) -> Result<String> {
    let combined = STANDARD
        .decode(payload)
        .map_err(|_| Error::Crypto("invalid base64 payload".to_string()))?;
    if combined.len() < NONCE_SIZE + 16 {
        return Err(Error::Crypto("payload too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;
    let nonce = XNonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::Crypto("decryption failed".to_string()))?;
    String::from_utf8(plaintext).map_err(|_| Error::Crypto("invalid utf-8 plaintext".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;

    #[test]
    fn both_parties_derive_the_same_key() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let a = conversation_key(alice.secret_bytes(), bob.public_key()).unwrap();
        let b = conversation_key(bob.secret_bytes(), alice.public_key()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_peers_derive_different_keys() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let carol = Keypair::generate();

        let ab = conversation_key(alice.secret_bytes(), bob.public_key()).unwrap();
        let ac = conversation_key(alice.secret_bytes(), carol.public_key()).unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = [42u8; 32];
        let plaintext = r#"{"method":"get_balance","params":{}}"#;
        let payload = encrypt(&key, plaintext).unwrap();
        assert_ne!(payload, plaintext);
        assert_eq!(decrypt(&key, &payload).unwrap(), plaintext);
    }

    #[test]
    fn nonces_are_fresh() {
        let key = [7u8; 32];
        let a = encrypt(&key, "same").unwrap();
        let b = encrypt(&key, "same").unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&key, &a).unwrap(), "same");
        assert_eq!(decrypt(&key, &b).unwrap(), "same");
    }

    #[test]
    fn wrong_key_fails() {
        let payload = encrypt(&[1u8; 32], "secret").unwrap();
        assert!(matches!(
            decrypt(&[2u8; 32], &payload),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn garbage_payload_fails() {
        assert!(decrypt(&[1u8; 32], "not base64 !!").is_err());
        assert!(decrypt(&[1u8; 32], "aGVsbG8=").is_err());
    }
}
