//! Wallet-connect pairing URIs.
//!
//! A pairing string carries everything the client needs to reach a remote
//! wallet service: its public key, one or more relay endpoints, and the
//! client-side secret for the encrypted channel.

use crate::error::{Error, Result};
use crate::keys::{decode_public_key, Keypair};
use url::Url;

/// URI scheme for wallet-connect pairing strings.
pub const WALLET_CONNECT_SCHEME: &str = "nostr+walletconnect";

/// Parsed pairing URI.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    raw: String,
    remote_pubkey: [u8; 32],
    remote_pubkey_hex: String,
    relays: Vec<Url>,
    keypair: Keypair,
    label: Option<String>,
    lud16: Option<String>,
}

impl ConnectionDescriptor {
    /// Parse a `nostr+walletconnect://` pairing string.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri.trim())?;
        if url.scheme() != WALLET_CONNECT_SCHEME {
            return Err(Error::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidWalletIdentity("no identity in URI".to_string()))?;
        let remote_pubkey =
            decode_public_key(host).map_err(|e| Error::InvalidWalletIdentity(e.to_string()))?;
        let remote_pubkey_hex = hex::encode(remote_pubkey);

        let mut relays = Vec::new();
        let mut secret = None;
        let mut label = None;
        let mut lud16 = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay" => {
                    let relay = parse_relay_url(&value)?;
                    if !relays.contains(&relay) {
                        relays.push(relay);
                    }
                }
                "secret" => secret = Some(value.to_string()),
                "label" | "name" => label = Some(value.to_string()),
                "lud16" => lud16 = Some(value.to_string()),
                _ => {}
            }
        }

        if relays.is_empty() {
            return Err(Error::MissingRelay);
        }
        let secret = secret.ok_or_else(|| Error::MissingSecret("no secret parameter".to_string()))?;
        let keypair =
            Keypair::from_secret_hex(&secret).map_err(|e| Error::MissingSecret(e.to_string()))?;

        Ok(Self {
            raw: uri.trim().to_string(),
            remote_pubkey,
            remote_pubkey_hex,
            relays,
            keypair,
            label,
            lud16,
        })
    }

    /// The original pairing string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// X-only public key of the remote wallet service.
    pub fn remote_pubkey(&self) -> &[u8; 32] {
        &self.remote_pubkey
    }

    /// Remote wallet public key as lowercase hex.
    pub fn remote_pubkey_hex(&self) -> &str {
        &self.remote_pubkey_hex
    }

    /// Relay endpoints in the order listed in the URI, deduplicated.
    pub fn relays(&self) -> &[Url] {
        &self.relays
    }

    /// Client-side keypair derived from the URI secret.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Optional human-readable connection label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Optional lightning address attached to the connection.
    pub fn lud16(&self) -> Option<&str> {
        self.lud16.as_deref()
    }
}

fn parse_relay_url(value: &str) -> Result<Url> {
    let mut relay = Url::parse(value)?;
    match relay.scheme() {
        "ws" | "wss" => {}
        other => return Err(Error::InvalidUrl(format!("relay scheme {other}"))),
    }
    relay.set_fragment(None);
    Ok(relay)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "b889ff5b1513b641e2a139f661a661364979c5beee91842f8f0ef42ab558e9d4";
    const SECRET: &str = "71a8c14c1407c113601079c4302dab36460f0ccd0ad506f1f2dc73b5100e4f3c";

    fn uri(extra: &str) -> String {
        format!(
            "nostr+walletconnect://{PUBKEY}?relay=wss%3A%2F%2Frelay.example.com&secret={SECRET}{extra}"
        )
    }

    #[test]
    fn parses_a_full_uri() {
        let desc = ConnectionDescriptor::parse(&uri("&lud16=pay%40example.com&label=savings"))
            .unwrap();
        assert_eq!(desc.remote_pubkey_hex(), PUBKEY);
        assert_eq!(desc.relays().len(), 1);
        assert_eq!(desc.relays()[0].as_str(), "wss://relay.example.com/");
        assert_eq!(desc.lud16(), Some("pay@example.com"));
        assert_eq!(desc.label(), Some("savings"));
        assert_eq!(hex::encode(desc.keypair().secret_bytes()), SECRET);
    }

    #[test]
    fn accepts_npub_identity() {
        let keypair = Keypair::from_secret_hex(SECRET).unwrap();
        let uri = format!(
            "nostr+walletconnect://{}?relay=wss%3A%2F%2Fr.example.com&secret={SECRET}",
            keypair.npub().unwrap()
        );
        let desc = ConnectionDescriptor::parse(&uri).unwrap();
        assert_eq!(desc.remote_pubkey(), keypair.public_key());
    }

    #[test]
    fn preserves_relay_order_and_dedups() {
        let uri = format!(
            "nostr+walletconnect://{PUBKEY}?relay=wss%3A%2F%2Fa.example.com&relay=wss%3A%2F%2Fb.example.com&relay=wss%3A%2F%2Fa.example.com&secret={SECRET}"
        );
        let desc = ConnectionDescriptor::parse(&uri).unwrap();
        let relays: Vec<&str> = desc.relays().iter().map(Url::as_str).collect();
        assert_eq!(relays, vec!["wss://a.example.com/", "wss://b.example.com/"]);
    }

    #[test]
    fn rejects_wrong_scheme() {
        let err = ConnectionDescriptor::parse(&format!(
            "http://{PUBKEY}?relay=wss%3A%2F%2Fr.example.com&secret={SECRET}"
        ))
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
    }

    #[test]
    fn rejects_missing_relay() {
        let err = ConnectionDescriptor::parse(&format!(
            "nostr+walletconnect://{PUBKEY}?secret={SECRET}"
        ))
        .unwrap_err();
        assert!(matches!(err, Error::MissingRelay));
    }

    #[test]
    fn rejects_missing_secret() {
        let err = ConnectionDescriptor::parse(&format!(
            "nostr+walletconnect://{PUBKEY}?relay=wss%3A%2F%2Fr.example.com"
        ))
        .unwrap_err();
        assert!(matches!(err, Error::MissingSecret(_)));
    }

    #[test]
    fn rejects_malformed_secret() {
        let err = ConnectionDescriptor::parse(&format!(
            "nostr+walletconnect://{PUBKEY}?relay=wss%3A%2F%2Fr.example.com&secret=zzzz"
        ))
        .unwrap_err();
        assert!(matches!(err, Error::MissingSecret(_)));
    }

    #[test]
    fn rejects_bad_identity() {
        let err = ConnectionDescriptor::parse(&format!(
            "nostr+walletconnect://nonsense?relay=wss%3A%2F%2Fr.example.com&secret={SECRET}"
        ))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidWalletIdentity(_)));
    }

    #[test]
    fn rejects_non_websocket_relay() {
        let err = ConnectionDescriptor::parse(&format!(
            "nostr+walletconnect://{PUBKEY}?relay=https%3A%2F%2Fr.example.com&secret={SECRET}"
        ))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
