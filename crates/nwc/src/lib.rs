//! Encrypted wallet-connect RPC client.
//!
//! Parses `nostr+walletconnect://` pairing strings and drives remote
//! lightning wallet calls over relays: each request is a signed, encrypted
//! event, and the matching response is located by sender and correlation
//! tag. Relays listed in the pairing string are tried in order until one
//! produces a response.

pub mod client;
pub mod crypto;
pub mod error;
pub mod event;
pub mod keys;
pub mod relay;
pub mod testing;
pub mod uri;

pub use client::{
    ClientConfig, CreatedInvoice, NwcClient, PaymentReceipt, Request, Response, RpcError,
    WalletInfo, KIND_INFO, KIND_REQUEST, KIND_RESPONSE,
};
pub use error::{Error, Result};
pub use event::{finalize_event, verify_event, Event, EventTemplate};
pub use keys::{decode_public_key, encode_npub, Keypair};
pub use relay::{Filter, RelayTransport, TransportFactory, WsTransport, WsTransportFactory};
pub use uri::{ConnectionDescriptor, WALLET_CONNECT_SCHEME};
