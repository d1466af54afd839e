//! Wallet-connect client error types

use thiserror::Error;

/// Wallet-connect error type
#[derive(Error, Debug)]
pub enum Error {
    /// Remote identity in the connection string could not be decoded
    #[error("invalid wallet identity: {0}")]
    InvalidWalletIdentity(String),

    /// Connection string carries no usable relay endpoint
    #[error("connection string has no relay")]
    MissingRelay,

    /// Connection string secret is absent or not a 32-byte key
    #[error("connection string secret missing or malformed: {0}")]
    MissingSecret(String),

    /// Connection string does not use the wallet-connect scheme
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Key material could not be decoded or derived
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Request deadline elapsed on a relay attempt
    #[error("rpc timeout: {0}")]
    Timeout(String),

    /// Connection was closed while a request was pending
    #[error("rpc cancelled")]
    Cancelled,

    /// Remote wallet answered with an error envelope
    #[error("rpc error ({code}): {message}")]
    Rpc { code: String, message: String },

    /// Relay rejected the published request
    #[error("publish rejected: {0}")]
    PublishRejected(String),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Not connected to a relay
    #[error("not connected to relay")]
    NotConnected,

    /// Invalid URL
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Payload encryption/decryption failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Event signing or verification failure
    #[error("signing error: {0}")]
    Signing(String),

    /// Relay protocol violation
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Wallet-connect result type
pub type Result<T> = std::result::Result<T, Error>;
