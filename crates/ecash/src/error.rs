//! Ecash error types

use thiserror::Error;

/// Ecash error type
#[derive(Error, Debug)]
pub enum Error {
    /// Amount must be a positive integer in the unit's minor denomination
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Insufficient balance for operation
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    /// Mint endpoint cannot be reached
    #[error("mint unreachable: {0}")]
    MintUnreachable(String),

    /// Mint refused to redeem proofs (already spent, invalid signature)
    #[error("redemption rejected: {0}")]
    RedemptionRejected(String),

    /// Bearer token string could not be decoded
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Claim attempted while the quote is not payable
    #[error("quote {id} not paid (state: {state})")]
    QuoteNotPaid { id: String, state: String },

    /// Melt submitted but the mint reported the payment as not completed.
    /// The held-back send proofs are not restored; the ledger holds the
    /// kept remainder and the caller decides how to recover.
    #[error("melt not completed for quote {0}")]
    MeltUnpaid(String),

    /// Mint returned an error body
    #[error("mint error: {0}")]
    Mint(String),

    /// Ledger store failure
    #[error("store error: {0}")]
    Store(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parse error
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Ecash result type
pub type Result<T> = std::result::Result<T, Error>;
