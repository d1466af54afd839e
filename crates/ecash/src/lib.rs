//! Bearer-ecash wallet core for Satchel.
//!
//! This crate tracks a user's spendable balance as a set of bearer proofs
//! issued by one or more independent mints, and moves value against those
//! mints:
//! - Hold proofs per mint in a persistent ledger
//! - Deposit via Lightning (funding quotes, claim on payment)
//! - Pay Lightning invoices (melt operations)
//! - Send and receive portable bearer tokens, including tokens minted by a
//!   mint other than the active one
//!
//! Proofs are bearer secrets: losing or duplicating one is a financial bug.
//! The ledger therefore dedups by secret, persists atomically, and serializes
//! all mutations.
//!
//! # Example
//!
//! ```ignore
//! use ecash::{FileStore, HttpMintApi, MintSession, ProofLedger, WalletFacade};
//! use std::sync::Arc;
//!
//! let ledger = ProofLedger::new(Arc::new(FileStore::new(path)?));
//! let api = Arc::new(HttpMintApi::new("https://mint.example")?);
//! let session = MintSession::connect("https://mint.example", api, ledger.clone()).await?;
//!
//! let quote = session.create_funding_quote(1000, None).await?;
//! println!("Pay this invoice: {}", quote.payment_request);
//! ```

pub mod error;
pub mod ledger;
pub mod mint;
pub mod proof;
pub mod testing;
pub mod token;
pub mod wallet;

// Re-exports for convenient access
pub use error::{Error, Result};
pub use ledger::{FileStore, LedgerStore, MemoryStore, ProofLedger};
pub use mint::{
    FundingQuote, HttpMintApi, MeltQuote, MeltReceipt, MintApi, MintInfo, MintSession, QuoteState,
    SendSplit,
};
pub use proof::{proof_total, Proof};
pub use token::BearerToken;
pub use wallet::{HttpMintApiFactory, MintApiFactory, ReceiveOutcome, WalletFacade, WalletSnapshot};

/// Canonical form of a mint endpoint URL used as a ledger key.
///
/// Trailing slashes are stripped so that `https://mint.example/` and
/// `https://mint.example` address the same proof bucket.
pub fn canonical_mint_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
