//! Bridge between a local ecash wallet and a remote lightning wallet.
//!
//! The fund flow buys mint proofs with a payment from the remote wallet;
//! the withdraw flow melts proofs to pay an invoice the remote wallet
//! issues. Configuration persists the mint endpoint and the last-used
//! pairing string.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::BridgeConfig;
pub use error::{Error, FlowError, FundingStage, Result, WithdrawStage};
pub use orchestrator::{FundingConfig, FundingOrchestrator, FundingOutcome, WithdrawOutcome};
