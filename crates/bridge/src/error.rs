//! Bridge error types.
//!
//! Cross-system flows fail with the last completed stage attached, because
//! "invoice created but payment unconfirmed" and "nothing happened" call for
//! different operator responses.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How far a fund flow got before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingStage {
    /// No step completed
    Started,
    /// The mint issued a funding quote with an invoice
    QuoteCreated,
    /// The remote wallet reported the invoice paid
    PaymentDispatched,
    /// The mint confirmed the quote as payable
    PaymentConfirmed,
}

impl fmt::Display for FundingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FundingStage::Started => "no steps completed",
            FundingStage::QuoteCreated => "invoice created",
            FundingStage::PaymentDispatched => "payment dispatched",
            FundingStage::PaymentConfirmed => "payment confirmed",
        };
        f.write_str(label)
    }
}

/// How far a withdraw flow got before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawStage {
    /// No step completed
    Started,
    /// The remote wallet produced an invoice
    InvoiceCreated,
}

impl fmt::Display for WithdrawStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WithdrawStage::Started => "no steps completed",
            WithdrawStage::InvoiceCreated => "invoice created",
        };
        f.write_str(label)
    }
}

/// The failing step of a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Wallet(#[from] ecash::Error),

    #[error(transparent)]
    Rpc(#[from] nwc::Error),

    #[error("payment not confirmed within {0:?}")]
    Deadline(Duration),
}

/// Bridge error type
#[derive(Debug, Error)]
pub enum Error {
    /// Fund flow aborted; `stage` is the last step that completed
    #[error("funding aborted ({stage}): {source}")]
    Funding {
        stage: FundingStage,
        #[source]
        source: FlowError,
    },

    /// Withdraw flow aborted; `stage` is the last step that completed
    #[error("withdraw aborted ({stage}): {source}")]
    Withdraw {
        stage: WithdrawStage,
        #[source]
        source: FlowError,
    },

    /// Remote wallet passthrough call failed
    #[error(transparent)]
    Rpc(#[from] nwc::Error),

    /// Home directory could not be resolved for the config path
    #[error("could not determine home directory")]
    NoHomeDir,

    /// Config file I/O error
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Config serialization error
    #[error("config serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bridge result type
pub type Result<T> = std::result::Result<T, Error>;
