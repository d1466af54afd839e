//! Cross-system fund and withdraw flows.
//!
//! Funding moves value from the remote lightning wallet into the mint:
//! quote, remote payment, confirmation poll, claim. Withdrawal runs the
//! other way: ask the remote wallet for an invoice and melt local proofs to
//! pay it. Every failure names the last stage that completed, and a flow is
//! abandoned simply by dropping its future; the confirmation poll holds no
//! background task.

use crate::error::{Error, FlowError, FundingStage, Result, WithdrawStage};
use ecash::{MeltReceipt, WalletFacade};
use nwc::{NwcClient, WalletInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

/// Timing knobs for the fund confirmation loop.
#[derive(Debug, Clone)]
pub struct FundingConfig {
    /// Cadence of mint quote polls
    pub poll_interval: Duration,
    /// Total time allowed for the mint to observe the payment
    pub confirm_deadline: Duration,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            confirm_deadline: Duration::from_secs(120),
        }
    }
}

/// A completed fund flow.
#[derive(Debug, Clone)]
pub struct FundingOutcome {
    pub quote_id: String,
    pub invoice: String,
    /// Amount claimed into the ledger
    pub claimed: u64,
    pub preimage: String,
}

/// A completed withdraw flow.
#[derive(Debug, Clone)]
pub struct WithdrawOutcome {
    pub invoice: String,
    pub receipt: MeltReceipt,
}

/// Composes the mint wallet and the remote wallet RPC client.
pub struct FundingOrchestrator {
    wallet: Arc<WalletFacade>,
    rpc: Arc<NwcClient>,
    config: FundingConfig,
}

impl FundingOrchestrator {
    pub fn new(wallet: Arc<WalletFacade>, rpc: Arc<NwcClient>, config: FundingConfig) -> Self {
        Self {
            wallet,
            rpc,
            config,
        }
    }

    /// Move `amount` from the remote wallet into the mint ledger.
    ///
    /// The payment is dispatched at most once; if confirmation or the claim
    /// fails afterwards the quote id in the error context is what a retry
    /// would resume from.
    pub async fn fund(&self, amount: u64) -> Result<FundingOutcome> {
        let quote = self
            .wallet
            .create_funding_quote(amount, Some("wallet top-up"))
            .await
            .map_err(|e| Error::Funding {
                stage: FundingStage::Started,
                source: e.into(),
            })?;
        info!(quote_id = %quote.id, amount, "funding quote created");

        let receipt = self
            .rpc
            .pay_invoice(&quote.payment_request)
            .await
            .map_err(|e| Error::Funding {
                stage: FundingStage::QuoteCreated,
                source: e.into(),
            })?;
        info!(quote_id = %quote.id, "remote wallet paid the funding invoice");

        self.await_confirmation(&quote.id).await?;

        let claimed = self
            .wallet
            .claim(&quote.id, amount)
            .await
            .map_err(|e| Error::Funding {
                stage: FundingStage::PaymentConfirmed,
                source: e.into(),
            })?;
        info!(quote_id = %quote.id, claimed, "funding claimed into ledger");

        Ok(FundingOutcome {
            quote_id: quote.id,
            invoice: quote.payment_request,
            claimed,
            preimage: receipt.preimage,
        })
    }

    async fn await_confirmation(&self, quote_id: &str) -> Result<()> {
        let deadline = Instant::now() + self.config.confirm_deadline;
        loop {
            let state = self
                .wallet
                .poll_quote(quote_id)
                .await
                .map_err(|e| Error::Funding {
                    stage: FundingStage::PaymentDispatched,
                    source: e.into(),
                })?;
            if state.is_payable() {
                return Ok(());
            }
            if Instant::now() + self.config.poll_interval > deadline {
                return Err(Error::Funding {
                    stage: FundingStage::PaymentDispatched,
                    source: FlowError::Deadline(self.config.confirm_deadline),
                });
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Melt `amount` of local proofs into the remote wallet.
    pub async fn withdraw(&self, amount: u64) -> Result<WithdrawOutcome> {
        let created = self
            .rpc
            .make_invoice(amount * 1_000, Some("ecash withdrawal"))
            .await
            .map_err(|e| Error::Withdraw {
                stage: WithdrawStage::Started,
                source: e.into(),
            })?;
        info!(amount, "remote wallet issued withdrawal invoice");

        let receipt = self
            .wallet
            .melt(&created.invoice)
            .await
            .map_err(|e| Error::Withdraw {
                stage: WithdrawStage::InvoiceCreated,
                source: e.into(),
            })?;
        info!(quote_id = %receipt.quote_id, "withdrawal paid");

        Ok(WithdrawOutcome {
            invoice: created.invoice,
            receipt,
        })
    }

    /// Remote wallet capabilities.
    pub async fn remote_info(&self) -> Result<WalletInfo> {
        Ok(self.rpc.get_info().await?)
    }

    /// Remote wallet balance in millisatoshis.
    pub async fn remote_balance_msats(&self) -> Result<u64> {
        Ok(self.rpc.get_balance().await?)
    }
}
