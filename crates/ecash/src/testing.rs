//! Scripted mint double for unit tests.
//!
//! Behaves like a well-behaved mint with switchable failure modes. Claimed
//! proofs are deterministic per quote id so a replayed claim returns the same
//! set, which is what the dedup tests rely on.

use crate::error::{Error, Result};
use crate::mint::{FundingQuote, MeltQuote, MeltReceipt, MintApi, MintInfo, QuoteState, SendSplit};
use crate::proof::Proof;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct ScriptedMint {
    unreachable: AtomicBool,
    reject_redemption: AtomicBool,
    quotes: Mutex<HashMap<String, FundingQuote>>,
    next_quote: AtomicU64,
    next_secret: AtomicU64,
    quote_calls: AtomicUsize,
    swap_calls: AtomicUsize,
    melt_calls: AtomicUsize,
    melt_quote: Mutex<(u64, u64)>,
    melt_paid: AtomicBool,
    melt_change: Mutex<Vec<Proof>>,
}

impl ScriptedMint {
    pub fn new() -> Self {
        Self {
            unreachable: AtomicBool::new(false),
            reject_redemption: AtomicBool::new(false),
            quotes: Mutex::new(HashMap::new()),
            next_quote: AtomicU64::new(0),
            next_secret: AtomicU64::new(0),
            quote_calls: AtomicUsize::new(0),
            swap_calls: AtomicUsize::new(0),
            melt_calls: AtomicUsize::new(0),
            melt_quote: Mutex::new((100, 0)),
            melt_paid: AtomicBool::new(true),
            melt_change: Mutex::new(Vec::new()),
        }
    }

    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn set_reject_redemption(&self, value: bool) {
        self.reject_redemption.store(value, Ordering::SeqCst);
    }

    pub fn set_melt_quote(&self, amount: u64, fee_reserve: u64) {
        *self.melt_quote.lock().unwrap() = (amount, fee_reserve);
    }

    pub fn set_melt_paid(&self, paid: bool) {
        self.melt_paid.store(paid, Ordering::SeqCst);
    }

    pub fn set_melt_change(&self, change: Vec<Proof>) {
        *self.melt_change.lock().unwrap() = change;
    }

    pub fn mark_paid(&self, quote_id: &str) {
        let mut quotes = self.quotes.lock().unwrap();
        if let Some(quote) = quotes.get_mut(quote_id) {
            quote.state = QuoteState::Paid;
        }
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn swap_calls(&self) -> usize {
        self.swap_calls.load(Ordering::SeqCst)
    }

    pub fn melt_calls(&self) -> usize {
        self.melt_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::MintUnreachable("scripted: connection refused".into()));
        }
        Ok(())
    }

    fn fresh_proofs(&self, amount: u64, prefix: &str) -> Vec<Proof> {
        decompose(amount)
            .into_iter()
            .map(|a| {
                let n = self.next_secret.fetch_add(1, Ordering::SeqCst);
                Proof::new(a, format!("{}-{}", prefix, n), format!("02{:064x}", n), "scripted")
            })
            .collect()
    }
}

impl Default for ScriptedMint {
    fn default() -> Self {
        Self::new()
    }
}

/// Power-of-two denomination split.
fn decompose(mut amount: u64) -> Vec<u64> {
    let mut parts = Vec::new();
    let mut bit = 1u64;
    while amount > 0 {
        if amount & 1 == 1 {
            parts.push(bit);
        }
        amount >>= 1;
        bit <<= 1;
    }
    parts
}

#[async_trait]
impl MintApi for ScriptedMint {
    async fn get_info(&self) -> Result<MintInfo> {
        self.check_reachable()?;
        Ok(MintInfo {
            name: "scripted mint".into(),
            version: "0.1.0".into(),
            description: None,
        })
    }

    async fn create_mint_quote(
        &self,
        amount: u64,
        _unit: &str,
        _memo: Option<&str>,
    ) -> Result<FundingQuote> {
        self.check_reachable()?;
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.next_quote.fetch_add(1, Ordering::SeqCst);
        let quote = FundingQuote {
            id: format!("quote-{}", n),
            payment_request: format!("lnbc{}n1scripted", amount),
            state: QuoteState::Unpaid,
            expiry: Some(600),
        };
        self.quotes
            .lock()
            .unwrap()
            .insert(quote.id.clone(), quote.clone());
        Ok(quote)
    }

    async fn get_mint_quote(&self, quote_id: &str) -> Result<FundingQuote> {
        self.check_reachable()?;
        self.quotes
            .lock()
            .unwrap()
            .get(quote_id)
            .cloned()
            .ok_or_else(|| Error::Mint(format!("unknown quote {}", quote_id)))
    }

    async fn claim(&self, quote_id: &str, amount: u64, _unit: &str) -> Result<Vec<Proof>> {
        self.check_reachable()?;
        // Deterministic per quote so replays return the identical set.
        Ok(decompose(amount)
            .into_iter()
            .enumerate()
            .map(|(i, a)| {
                Proof::new(
                    a,
                    format!("{}-claim-{}", quote_id, i),
                    format!("02{:064x}", i),
                    "scripted",
                )
            })
            .collect())
    }

    async fn swap(&self, inputs: Vec<Proof>, send_amount: u64) -> Result<SendSplit> {
        self.check_reachable()?;
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_redemption.load(Ordering::SeqCst) {
            return Err(Error::RedemptionRejected("scripted: token already spent".into()));
        }
        let total: u64 = inputs.iter().map(|p| p.amount).sum();
        assert!(total >= send_amount, "swap inputs below send amount");
        Ok(SendSplit {
            send: self.fresh_proofs(send_amount, "send"),
            keep: self.fresh_proofs(total - send_amount, "keep"),
        })
    }

    async fn redeem(&self, proofs: Vec<Proof>) -> Result<Vec<Proof>> {
        self.check_reachable()?;
        if self.reject_redemption.load(Ordering::SeqCst) {
            return Err(Error::RedemptionRejected("scripted: token already spent".into()));
        }
        let total: u64 = proofs.iter().map(|p| p.amount).sum();
        Ok(self.fresh_proofs(total, "fresh"))
    }

    async fn create_melt_quote(&self, invoice: &str, _unit: &str) -> Result<MeltQuote> {
        self.check_reachable()?;
        let (amount, fee_reserve) = *self.melt_quote.lock().unwrap();
        let n = self.next_quote.fetch_add(1, Ordering::SeqCst);
        Ok(MeltQuote {
            id: format!("melt-{}", n),
            amount,
            fee_reserve,
            payment_request: invoice.to_string(),
            state: QuoteState::Unpaid,
        })
    }

    async fn melt(&self, quote_id: &str, _inputs: Vec<Proof>) -> Result<MeltReceipt> {
        self.check_reachable()?;
        self.melt_calls.fetch_add(1, Ordering::SeqCst);
        let paid = self.melt_paid.load(Ordering::SeqCst);
        Ok(MeltReceipt {
            quote_id: quote_id.to_string(),
            paid,
            preimage: paid.then(|| "00".repeat(32)),
            change: self.melt_change.lock().unwrap().clone(),
        })
    }
}
