//! Session against a single mint.
//!
//! The mint's loosely-typed JSON responses are normalized once, here, into
//! tagged structs and enums; nothing deeper in the call chain branches on ad
//! hoc field presence. The HTTP surface lives behind the [`MintApi`] trait so
//! sessions can be exercised against a scripted double.
//!
//! The blind-signature scheme itself is the mint's side of the protocol: the
//! API exchanges proofs whose signature material is opaque to this crate.

use crate::canonical_mint_url;
use crate::error::{Error, Result};
use crate::ledger::ProofLedger;
use crate::proof::{proof_total, Proof};
use crate::token::BearerToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default currency unit in its minor denomination.
pub const DEFAULT_UNIT: &str = "sat";

/// Quote lifecycle as reported by the mint. Transitions are driven only by
/// polling; never mutated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteState {
    Unpaid,
    Pending,
    Paid,
    Issued,
}

impl QuoteState {
    /// Whether proofs may be claimed against a quote in this state.
    pub fn is_payable(self) -> bool {
        matches!(self, QuoteState::Paid | QuoteState::Issued)
    }
}

impl std::fmt::Display for QuoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuoteState::Unpaid => "UNPAID",
            QuoteState::Pending => "PENDING",
            QuoteState::Paid => "PAID",
            QuoteState::Issued => "ISSUED",
        };
        f.write_str(s)
    }
}

/// Mint metadata loaded at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A pending funding intent: pay `payment_request`, then claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingQuote {
    pub id: String,
    pub payment_request: String,
    pub state: QuoteState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

/// A short-lived payment intent: melt proofs to pay `payment_request`.
/// Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeltQuote {
    pub id: String,
    /// Invoice amount the mint will pay out
    pub amount: u64,
    /// Reserve withheld for routing fees; unspent reserve comes back as change
    pub fee_reserve: u64,
    pub payment_request: String,
    pub state: QuoteState,
}

/// Result of a submitted melt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeltReceipt {
    pub quote_id: String,
    pub paid: bool,
    pub preimage: Option<String>,
    /// Unspent fee reserve returned by the mint
    pub change: Vec<Proof>,
}

/// Outcome of a proof split: `send` covers the requested amount exactly,
/// `keep` is the change that stays in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSplit {
    pub send: Vec<Proof>,
    pub keep: Vec<Proof>,
}

/// Mint API boundary. One implementor speaks HTTP to a real mint; tests
/// inject scripted doubles.
#[async_trait]
pub trait MintApi: Send + Sync {
    async fn get_info(&self) -> Result<MintInfo>;
    async fn create_mint_quote(
        &self,
        amount: u64,
        unit: &str,
        memo: Option<&str>,
    ) -> Result<FundingQuote>;
    async fn get_mint_quote(&self, quote_id: &str) -> Result<FundingQuote>;
    /// Claim proofs for a paid quote.
    async fn claim(&self, quote_id: &str, amount: u64, unit: &str) -> Result<Vec<Proof>>;
    /// Split input proofs so that `send_amount` is covered exactly.
    async fn swap(&self, inputs: Vec<Proof>, send_amount: u64) -> Result<SendSplit>;
    /// Redeem foreign proofs into fresh ones owned by this wallet.
    async fn redeem(&self, proofs: Vec<Proof>) -> Result<Vec<Proof>>;
    async fn create_melt_quote(&self, invoice: &str, unit: &str) -> Result<MeltQuote>;
    async fn melt(&self, quote_id: &str, inputs: Vec<Proof>) -> Result<MeltReceipt>;
}

// --- HTTP implementation -------------------------------------------------

#[derive(Deserialize)]
struct InfoResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct MintQuoteResponse {
    quote: String,
    request: String,
    state: QuoteState,
    #[serde(default)]
    expiry: Option<u64>,
}

#[derive(Deserialize)]
struct MeltQuoteResponse {
    quote: String,
    amount: u64,
    fee_reserve: u64,
    state: QuoteState,
}

#[derive(Deserialize)]
struct ProofsResponse {
    proofs: Vec<Proof>,
}

#[derive(Deserialize)]
struct SwapResponse {
    send: Vec<Proof>,
    keep: Vec<Proof>,
}

#[derive(Deserialize)]
struct MeltResponse {
    state: QuoteState,
    #[serde(default)]
    payment_preimage: Option<String>,
    #[serde(default)]
    change: Vec<Proof>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

/// HTTP client for the mint's published protocol.
pub struct HttpMintApi {
    base: Url,
    client: reqwest::Client,
}

impl HttpMintApi {
    pub fn new(mint_url: &str) -> Result<Self> {
        let base = Url::parse(&format!("{}/", canonical_mint_url(mint_url)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(Error::from)
    }

    fn map_transport(err: reqwest::Error) -> Error {
        if err.is_connect() || err.is_timeout() {
            Error::MintUnreachable(err.to_string())
        } else {
            Error::Http(err.to_string())
        }
    }

    /// Deserialize a response, turning mint error bodies into typed errors.
    /// `rejection` selects the error variant for 4xx responses, since a 400
    /// on redemption means "refused" rather than "broken transport".
    async fn read<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
        rejection: fn(String) -> Error,
    ) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(Self::map_transport);
        }
        let detail = resp
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.detail)
            .unwrap_or_else(|| format!("http status {}", status));
        if status.is_client_error() {
            Err(rejection(detail))
        } else {
            Err(Error::Mint(detail))
        }
    }
}

#[async_trait]
impl MintApi for HttpMintApi {
    async fn get_info(&self) -> Result<MintInfo> {
        let resp = self
            .client
            .get(self.endpoint("v1/info")?)
            .send()
            .await
            .map_err(|e| Error::MintUnreachable(e.to_string()))?;
        let info: InfoResponse = Self::read(resp, Error::Mint).await?;
        Ok(MintInfo {
            name: info.name.unwrap_or_else(|| self.base.to_string()),
            version: info.version.unwrap_or_default(),
            description: info.description,
        })
    }

    async fn create_mint_quote(
        &self,
        amount: u64,
        unit: &str,
        memo: Option<&str>,
    ) -> Result<FundingQuote> {
        let body = serde_json::json!({
            "amount": amount,
            "unit": unit,
            "description": memo,
        });
        let resp = self
            .client
            .post(self.endpoint("v1/mint/quote/bolt11")?)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let quote: MintQuoteResponse = Self::read(resp, Error::Mint).await?;
        Ok(FundingQuote {
            id: quote.quote,
            payment_request: quote.request,
            state: quote.state,
            expiry: quote.expiry,
        })
    }

    async fn get_mint_quote(&self, quote_id: &str) -> Result<FundingQuote> {
        let resp = self
            .client
            .get(self.endpoint(&format!("v1/mint/quote/bolt11/{}", quote_id))?)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let quote: MintQuoteResponse = Self::read(resp, Error::Mint).await?;
        Ok(FundingQuote {
            id: quote.quote,
            payment_request: quote.request,
            state: quote.state,
            expiry: quote.expiry,
        })
    }

    async fn claim(&self, quote_id: &str, amount: u64, unit: &str) -> Result<Vec<Proof>> {
        let body = serde_json::json!({
            "quote": quote_id,
            "amount": amount,
            "unit": unit,
        });
        let resp = self
            .client
            .post(self.endpoint("v1/mint/bolt11")?)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let proofs: ProofsResponse = Self::read(resp, Error::Mint).await?;
        Ok(proofs.proofs)
    }

    async fn swap(&self, inputs: Vec<Proof>, send_amount: u64) -> Result<SendSplit> {
        let body = serde_json::json!({
            "inputs": inputs,
            "amount": send_amount,
        });
        let resp = self
            .client
            .post(self.endpoint("v1/swap")?)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let split: SwapResponse = Self::read(resp, Error::RedemptionRejected).await?;
        Ok(SendSplit {
            send: split.send,
            keep: split.keep,
        })
    }

    async fn redeem(&self, proofs: Vec<Proof>) -> Result<Vec<Proof>> {
        let amount = proof_total(&proofs);
        let split = self.swap(proofs, amount).await?;
        let mut fresh = split.send;
        fresh.extend(split.keep);
        Ok(fresh)
    }

    async fn create_melt_quote(&self, invoice: &str, unit: &str) -> Result<MeltQuote> {
        let body = serde_json::json!({
            "request": invoice,
            "unit": unit,
        });
        let resp = self
            .client
            .post(self.endpoint("v1/melt/quote/bolt11")?)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let quote: MeltQuoteResponse = Self::read(resp, Error::Mint).await?;
        Ok(MeltQuote {
            id: quote.quote,
            amount: quote.amount,
            fee_reserve: quote.fee_reserve,
            payment_request: invoice.to_string(),
            state: quote.state,
        })
    }

    async fn melt(&self, quote_id: &str, inputs: Vec<Proof>) -> Result<MeltReceipt> {
        let body = serde_json::json!({
            "quote": quote_id,
            "inputs": inputs,
        });
        let resp = self
            .client
            .post(self.endpoint("v1/melt/bolt11")?)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let melt: MeltResponse = Self::read(resp, Error::Mint).await?;
        Ok(MeltReceipt {
            quote_id: quote_id.to_string(),
            paid: melt.state == QuoteState::Paid,
            preimage: melt.payment_preimage,
            change: melt.change,
        })
    }
}

// --- Session -------------------------------------------------------------

/// A wallet session bound to exactly one mint.
///
/// Ledger-mutating operations (claim, send, melt, receive) read proofs,
/// swap with the mint, and write the ledger as separate steps. Callers
/// must not issue them concurrently on one session, or two operations
/// could select the same proofs.
pub struct MintSession {
    mint_url: String,
    unit: String,
    info: MintInfo,
    api: Arc<dyn MintApi>,
    ledger: ProofLedger,
}

impl std::fmt::Debug for MintSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintSession")
            .field("mint_url", &self.mint_url)
            .field("unit", &self.unit)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl MintSession {
    /// Connect to a mint: loads its metadata, failing with
    /// [`Error::MintUnreachable`] when the endpoint cannot be reached.
    pub async fn connect(
        mint_url: &str,
        api: Arc<dyn MintApi>,
        ledger: ProofLedger,
    ) -> Result<Self> {
        let info = api.get_info().await?;
        info!(mint = %mint_url, name = %info.name, version = %info.version, "mint session ready");
        Ok(Self {
            mint_url: canonical_mint_url(mint_url),
            unit: DEFAULT_UNIT.to_string(),
            info,
            api,
            ledger,
        })
    }

    pub fn mint_url(&self) -> &str {
        &self.mint_url
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn info(&self) -> &MintInfo {
        &self.info
    }

    /// Current spendable balance at this mint, recomputed from the ledger.
    pub async fn balance(&self) -> Result<u64> {
        self.ledger.balance(&self.mint_url).await
    }

    /// Ask the mint for a funding quote: an invoice that, once paid,
    /// entitles the wallet to claim `amount` in fresh proofs.
    pub async fn create_funding_quote(
        &self,
        amount: u64,
        memo: Option<&str>,
    ) -> Result<FundingQuote> {
        if amount == 0 {
            return Err(Error::InvalidAmount(0));
        }
        let quote = self
            .api
            .create_mint_quote(amount, &self.unit, memo)
            .await?;
        debug!(mint = %self.mint_url, quote = %quote.id, amount, "funding quote created");
        Ok(quote)
    }

    /// Poll a funding quote's state. Pure read; the caller owns the cadence.
    pub async fn poll_quote(&self, quote_id: &str) -> Result<QuoteState> {
        Ok(self.api.get_mint_quote(quote_id).await?.state)
    }

    /// Claim proofs for a paid quote and merge them into the ledger.
    ///
    /// Merging (never replacing) means a retried claim cannot erase other
    /// proofs: replayed proofs are dropped as duplicates by secret.
    pub async fn claim(&self, quote_id: &str, amount: u64) -> Result<Vec<Proof>> {
        let quote = self.api.get_mint_quote(quote_id).await?;
        if !quote.state.is_payable() {
            return Err(Error::QuoteNotPaid {
                id: quote_id.to_string(),
                state: quote.state.to_string(),
            });
        }
        let proofs = self.api.claim(quote_id, amount, &self.unit).await?;
        let appended = self.ledger.merge(&self.mint_url, proofs.clone()).await?;
        info!(mint = %self.mint_url, quote = %quote_id, amount, appended, "claimed funding quote");
        Ok(proofs)
    }

    /// Build a portable token covering exactly `amount`, leaving change in
    /// the ledger. Balance is checked before any network call; when the
    /// stored proofs cannot cover the amount exactly, the mint splits them.
    pub async fn build_send_token(&self, amount: u64) -> Result<BearerToken> {
        if amount == 0 {
            return Err(Error::InvalidAmount(0));
        }
        let proofs = self.ledger.load(&self.mint_url).await?;
        let have = proof_total(&proofs);
        if have < amount {
            return Err(Error::InsufficientBalance { have, need: amount });
        }

        let (selected, rest) = select_for_amount(proofs, amount);
        let (send, keep) = if proof_total(&selected) == amount {
            (selected, Vec::new())
        } else {
            let split = self.api.swap(selected, amount).await?;
            (split.send, split.keep)
        };

        let mut remaining = rest;
        remaining.extend(keep);
        self.ledger.replace(&self.mint_url, remaining).await?;

        debug!(mint = %self.mint_url, amount, "send token built");
        Ok(BearerToken::new(&self.mint_url, &self.unit, send))
    }

    /// Redeem a token's proofs and merge the result into the ledger bucket of
    /// the *token's* mint. Callers routing tokens from other mints construct
    /// a session for that mint first (see `WalletFacade`).
    pub async fn receive(&self, token: &BearerToken) -> Result<Vec<Proof>> {
        let fresh = self.api.redeem(token.proofs.clone()).await?;
        let appended = self.ledger.merge(&token.mint, fresh.clone()).await?;
        info!(mint = %token.mint, amount = token.amount(), appended, "received token");
        Ok(fresh)
    }

    /// Melt proofs to pay a Lightning invoice.
    ///
    /// The split replaces the ledger entry with the kept remainder before the
    /// melt is submitted. On mint-reported failure the held-back proofs are
    /// not restored: the melt is not completed and the caller may retry from
    /// ledger state.
    pub async fn melt(&self, invoice: &str) -> Result<MeltReceipt> {
        let quote = self.api.create_melt_quote(invoice, &self.unit).await?;
        let needed = quote.amount + quote.fee_reserve;

        let proofs = self.ledger.load(&self.mint_url).await?;
        let have = proof_total(&proofs);
        if have < needed {
            return Err(Error::InsufficientBalance { have, need: needed });
        }

        let (selected, rest) = select_for_amount(proofs, needed);
        let (send, keep) = if proof_total(&selected) == needed {
            (selected, Vec::new())
        } else {
            let split = self.api.swap(selected, needed).await?;
            (split.send, split.keep)
        };

        let mut remaining = rest;
        remaining.extend(keep);
        self.ledger.replace(&self.mint_url, remaining).await?;

        let receipt = self.api.melt(&quote.id, send).await?;
        if !receipt.paid {
            warn!(mint = %self.mint_url, quote = %quote.id, "melt not completed; kept remainder stays in ledger");
            return Err(Error::MeltUnpaid(quote.id));
        }

        if !receipt.change.is_empty() {
            self.ledger
                .merge(&self.mint_url, receipt.change.clone())
                .await?;
        }
        info!(mint = %self.mint_url, quote = %quote.id, amount = quote.amount, "melt completed");
        Ok(receipt)
    }
}

/// Pick a subset of proofs whose total is at least `amount`, returning
/// `(selected, rest)`. Smallest proofs go first so large denominations stay
/// intact when they are not needed.
fn select_for_amount(mut proofs: Vec<Proof>, amount: u64) -> (Vec<Proof>, Vec<Proof>) {
    proofs.sort_by_key(|p| p.amount);
    let mut selected = Vec::new();
    let mut total = 0u64;
    let mut rest = Vec::new();
    for proof in proofs {
        if total < amount {
            total += proof.amount;
            selected.push(proof);
        } else {
            rest.push(proof);
        }
    }
    (selected, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryStore;
    use crate::testing::ScriptedMint;

    const MINT: &str = "https://mint.example";

    fn ledger() -> ProofLedger {
        ProofLedger::new(Arc::new(MemoryStore::new()))
    }

    async fn session(api: Arc<ScriptedMint>, ledger: ProofLedger) -> MintSession {
        MintSession::connect(MINT, api, ledger).await.unwrap()
    }

    #[test]
    fn select_prefers_exact_small_coins() {
        let proofs = vec![
            Proof::new(8, "s8", "c", "k"),
            Proof::new(1, "s1", "c", "k"),
            Proof::new(2, "s2", "c", "k"),
        ];
        let (selected, rest) = select_for_amount(proofs, 3);
        assert_eq!(proof_total(&selected), 3);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].amount, 8);
    }

    #[tokio::test]
    async fn connect_loads_mint_info() {
        let api = Arc::new(ScriptedMint::new());
        let session = session(api, ledger()).await;
        assert_eq!(session.info().name, "scripted mint");
        assert_eq!(session.mint_url(), MINT);
    }

    #[tokio::test]
    async fn connect_fails_when_unreachable() {
        let api = Arc::new(ScriptedMint::new());
        api.set_unreachable(true);
        let err = MintSession::connect(MINT, api, ledger()).await.unwrap_err();
        assert!(matches!(err, Error::MintUnreachable(_)));
    }

    #[tokio::test]
    async fn zero_amount_quote_fails_before_network() {
        let api = Arc::new(ScriptedMint::new());
        let session = session(api.clone(), ledger()).await;

        let err = session.create_funding_quote(0, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(0)));
        assert_eq!(api.quote_calls(), 0);
    }

    #[tokio::test]
    async fn funding_flow_quote_pay_claim() {
        let api = Arc::new(ScriptedMint::new());
        let ledger = ledger();
        let session = session(api.clone(), ledger.clone()).await;

        let quote = session.create_funding_quote(1000, Some("topup")).await.unwrap();
        assert_eq!(quote.state, QuoteState::Unpaid);
        assert_eq!(session.poll_quote(&quote.id).await.unwrap(), QuoteState::Unpaid);

        // Claiming an unpaid quote is refused without touching the ledger.
        let err = session.claim(&quote.id, 1000).await.unwrap_err();
        assert!(matches!(err, Error::QuoteNotPaid { .. }));
        assert_eq!(session.balance().await.unwrap(), 0);

        api.mark_paid(&quote.id);
        assert_eq!(session.poll_quote(&quote.id).await.unwrap(), QuoteState::Paid);

        let proofs = session.claim(&quote.id, 1000).await.unwrap();
        assert_eq!(proof_total(&proofs), 1000);
        assert_eq!(session.balance().await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn replayed_claim_does_not_inflate_balance() {
        let api = Arc::new(ScriptedMint::new());
        let ledger = ledger();
        let session = session(api.clone(), ledger.clone()).await;

        let quote = session.create_funding_quote(1000, None).await.unwrap();
        api.mark_paid(&quote.id);

        session.claim(&quote.id, 1000).await.unwrap();
        // Accidental replay returns the same already-merged proofs.
        session.claim(&quote.id, 1000).await.unwrap();

        assert_eq!(session.balance().await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn send_token_insufficient_balance_leaves_ledger_untouched() {
        let api = Arc::new(ScriptedMint::new());
        let ledger = ledger();
        ledger
            .merge(MINT, vec![Proof::new(4, "s", "c", "k")])
            .await
            .unwrap();
        let session = session(api.clone(), ledger.clone()).await;

        let err = session.build_send_token(10).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { have: 4, need: 10 }));
        assert_eq!(api.swap_calls(), 0);
        assert_eq!(ledger.load(MINT).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_token_exact_subset_skips_swap() {
        let api = Arc::new(ScriptedMint::new());
        let ledger = ledger();
        ledger
            .merge(
                MINT,
                vec![
                    Proof::new(2, "s2", "c", "k"),
                    Proof::new(8, "s8", "c", "k"),
                ],
            )
            .await
            .unwrap();
        let session = session(api.clone(), ledger.clone()).await;

        let token = session.build_send_token(2).await.unwrap();
        assert_eq!(token.amount(), 2);
        assert_eq!(api.swap_calls(), 0);
        assert_eq!(session.balance().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn send_token_splits_when_inexact() {
        let api = Arc::new(ScriptedMint::new());
        let ledger = ledger();
        ledger
            .merge(MINT, vec![Proof::new(16, "s16", "c", "k")])
            .await
            .unwrap();
        let session = session(api.clone(), ledger.clone()).await;

        let token = session.build_send_token(5).await.unwrap();
        assert_eq!(token.amount(), 5);
        assert_eq!(api.swap_calls(), 1);
        // Change stays behind.
        assert_eq!(session.balance().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn receive_merges_into_tokens_mint_bucket() {
        let api = Arc::new(ScriptedMint::new());
        let ledger = ledger();
        let session = session(api.clone(), ledger.clone()).await;

        let token = BearerToken::new(MINT, "sat", vec![Proof::new(7, "ext", "c", "k")]);
        let fresh = session.receive(&token).await.unwrap();
        assert_eq!(proof_total(&fresh), 7);
        assert_eq!(session.balance().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn receive_surfaces_rejection() {
        let api = Arc::new(ScriptedMint::new());
        api.set_reject_redemption(true);
        let ledger = ledger();
        let session = session(api.clone(), ledger.clone()).await;

        let token = BearerToken::new(MINT, "sat", vec![Proof::new(7, "spent", "c", "k")]);
        let err = session.receive(&token).await.unwrap_err();
        assert!(matches!(err, Error::RedemptionRejected(_)));
        assert_eq!(session.balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn melt_insufficient_for_fee_reserve_leaves_ledger_untouched() {
        let api = Arc::new(ScriptedMint::new());
        // amount 100 + fee reserve 3
        api.set_melt_quote(100, 3);
        let ledger = ledger();
        ledger
            .merge(MINT, vec![Proof::new(100, "s", "c", "k")])
            .await
            .unwrap();
        let session = session(api.clone(), ledger.clone()).await;

        let err = session.melt("lnbc100n1...").await.unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { have: 100, need: 103 }));
        assert_eq!(ledger.load(MINT).await.unwrap().len(), 1);
        assert_eq!(api.melt_calls(), 0);
    }

    #[tokio::test]
    async fn melt_success_merges_change() {
        let api = Arc::new(ScriptedMint::new());
        api.set_melt_quote(100, 3);
        // Mint returns 2 of the 3 reserved for fees.
        api.set_melt_change(vec![Proof::new(2, "change", "c", "k")]);
        let ledger = ledger();
        ledger
            .merge(MINT, vec![Proof::new(128, "s", "c", "k")])
            .await
            .unwrap();
        let session = session(api.clone(), ledger.clone()).await;

        let receipt = session.melt("lnbc100n1...").await.unwrap();
        assert!(receipt.paid);
        // 128 - 103 = 25 kept from the split, plus 2 change.
        assert_eq!(session.balance().await.unwrap(), 27);
    }

    #[tokio::test]
    async fn melt_failure_leaves_kept_remainder() {
        let api = Arc::new(ScriptedMint::new());
        api.set_melt_quote(100, 3);
        api.set_melt_paid(false);
        let ledger = ledger();
        ledger
            .merge(MINT, vec![Proof::new(128, "s", "c", "k")])
            .await
            .unwrap();
        let session = session(api.clone(), ledger.clone()).await;

        let err = session.melt("lnbc100n1...").await.unwrap_err();
        assert!(matches!(err, Error::MeltUnpaid(_)));
        // The split already replaced the entry; the held-back send proofs are
        // not restored automatically.
        assert_eq!(session.balance().await.unwrap(), 25);
    }
}
