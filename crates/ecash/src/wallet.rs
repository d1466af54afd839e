//! Wallet facade over the active mint session.
//!
//! Receiving a token minted elsewhere must not corrupt the active ledger
//! bucket: the facade inspects the decoded token's mint first and routes
//! foreign tokens through a transient session for that mint, reporting the
//! result as a cross-mint receipt. Consumers read balance and metadata
//! through [`WalletFacade::snapshot`], recomputed from the ledger on every
//! call.

use crate::error::Result;
use crate::ledger::ProofLedger;
use crate::mint::{FundingQuote, HttpMintApi, MeltReceipt, MintApi, MintInfo, MintSession, QuoteState};
use crate::proof::proof_total;
use crate::token::BearerToken;
use std::sync::Arc;
use tracing::info;

/// Builds a [`MintApi`] for an arbitrary mint URL; the seam that lets tests
/// route transient sessions to scripted mints.
pub trait MintApiFactory: Send + Sync {
    fn api_for(&self, mint_url: &str) -> Result<Arc<dyn MintApi>>;
}

/// Production factory: plain HTTP clients.
pub struct HttpMintApiFactory;

impl MintApiFactory for HttpMintApiFactory {
    fn api_for(&self, mint_url: &str) -> Result<Arc<dyn MintApi>> {
        Ok(Arc::new(HttpMintApi::new(mint_url)?))
    }
}

/// Aggregated view for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSnapshot {
    pub mint_url: String,
    pub balance: u64,
    pub unit: String,
    pub info: MintInfo,
}

/// How a received token was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Merged into the active mint's ledger bucket
    Active { amount: u64 },
    /// Redeemed at the token's own mint; the active balance is untouched
    CrossMint { mint_url: String, amount: u64 },
}

/// Owns the active mint session and resolves cross-mint receives.
pub struct WalletFacade {
    session: MintSession,
    ledger: ProofLedger,
    factory: Arc<dyn MintApiFactory>,
}

impl WalletFacade {
    /// Open a facade on `mint_url` as the active mint.
    pub async fn open(
        mint_url: &str,
        factory: Arc<dyn MintApiFactory>,
        ledger: ProofLedger,
    ) -> Result<Self> {
        let api = factory.api_for(mint_url)?;
        let session = MintSession::connect(mint_url, api, ledger.clone()).await?;
        Ok(Self {
            session,
            ledger,
            factory,
        })
    }

    /// The active mint session.
    pub fn session(&self) -> &MintSession {
        &self.session
    }

    /// Balance and metadata, recomputed from the ledger.
    pub async fn snapshot(&self) -> Result<WalletSnapshot> {
        Ok(WalletSnapshot {
            mint_url: self.session.mint_url().to_string(),
            balance: self.session.balance().await?,
            unit: self.session.unit().to_string(),
            info: self.session.info().clone(),
        })
    }

    pub async fn create_funding_quote(
        &self,
        amount: u64,
        memo: Option<&str>,
    ) -> Result<FundingQuote> {
        self.session.create_funding_quote(amount, memo).await
    }

    pub async fn poll_quote(&self, quote_id: &str) -> Result<QuoteState> {
        self.session.poll_quote(quote_id).await
    }

    pub async fn claim(&self, quote_id: &str, amount: u64) -> Result<u64> {
        let proofs = self.session.claim(quote_id, amount).await?;
        Ok(proof_total(&proofs))
    }

    /// Build and encode a send token for `amount`.
    pub async fn send(&self, amount: u64) -> Result<String> {
        self.session.build_send_token(amount).await?.encode()
    }

    pub async fn melt(&self, invoice: &str) -> Result<MeltReceipt> {
        self.session.melt(invoice).await
    }

    /// Decode and redeem an encoded token. Tokens from a different mint are
    /// redeemed through a transient session for that mint and merged into
    /// that mint's ledger bucket only.
    pub async fn receive(&self, encoded: &str) -> Result<ReceiveOutcome> {
        let token = BearerToken::decode(encoded)?;

        if token.mint == self.session.mint_url() {
            let fresh = self.session.receive(&token).await?;
            return Ok(ReceiveOutcome::Active {
                amount: proof_total(&fresh),
            });
        }

        info!(mint = %token.mint, "token minted elsewhere; redeeming through transient session");
        let api = self.factory.api_for(&token.mint)?;
        let transient = MintSession::connect(&token.mint, api, self.ledger.clone()).await?;
        let fresh = transient.receive(&token).await?;
        Ok(ReceiveOutcome::CrossMint {
            mint_url: token.mint,
            amount: proof_total(&fresh),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ledger::MemoryStore;
    use crate::proof::Proof;
    use crate::testing::ScriptedMint;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const ACTIVE: &str = "https://mint.example";
    const OTHER: &str = "https://other-mint.example";

    /// Factory handing out one scripted mint per URL.
    struct ScriptedFactory {
        mints: Mutex<HashMap<String, Arc<ScriptedMint>>>,
    }

    impl ScriptedFactory {
        fn new() -> Self {
            Self {
                mints: Mutex::new(HashMap::new()),
            }
        }

        fn mint(&self, url: &str) -> Arc<ScriptedMint> {
            self.mints
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(ScriptedMint::new()))
                .clone()
        }
    }

    impl MintApiFactory for ScriptedFactory {
        fn api_for(&self, mint_url: &str) -> Result<Arc<dyn MintApi>> {
            let api: Arc<dyn MintApi> = self.mint(mint_url);
            Ok(api)
        }
    }

    async fn facade() -> (WalletFacade, Arc<ScriptedFactory>, ProofLedger) {
        let factory = Arc::new(ScriptedFactory::new());
        let ledger = ProofLedger::new(Arc::new(MemoryStore::new()));
        let facade = WalletFacade::open(ACTIVE, factory.clone(), ledger.clone())
            .await
            .unwrap();
        (facade, factory, ledger)
    }

    #[tokio::test]
    async fn snapshot_recomputes_after_mutation() {
        let (facade, _factory, ledger) = facade().await;
        assert_eq!(facade.snapshot().await.unwrap().balance, 0);

        ledger
            .merge(ACTIVE, vec![Proof::new(21, "s", "c", "k")])
            .await
            .unwrap();
        let snapshot = facade.snapshot().await.unwrap();
        assert_eq!(snapshot.balance, 21);
        assert_eq!(snapshot.mint_url, ACTIVE);
        assert_eq!(snapshot.info.name, "scripted mint");
    }

    #[tokio::test]
    async fn receive_active_mint_token_merges_into_active_bucket() {
        let (facade, _factory, _ledger) = facade().await;
        let token = BearerToken::new(ACTIVE, "sat", vec![Proof::new(9, "ext", "c", "k")]);

        let outcome = facade.receive(&token.encode().unwrap()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Active { amount: 9 });
        assert_eq!(facade.snapshot().await.unwrap().balance, 9);
    }

    #[tokio::test]
    async fn cross_mint_receive_never_mutates_active_ledger() {
        let (facade, _factory, ledger) = facade().await;
        ledger
            .merge(ACTIVE, vec![Proof::new(50, "mine", "c", "k")])
            .await
            .unwrap();

        let token = BearerToken::new(OTHER, "sat", vec![Proof::new(30, "theirs", "c", "k")]);
        let outcome = facade.receive(&token.encode().unwrap()).await.unwrap();

        assert_eq!(
            outcome,
            ReceiveOutcome::CrossMint {
                mint_url: OTHER.to_string(),
                amount: 30
            }
        );
        // Active bucket is exactly as before; the foreign proofs landed under
        // the token's own mint.
        assert_eq!(facade.snapshot().await.unwrap().balance, 50);
        assert_eq!(ledger.balance(OTHER).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn cross_mint_receive_fails_when_foreign_mint_unreachable() {
        let (facade, factory, ledger) = facade().await;
        factory.mint(OTHER).set_unreachable(true);

        let token = BearerToken::new(OTHER, "sat", vec![Proof::new(5, "t", "c", "k")]);
        let err = facade.receive(&token.encode().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::MintUnreachable(_)));
        assert_eq!(ledger.balance(OTHER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn receive_malformed_token_fails_without_network() {
        let (facade, _factory, _ledger) = facade().await;
        let err = facade.receive("cashuAnot-a-token").await.unwrap_err();
        assert!(matches!(err, Error::MalformedToken(_)));
    }

    #[tokio::test]
    async fn send_then_receive_round_trip() {
        let (facade, _factory, ledger) = facade().await;
        ledger
            .merge(ACTIVE, vec![Proof::new(8, "s8", "c", "k"), Proof::new(4, "s4", "c", "k")])
            .await
            .unwrap();

        let encoded = facade.send(4).await.unwrap();
        assert_eq!(facade.snapshot().await.unwrap().balance, 8);

        let outcome = facade.receive(&encoded).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Active { amount: 4 });
        assert_eq!(facade.snapshot().await.unwrap().balance, 12);
    }
}
