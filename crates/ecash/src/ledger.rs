//! Persistent per-mint proof ledger.
//!
//! The ledger is the sole source of truth for spendable proofs. Every mutation
//! goes through [`ProofLedger`], which serializes writers behind an async
//! mutex and persists the full document atomically through an injected
//! [`LedgerStore`] before returning. Balance is always recomputed from the
//! stored set, never cached.

use crate::canonical_mint_url;
use crate::error::{Error, Result};
use crate::proof::{proof_total, Proof};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Per-mint proof sets as persisted: canonical mint URL -> ordered proofs.
pub type LedgerDocument = BTreeMap<String, Vec<Proof>>;

/// Storage capability injected into the ledger.
///
/// Implementations must make `save` atomic: a concurrent reader sees either
/// the previous document or the new one, never a partial write.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self) -> Result<LedgerDocument>;
    async fn save(&self, doc: &LedgerDocument) -> Result<()>;
}

/// In-memory store for tests and ephemeral wallets.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<LedgerDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self) -> Result<LedgerDocument> {
        Ok(self.doc.lock().await.clone())
    }

    async fn save(&self, doc: &LedgerDocument) -> Result<()> {
        *self.doc.lock().await = doc.clone();
        Ok(())
    }
}

/// JSON file store with write-to-temp-then-rename persistence.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for FileStore {
    async fn load(&self) -> Result<LedgerDocument> {
        if !self.path.exists() {
            return Ok(LedgerDocument::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let doc = serde_json::from_str(&contents)
            .map_err(|e| Error::Store(format!("corrupt ledger file: {}", e)))?;
        Ok(doc)
    }

    async fn save(&self, doc: &LedgerDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(doc)?;
        // Rename is atomic on the same filesystem; readers never observe a
        // half-written document.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Handle to the proof ledger. Cheap to clone; all clones share the same
/// mutation lock and store.
#[derive(Clone)]
pub struct ProofLedger {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn LedgerStore>,
    // Serializes load-mutate-save cycles so no two mutations interleave.
    write_lock: Mutex<()>,
}

impl ProofLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Proofs currently stored for a mint.
    pub async fn load(&self, mint_url: &str) -> Result<Vec<Proof>> {
        let doc = self.inner.store.load().await?;
        Ok(doc
            .get(&canonical_mint_url(mint_url))
            .cloned()
            .unwrap_or_default())
    }

    /// Replace the stored set for a mint wholesale.
    pub async fn replace(&self, mint_url: &str, proofs: Vec<Proof>) -> Result<()> {
        let key = canonical_mint_url(mint_url);
        let _guard = self.inner.write_lock.lock().await;
        let mut doc = self.inner.store.load().await?;
        if proofs.is_empty() {
            doc.remove(&key);
        } else {
            doc.insert(key, proofs);
        }
        self.inner.store.save(&doc).await
    }

    /// Append proofs for a mint, removing duplicates by secret and keeping the
    /// earliest occurrence. Idempotent: merging the same set twice stores the
    /// same result as merging it once. Returns the number of proofs actually
    /// appended.
    pub async fn merge(&self, mint_url: &str, proofs: Vec<Proof>) -> Result<usize> {
        let key = canonical_mint_url(mint_url);
        let _guard = self.inner.write_lock.lock().await;
        let mut doc = self.inner.store.load().await?;
        let entry = doc.entry(key.clone()).or_default();

        let mut seen: HashSet<String> = entry.iter().map(|p| p.secret.clone()).collect();
        let mut appended = 0;
        for proof in proofs {
            if seen.insert(proof.secret.clone()) {
                entry.push(proof);
                appended += 1;
            }
        }

        if appended > 0 {
            debug!(mint = %key, appended, "merged proofs into ledger");
        }
        self.inner.store.save(&doc).await?;
        Ok(appended)
    }

    /// Drop all proofs for a mint.
    pub async fn clear(&self, mint_url: &str) -> Result<()> {
        let key = canonical_mint_url(mint_url);
        let _guard = self.inner.write_lock.lock().await;
        let mut doc = self.inner.store.load().await?;
        doc.remove(&key);
        self.inner.store.save(&doc).await
    }

    /// Sum of proof amounts stored for a mint, recomputed from the store.
    pub async fn balance(&self, mint_url: &str) -> Result<u64> {
        Ok(proof_total(&self.load(mint_url).await?))
    }

    /// Mints with at least one stored proof.
    pub async fn mints(&self) -> Result<Vec<String>> {
        let doc = self.inner.store.load().await?;
        Ok(doc.keys().cloned().collect())
    }
}
