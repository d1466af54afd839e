//! In-process relay and wallet doubles.
//!
//! These run the full request path, signatures, encryption and correlation
//! included, without opening a socket. They are public so downstream crates
//! can drive the RPC client in their own tests.

use crate::client::{Request, Response, KIND_RESPONSE};
use crate::crypto::{conversation_key, encrypt};
use crate::error::{Error, Result};
use crate::event::{finalize_event, unix_now, verify_event, Event, EventTemplate};
use crate::keys::Keypair;
use crate::relay::{Filter, RelayTransport, TransportFactory};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use url::Url;
use uuid::Uuid;

/// Build a pairing string for a scripted wallet with a fresh client secret.
pub fn connection_string(wallet: &Keypair, relays: &[&str]) -> String {
    let client = Keypair::generate();
    let mut uri = format!(
        "nostr+walletconnect://{}?secret={}",
        wallet.public_key_hex(),
        hex::encode(client.secret_bytes())
    );
    for relay in relays {
        uri.push_str("&relay=");
        uri.push_str(relay);
    }
    uri
}

type Handler = Arc<dyn Fn(Request) -> Response + Send + Sync>;

struct ScriptedState {
    wallet: Keypair,
    handler: Handler,
    silent_relays: Mutex<HashSet<String>>,
    noise_first: AtomicBool,
    garbage_payload_first: AtomicBool,
    connections: AtomicUsize,
    requests_handled: AtomicUsize,
}

/// Factory whose relays all forward to one scripted wallet service.
#[derive(Clone)]
pub struct ScriptedWalletFactory {
    state: Arc<ScriptedState>,
}

impl ScriptedWalletFactory {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Request) -> Response + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(ScriptedState {
                wallet: Keypair::generate(),
                handler: Arc::new(handler),
                silent_relays: Mutex::new(HashSet::new()),
                noise_first: AtomicBool::new(false),
                garbage_payload_first: AtomicBool::new(false),
                connections: AtomicUsize::new(0),
                requests_handled: AtomicUsize::new(0),
            }),
        }
    }

    /// The remote wallet service's keypair.
    pub fn wallet_keypair(&self) -> &Keypair {
        &self.state.wallet
    }

    /// Mark a relay (canonical URL form) as accepting requests but never
    /// answering them.
    pub fn set_silent_relay(&self, url: &str) {
        self.state
            .silent_relays
            .try_lock()
            .expect("silent relay set before use")
            .insert(url.to_string());
    }

    /// Deliver a correlated-looking event from a stranger before the real
    /// response.
    pub fn set_noise_first(&self, value: bool) {
        self.state.noise_first.store(value, Ordering::SeqCst);
    }

    /// Deliver an undecryptable event from the wallet before the real
    /// response.
    pub fn set_garbage_payload_first(&self, value: bool) {
        self.state
            .garbage_payload_first
            .store(value, Ordering::SeqCst);
    }

    /// Number of transports opened so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Number of requests the wallet handler has answered.
    pub fn requests_handled(&self) -> usize {
        self.state.requests_handled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for ScriptedWalletFactory {
    async fn connect(&self, url: &Url, _timeout: Duration) -> Result<Arc<dyn RelayTransport>> {
        self.state.connections.fetch_add(1, Ordering::SeqCst);
        let silent = self
            .state
            .silent_relays
            .lock()
            .await
            .contains(url.as_str());
        let transport: Arc<dyn RelayTransport> = Arc::new(ScriptedTransport {
            state: Arc::clone(&self.state),
            silent,
            subscribers: Mutex::new(Vec::new()),
        });
        Ok(transport)
    }
}

struct ScriptedTransport {
    state: Arc<ScriptedState>,
    silent: bool,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<Event>)>>,
}

impl ScriptedTransport {
    async fn deliver(&self, event: Event) {
        let subscribers = self.subscribers.lock().await;
        for (_, tx) in subscribers.iter() {
            let _ = tx.send(event.clone());
        }
    }

    fn respond_to(&self, request_event: &Event) -> Result<Event> {
        let sender_pubkey: [u8; 32] = hex::decode(&request_event.pubkey)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| Error::Protocol("bad sender pubkey".to_string()))?;
        let key = conversation_key(self.state.wallet.secret_bytes(), &sender_pubkey)?;

        let plaintext = crate::crypto::decrypt(&key, &request_event.content)?;
        let request: Request = serde_json::from_str(&plaintext)?;
        let response = (self.state.handler)(request);
        self.state.requests_handled.fetch_add(1, Ordering::SeqCst);

        let content = encrypt(&key, &serde_json::to_string(&response)?)?;
        finalize_event(
            &EventTemplate {
                created_at: unix_now(),
                kind: KIND_RESPONSE,
                tags: vec![
                    vec!["p".to_string(), request_event.pubkey.clone()],
                    vec!["e".to_string(), request_event.id.clone()],
                ],
                content,
            },
            self.state.wallet.secret_bytes(),
        )
    }

    fn noise_event(&self, request_event: &Event) -> Result<Event> {
        let stranger = Keypair::generate();
        finalize_event(
            &EventTemplate {
                created_at: unix_now(),
                kind: KIND_RESPONSE,
                tags: vec![vec!["e".to_string(), request_event.id.clone()]],
                content: encrypt(&[0xAA; 32], "{\"not\":\"for you\"}")?,
            },
            stranger.secret_bytes(),
        )
    }

    fn garbage_event(&self, request_event: &Event) -> Result<Event> {
        finalize_event(
            &EventTemplate {
                created_at: unix_now(),
                kind: KIND_RESPONSE,
                tags: vec![vec!["e".to_string(), request_event.id.clone()]],
                content: "!!not a payload!!".to_string(),
            },
            self.state.wallet.secret_bytes(),
        )
    }
}

#[async_trait]
impl RelayTransport for ScriptedTransport {
    async fn publish(&self, event: &Event, _confirmation_timeout: Duration) -> Result<()> {
        if !verify_event(event)? {
            return Err(Error::PublishRejected("invalid: bad signature".to_string()));
        }
        if self.silent {
            return Ok(());
        }

        if self.state.noise_first.load(Ordering::SeqCst) {
            self.deliver(self.noise_event(event)?).await;
        }
        if self.state.garbage_payload_first.load(Ordering::SeqCst) {
            self.deliver(self.garbage_event(event)?).await;
        }
        let response = self.respond_to(event)?;
        self.deliver(response).await;
        Ok(())
    }

    async fn subscribe(&self, _filter: &Filter) -> Result<(String, mpsc::UnboundedReceiver<Event>)> {
        let subscription_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .push((subscription_id.clone(), tx));
        Ok((subscription_id, rx))
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.subscribers
            .lock()
            .await
            .retain(|(id, _)| id != subscription_id);
        Ok(())
    }

    async fn close(&self) {
        self.subscribers.lock().await.clear();
    }
}

/// Factory whose relays acknowledge everything and never deliver an event.
#[derive(Clone, Default)]
pub struct SilentFactory {
    connections: Arc<AtomicUsize>,
}

impl SilentFactory {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for SilentFactory {
    async fn connect(&self, _url: &Url, _timeout: Duration) -> Result<Arc<dyn RelayTransport>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let transport: Arc<dyn RelayTransport> = Arc::new(SilentTransport {
            subscribers: Mutex::new(Vec::new()),
        });
        Ok(transport)
    }
}

struct SilentTransport {
    // Held so subscriber channels stay open and the caller waits out its
    // deadline instead of observing a closed channel.
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
}

#[async_trait]
impl RelayTransport for SilentTransport {
    async fn publish(&self, _event: &Event, _confirmation_timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self, _filter: &Filter) -> Result<(String, mpsc::UnboundedReceiver<Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(tx);
        Ok((Uuid::new_v4().to_string(), rx))
    }

    async fn unsubscribe(&self, _subscription_id: &str) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.subscribers.lock().await.clear();
    }
}
