//! Encrypted RPC over the wallet-connect channel.
//!
//! Every call is a signed request event published to a relay and answered by
//! a correlated response event from the remote wallet service. Relays are
//! tried in pairing-string order; a relay that fails or stays silent past
//! its deadline is skipped in favor of the next one.

use crate::crypto::{conversation_key, decrypt, encrypt};
use crate::error::{Error, Result};
use crate::event::{finalize_event, unix_now, verify_event, Event, EventTemplate};
use crate::relay::{Filter, RelayTransport, TransportFactory};
use crate::uri::ConnectionDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// Event kind for client requests.
pub const KIND_REQUEST: u16 = 23194;
/// Event kind for wallet responses.
pub const KIND_RESPONSE: u16 = 23195;
/// Event kind for the wallet's capability announcement.
pub const KIND_INFO: u16 = 13194;

/// Clock skew tolerated when bounding the response subscription window.
const RESPONSE_WINDOW_SKEW_SECS: u64 = 300;

/// Plaintext request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub params: Value,
}

/// Plaintext response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub result_type: String,
    #[serde(default)]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub result: Option<Value>,
}

/// Error payload inside a response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

/// `get_info` result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletInfo {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub pubkey: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BalanceResult {
    /// Balance in millisatoshis
    balance: u64,
}

/// `pay_invoice` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub preimage: String,
    #[serde(default)]
    pub fees_paid: Option<u64>,
}

/// `make_invoice` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub invoice: String,
    #[serde(default)]
    pub payment_hash: Option<String>,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for a single relay attempt: connect, publish ack, response.
    pub per_relay_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            per_relay_timeout: Duration::from_secs(10),
        }
    }
}

/// RPC client bound to one pairing string.
pub struct NwcClient {
    descriptor: ConnectionDescriptor,
    factory: Arc<dyn TransportFactory>,
    config: ClientConfig,
    conversation_key: [u8; 32],
    live: Mutex<Option<(Url, Arc<dyn RelayTransport>)>>,
    cancel: Notify,
    closed: AtomicBool,
}

impl NwcClient {
    pub fn new(
        descriptor: ConnectionDescriptor,
        factory: Arc<dyn TransportFactory>,
        config: ClientConfig,
    ) -> Result<Self> {
        let conversation_key = conversation_key(
            descriptor.keypair().secret_bytes(),
            descriptor.remote_pubkey(),
        )?;
        Ok(Self {
            descriptor,
            factory,
            config,
            conversation_key,
            live: Mutex::new(None),
            cancel: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Issue one RPC call, failing over across the descriptor's relays.
    ///
    /// A response carrying an error envelope is authoritative and returned
    /// immediately; only transport failures and silence move on to the next
    /// relay.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        let request = Request {
            method: method.to_string(),
            params,
        };
        let plaintext = serde_json::to_string(&request)?;

        let mut last_error = Error::Timeout("no relay produced a response".to_string());
        for relay in self.descriptor.relays() {
            if self.closed.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            let attempt = self.attempt_on_relay(relay, method, &plaintext);
            let outcome = tokio::select! {
                _ = self.cancel.notified() => return Err(Error::Cancelled),
                outcome = timeout(self.config.per_relay_timeout, attempt) => outcome,
            };

            match outcome {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e @ Error::Rpc { .. })) => return Err(e),
                Ok(Err(e)) => {
                    warn!("relay {relay} failed for {method}: {e}");
                    self.drop_live(relay).await;
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        "relay {relay} produced no response for {method} within {:?}",
                        self.config.per_relay_timeout
                    );
                    self.drop_live(relay).await;
                    last_error = Error::Timeout(format!(
                        "no response from {relay} within {:?}",
                        self.config.per_relay_timeout
                    ));
                }
            }
        }

        Err(last_error)
    }

    async fn attempt_on_relay(&self, relay: &Url, method: &str, plaintext: &str) -> Result<Value> {
        let transport = self.transport_for(relay).await?;

        // Fresh event per attempt so each relay sees an unseen id.
        let content = encrypt(&self.conversation_key, plaintext)?;
        let event = finalize_event(
            &EventTemplate {
                created_at: unix_now(),
                kind: KIND_REQUEST,
                tags: vec![vec![
                    "p".to_string(),
                    self.descriptor.remote_pubkey_hex().to_string(),
                ]],
                content,
            },
            self.descriptor.keypair().secret_bytes(),
        )?;

        // Subscribe before publishing so a fast response cannot slip by.
        let filter = Filter::new()
            .kinds(vec![KIND_RESPONSE])
            .authors(vec![self.descriptor.remote_pubkey_hex().to_string()])
            .since(event.created_at.saturating_sub(RESPONSE_WINDOW_SKEW_SECS))
            .event_ref(&event.id);
        let (subscription_id, mut events) = transport.subscribe(&filter).await?;

        let result = async {
            transport
                .publish(&event, self.config.per_relay_timeout)
                .await?;
            debug!("published {method} request {} to {relay}", event.id);

            loop {
                let response_event = events
                    .recv()
                    .await
                    .ok_or_else(|| Error::WebSocket("subscription closed".to_string()))?;
                match self.decode_response(&response_event, &event.id) {
                    Ok(Some(response)) => {
                        if let Some(error) = response.error {
                            return Err(Error::Rpc {
                                code: error.code,
                                message: error.message,
                            });
                        }
                        return Ok(response.result.unwrap_or(Value::Null));
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("discarding response event on {relay}: {e}");
                        continue;
                    }
                }
            }
        }
        .await;

        let _ = transport.unsubscribe(&subscription_id).await;
        result
    }

    /// Decode one candidate response event. `Ok(None)` means the event is
    /// not a response to our request and the wait should continue.
    fn decode_response(&self, event: &Event, request_id: &str) -> Result<Option<Response>> {
        if event.pubkey != self.descriptor.remote_pubkey_hex() {
            debug!("ignoring response from foreign sender {}", event.pubkey);
            return Ok(None);
        }
        if event.tag_value("e") != Some(request_id) {
            debug!("ignoring response correlated to another request");
            return Ok(None);
        }
        if !verify_event(event)? {
            return Err(Error::Protocol("invalid response signature".to_string()));
        }
        let plaintext = decrypt(&self.conversation_key, &event.content)?;
        Ok(Some(serde_json::from_str(&plaintext)?))
    }

    async fn transport_for(&self, relay: &Url) -> Result<Arc<dyn RelayTransport>> {
        let mut live = self.live.lock().await;
        if let Some((url, transport)) = live.as_ref() {
            if url == relay {
                return Ok(Arc::clone(transport));
            }
            transport.close().await;
            *live = None;
        }

        let transport = self
            .factory
            .connect(relay, self.config.per_relay_timeout)
            .await?;
        *live = Some((relay.clone(), Arc::clone(&transport)));
        Ok(transport)
    }

    async fn drop_live(&self, relay: &Url) {
        let mut live = self.live.lock().await;
        if let Some((url, transport)) = live.take() {
            if &url == relay {
                transport.close().await;
            } else {
                *live = Some((url, transport));
            }
        }
    }

    /// Query the remote wallet's capabilities.
    pub async fn get_info(&self) -> Result<WalletInfo> {
        let result = self.request("get_info", serde_json::json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Remote wallet balance in millisatoshis.
    pub async fn get_balance(&self) -> Result<u64> {
        let result = self.request("get_balance", serde_json::json!({})).await?;
        let balance: BalanceResult = serde_json::from_value(result)?;
        Ok(balance.balance)
    }

    /// Pay a bolt11 invoice from the remote wallet.
    pub async fn pay_invoice(&self, invoice: &str) -> Result<PaymentReceipt> {
        let result = self
            .request("pay_invoice", serde_json::json!({ "invoice": invoice }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Ask the remote wallet to create an invoice for `amount_msats`.
    pub async fn make_invoice(
        &self,
        amount_msats: u64,
        description: Option<&str>,
    ) -> Result<CreatedInvoice> {
        let mut params = serde_json::json!({ "amount": amount_msats });
        if let Some(description) = description {
            params["description"] = Value::String(description.to_string());
        }
        let result = self.request("make_invoice", params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Abort in-flight calls and refuse new ones.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.notify_waiters();
        if let Some((_, transport)) = self.live.lock().await.take() {
            transport.close().await;
        }
    }
}
