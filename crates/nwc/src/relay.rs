//! Relay transport.
//!
//! A thin client for the subset of the relay protocol the wallet-connect
//! channel needs: publish an event and wait for the acknowledgement frame,
//! and subscribe to a filter with events delivered over a channel. The
//! transport is behind a trait so the RPC client can run against scripted
//! relays in tests.

use crate::error::{Error, Result};
use crate::event::Event;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Subscription filter.
///
/// Tag queries are flattened into the filter object with a `#` prefix, e.g.
/// `{"#e": ["..."]}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Match events carrying an `e` tag referencing the given event id.
    pub fn event_ref(mut self, event_id: &str) -> Self {
        self.tags
            .entry("#e".to_string())
            .or_default()
            .push(event_id.to_string());
        self
    }
}

/// A live connection to one relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Publish an event and wait for the relay's acknowledgement.
    async fn publish(&self, event: &Event, confirmation_timeout: Duration) -> Result<()>;

    /// Open a subscription; matching events arrive on the returned channel.
    /// The channel closes when the connection drops.
    async fn subscribe(&self, filter: &Filter) -> Result<(String, mpsc::UnboundedReceiver<Event>)>;

    /// Close a subscription.
    async fn unsubscribe(&self, subscription_id: &str) -> Result<()>;

    /// Tear down the connection.
    async fn close(&self);
}

/// Opens transports; swapped out for scripted transports in tests.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, url: &Url, connect_timeout: Duration)
        -> Result<Arc<dyn RelayTransport>>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<(bool, String)>>>>;
type Subscriptions = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Event>>>>;

/// WebSocket transport.
pub struct WsTransport {
    url: Url,
    sink: Arc<Mutex<Option<WsSink>>>,
    pending_acks: PendingAcks,
    subscriptions: Subscriptions,
    recv_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WsTransport {
    /// Connect to a relay, bounded by the given timeout.
    pub async fn connect(url: &Url, connect_timeout: Duration) -> Result<Arc<Self>> {
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::InvalidUrl(format!(
                "relay URL must use ws:// or wss://, got: {}",
                url.scheme()
            )));
        }

        debug!("connecting to relay: {url}");
        let ws = match timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => return Err(Error::WebSocket(e.to_string())),
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "connect timeout after {connect_timeout:?}"
                )))
            }
        };

        let (sink, source) = ws.split();
        let transport = Arc::new(Self {
            url: url.clone(),
            sink: Arc::new(Mutex::new(Some(sink))),
            pending_acks: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            recv_task: Mutex::new(None),
        });

        let handle = tokio::spawn(recv_loop(
            source,
            transport.url.to_string(),
            Arc::clone(&transport.sink),
            Arc::clone(&transport.pending_acks),
            Arc::clone(&transport.subscriptions),
        ));
        *transport.recv_task.lock().await = Some(handle);

        Ok(transport)
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => sink
                .send(Message::Text(text))
                .await
                .map_err(|e| Error::WebSocket(e.to_string())),
            None => Err(Error::NotConnected),
        }
    }
}

#[async_trait]
impl RelayTransport for WsTransport {
    async fn publish(&self, event: &Event, confirmation_timeout: Duration) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.pending_acks.lock().await.insert(event.id.clone(), tx);

        let msg = serde_json::to_string(&json!(["EVENT", event]))?;
        if let Err(e) = self.send_text(msg).await {
            self.pending_acks.lock().await.remove(&event.id);
            return Err(e);
        }

        match timeout(confirmation_timeout, rx).await {
            Ok(Ok((true, _))) => Ok(()),
            Ok(Ok((false, message))) => Err(Error::PublishRejected(message)),
            Ok(Err(_)) => Err(Error::WebSocket("connection closed".to_string())),
            Err(_) => {
                self.pending_acks.lock().await.remove(&event.id);
                Err(Error::Timeout(format!(
                    "no acknowledgement after {confirmation_timeout:?}"
                )))
            }
        }
    }

    async fn subscribe(&self, filter: &Filter) -> Result<(String, mpsc::UnboundedReceiver<Event>)> {
        let subscription_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .lock()
            .await
            .insert(subscription_id.clone(), tx);

        let msg = serde_json::to_string(&json!(["REQ", subscription_id, filter]))?;
        if let Err(e) = self.send_text(msg).await {
            self.subscriptions.lock().await.remove(&subscription_id);
            return Err(e);
        }

        Ok((subscription_id, rx))
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.subscriptions.lock().await.remove(subscription_id);
        let msg = serde_json::to_string(&json!(["CLOSE", subscription_id]))?;
        self.send_text(msg).await
    }

    async fn close(&self) {
        if let Some(handle) = self.recv_task.lock().await.take() {
            handle.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        // Dropping the senders closes every subscriber channel.
        self.subscriptions.lock().await.clear();
        self.pending_acks.lock().await.clear();
    }
}

async fn recv_loop(
    mut source: WsSource,
    url: String,
    sink: Arc<Mutex<Option<WsSink>>>,
    pending_acks: PendingAcks,
    subscriptions: Subscriptions,
) {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => match parse_relay_message(&text) {
                Ok(Some(RelayMessage::Ok(event_id, accepted, message))) => {
                    if let Some(tx) = pending_acks.lock().await.remove(&event_id) {
                        let _ = tx.send((accepted, message));
                    }
                }
                Ok(Some(RelayMessage::Event(sub_id, event))) => {
                    let mut subs = subscriptions.lock().await;
                    if let Some(tx) = subs.get(&sub_id) {
                        if tx.send(event).is_err() {
                            debug!("subscription {sub_id} receiver dropped, removing");
                            subs.remove(&sub_id);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("unparseable frame from {url}: {e}"),
            },
            Some(Ok(Message::Ping(data))) => {
                let mut sink = sink.lock().await;
                if let Some(sink) = sink.as_mut() {
                    let _ = sink.send(Message::Pong(data)).await;
                }
            }
            Some(Ok(Message::Close(_))) => {
                debug!("relay {url} closed connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("websocket error from {url}: {e}");
                break;
            }
            None => break,
        }
    }

    // Surface the disconnect to subscribers and publishers in flight.
    subscriptions.lock().await.clear();
    pending_acks.lock().await.clear();
}

enum RelayMessage {
    Event(String, Event),
    Ok(String, bool, String),
}

fn parse_relay_message(text: &str) -> Result<Option<RelayMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let arr = match value.as_array() {
        Some(a) if !a.is_empty() => a,
        _ => return Ok(None),
    };
    let msg_type = match arr[0].as_str() {
        Some(t) => t,
        None => return Ok(None),
    };

    match msg_type {
        "EVENT" => {
            if arr.len() < 3 {
                return Err(Error::Protocol("EVENT frame requires 3 elements".into()));
            }
            let sub_id = arr[1]
                .as_str()
                .ok_or_else(|| Error::Protocol("EVENT subscription id must be a string".into()))?
                .to_string();
            let event: Event = serde_json::from_value(arr[2].clone())?;
            Ok(Some(RelayMessage::Event(sub_id, event)))
        }
        "OK" => {
            if arr.len() < 4 {
                return Err(Error::Protocol("OK frame requires 4 elements".into()));
            }
            let event_id = arr[1]
                .as_str()
                .ok_or_else(|| Error::Protocol("OK event id must be a string".into()))?
                .to_string();
            let accepted = arr[2]
                .as_bool()
                .ok_or_else(|| Error::Protocol("OK accepted field must be a boolean".into()))?;
            let message = arr[3].as_str().unwrap_or_default().to_string();
            Ok(Some(RelayMessage::Ok(event_id, accepted, message)))
        }
        // EOSE and NOTICE carry nothing the RPC channel acts on.
        _ => Ok(None),
    }
}

/// Factory producing [`WsTransport`] connections.
#[derive(Debug, Clone, Default)]
pub struct WsTransportFactory;

#[async_trait]
impl TransportFactory for WsTransportFactory {
    async fn connect(
        &self,
        url: &Url,
        connect_timeout: Duration,
    ) -> Result<Arc<dyn RelayTransport>> {
        let transport = WsTransport::connect(url, connect_timeout).await?;
        let transport: Arc<dyn RelayTransport> = transport;
        Ok(transport)
    }
}
