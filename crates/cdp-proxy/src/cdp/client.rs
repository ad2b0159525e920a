//! CDP Client - WebSocket transport to a real debugging endpoint
//!
//! Design decisions:
//! 1. Single WebSocket per endpoint; flattened sessions ride on it
//! 2. Request/response matching via ID
//! 3. Every event goes to every listener; routing by session id is the
//!    caller's job
//! 4. Fail fast - no retries, no queuing

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::*;
use crate::debugger::{ListenerId, Listeners, MessageListener};
use crate::error::{ProxyError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// CDP Client - manages single WebSocket connection
pub struct CDPClient {
    /// Monotonic request ID counter
    next_id: AtomicU64,

    /// Pending requests waiting for responses
    pending: Arc<DashMap<RequestId, oneshot::Sender<CDPResponse>>>,

    listeners: Arc<Listeners>,

    /// WebSocket write half
    ws_sink: Arc<RwLock<WsSink>>,

    /// Stops the receive loop on close
    shutdown: Mutex<Option<oneshot::Sender<()>>>,

    closed: Arc<AtomicBool>,
}

impl CDPClient {
    /// Connect to a Chrome DevTools Protocol endpoint
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            listeners: Arc::new(Listeners::new()),
            ws_sink: Arc::new(RwLock::new(sink)),
            shutdown: Mutex::new(Some(shutdown_tx)),
            closed: Arc::new(AtomicBool::new(false)),
        });

        let pending = client.pending.clone();
        let listeners = client.listeners.clone();
        let closed = client.closed.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Err(e) = handle_message(&pending, &listeners, &text) {
                                    tracing::error!("Failed to handle message: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!("WebSocket closed");
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Shutdown signal received");
                        break;
                    }
                }
            }

            closed.store(true, Ordering::SeqCst);
            // Dropping the senders fails every waiter with `Closed`
            pending.clear();
        });

        Ok(client)
    }

    /// Send CDP request and wait for response
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProxyError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CDPRequest {
            id,
            method: method.into(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        let mut sink = self.ws_sink.write().await;
        if let Err(e) = sink.send(Message::Text(json)).await {
            self.pending.remove(&id);
            return Err(ProxyError::WebSocket(e));
        }
        drop(sink); // Release lock immediately

        let response = rx.await.map_err(|_| ProxyError::Closed)?;

        if let Some(error) = response.error {
            return Err(ProxyError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Listen to every event on this connection
    pub fn add_listener(&self, listener: MessageListener) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close connection gracefully
    pub async fn close(&self) -> Result<()> {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
        self.closed.store(true, Ordering::SeqCst);
        self.pending.clear();

        let mut sink = self.ws_sink.write().await;
        sink.close().await?;
        Ok(())
    }
}

/// Handle incoming WebSocket message
fn handle_message(
    pending: &DashMap<RequestId, oneshot::Sender<CDPResponse>>,
    listeners: &Listeners,
    text: &str,
) -> Result<()> {
    let msg: CDPMessage = serde_json::from_str(text)?;

    match msg {
        CDPMessage::Response(response) => {
            if let Some((_, tx)) = pending.remove(&response.id) {
                let _ = tx.send(response); // Receiver dropped
            } else {
                tracing::warn!("Received response for unknown request: {}", response.id);
            }
        }
        CDPMessage::Event(event) => listeners.emit(&event),
    }

    Ok(())
}
