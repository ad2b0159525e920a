//! Remote Debugger - `NativeDebugger` over a DevTools WebSocket
//!
//! Stands in for an embedded page's debugger object when the page is only
//! reachable through its remote debugging endpoint.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use super::client::CDPClient;
use super::protocol::PROTOCOL_VERSION;
use crate::debugger::{ListenerId, Listeners, MessageListener, NativeDebugger};
use crate::error::{ProxyError, Result};

pub struct RemoteDebugger {
    ws_url: Url,
    client: tokio::sync::Mutex<Option<Arc<CDPClient>>>,
    /// Mirrors `client.is_some()` for the synchronous `is_attached`
    attached: AtomicBool,
    listeners: Arc<Listeners>,
}

impl RemoteDebugger {
    pub fn new(ws_url: &str) -> Result<Self> {
        let url = Url::parse(ws_url).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ProxyError::InvalidUrl(format!(
                "expected ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        Ok(Self {
            ws_url: url,
            client: tokio::sync::Mutex::new(None),
            attached: AtomicBool::new(false),
            listeners: Arc::new(Listeners::new()),
        })
    }

    pub fn ws_url(&self) -> &str {
        self.ws_url.as_str()
    }

    async fn client(&self) -> Result<Arc<CDPClient>> {
        self.client
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(ProxyError::NotAttached)
    }

    fn set_attached(&self, value: bool) {
        self.attached.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl NativeDebugger for RemoteDebugger {
    async fn attach(&self, protocol_version: &str) -> Result<()> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(ProxyError::UnsupportedProtocol(protocol_version.to_string()));
        }

        let mut slot = self.client.lock().await;
        if slot.as_ref().is_some_and(|c| !c.is_closed()) {
            return Err(ProxyError::AlreadyAttached);
        }

        tracing::info!(url = %self.ws_url, "Attaching remote debugger");
        let client = CDPClient::connect(self.ws_url.as_str()).await?;

        let listeners = self.listeners.clone();
        client.add_listener(Arc::new(move |event| listeners.emit(&event)));

        *slot = Some(client);
        self.set_attached(true);
        Ok(())
    }

    async fn send_command(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let client = self.client().await?;
        client
            .send_request(method, params, session_id.map(str::to_string))
            .await
    }

    async fn detach(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        self.set_attached(false);
        match client {
            Some(client) => {
                tracing::info!(url = %self.ws_url, "Detaching remote debugger");
                client.close().await
            }
            None => Err(ProxyError::NotAttached),
        }
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn add_listener(&self, listener: MessageListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}
