//! Debug Target - one debuggable page shared by many proxy clients
//!
//! The target owns the native debugger attachment. Clients are tracked, not
//! owned: the target only forwards events to them and disposes them when the
//! page goes away.
//!
//! Attachment is lazy (first `add_client`) and lasts until `dispose`. When
//! the last client leaves, the Debugger domain is disabled so the next client
//! starts without leftover breakpoints or instrumentation.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cdp::protocol::{SessionId, TargetId, TargetInfo};
use crate::config::ProxyConfig;
use crate::debugger::{BrowserView, ListenerId, NativeDebugger};
use crate::error::{ProxyError, Result};

pub type ClientId = Uuid;

/// A proxy client as seen by a target
pub trait DebugClient: Send + Sync {
    fn id(&self) -> ClientId;

    /// Whether the client has attached its page session to this target
    fn page_attached(&self) -> bool;

    fn page_session_id(&self) -> Option<SessionId>;

    /// Deliver a protocol event to the client
    fn send_event(&self, method: &str, params: Option<&Value>, session_id: Option<&str>);

    fn dispose(&self);
}

type Clients = DashMap<ClientId, Arc<dyn DebugClient>>;

pub struct DebugTarget {
    target_id: TargetId,
    view: Arc<dyn BrowserView>,
    debugger: Arc<dyn NativeDebugger>,
    config: Arc<ProxyConfig>,
    clients: Arc<Clients>,
    /// Set while attached; held across the native attach so it runs once
    listener: Mutex<Option<ListenerId>>,
    attached: AtomicBool,
    disposed: AtomicBool,
}

impl DebugTarget {
    pub fn new(
        target_id: impl Into<TargetId>,
        view: Arc<dyn BrowserView>,
        debugger: Arc<dyn NativeDebugger>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            view,
            debugger,
            config,
            clients: Arc::new(DashMap::new()),
            listener: Mutex::new(None),
            attached: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn title(&self) -> String {
        self.view.title()
    }

    pub fn url(&self) -> String {
        self.view.url()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Attach the native debugger and start broadcasting its events.
    /// No-op when already attached. Fails once the target is disposed.
    pub async fn attach_debugger(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }
        // `dispose` sets the flag before taking this lock
        if self.is_disposed() {
            return Err(ProxyError::Closed);
        }

        self.debugger.attach(&self.config.protocol_version).await?;

        let clients = self.clients.clone();
        let id = self.debugger.add_listener(Arc::new(move |message| {
            broadcast_cdp_event(&clients, &message.method, message.params.as_ref());
        }));
        *listener = Some(id);
        self.attached.store(true, Ordering::SeqCst);

        tracing::debug!(target_id = %self.target_id, "Native debugger attached");
        Ok(())
    }

    pub async fn send_command(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.debugger.send_command(method, params, None).await
    }

    /// Track a client, attaching the debugger first if needed.
    ///
    /// Returns `false` if the client was already connected, and
    /// `ProxyError::Closed` once the target is disposed.
    pub async fn add_client(&self, client: Arc<dyn DebugClient>) -> Result<bool> {
        if self.is_disposed() {
            return Err(ProxyError::Closed);
        }
        self.attach_debugger().await?;

        let id = client.id();
        if self.clients.contains_key(&id) {
            return Ok(false);
        }
        self.clients.insert(id, client);
        if self.is_disposed() {
            // `dispose` cleared the set while we were attaching
            self.clients.remove(&id);
            return Err(ProxyError::Closed);
        }
        tracing::debug!(target_id = %self.target_id, client_id = %id, "Client connected");
        Ok(true)
    }

    /// Stop tracking a client. Returns whether it was connected.
    pub async fn remove_client(&self, client_id: ClientId) -> bool {
        if self.clients.remove(&client_id).is_none() {
            return false;
        }
        tracing::debug!(target_id = %self.target_id, client_id = %client_id, "Client disconnected");

        if self.clients.is_empty() && self.is_attached() {
            // Clears breakpoints and instrumentation left by the last client
            if let Err(e) = self
                .debugger
                .send_command("Debugger.disable", None, None)
                .await
            {
                tracing::debug!(target_id = %self.target_id, "Debugger.disable failed: {}", e);
            }
        }
        true
    }

    /// Snapshot for `Target.getTargets`. `attached` is per client, so always
    /// false here.
    pub fn get_target_info(&self) -> TargetInfo {
        TargetInfo {
            target_id: self.target_id.clone(),
            target_type: "page".to_string(),
            title: self.title(),
            url: self.url(),
            attached: false,
            can_access_opener: Some(false),
            browser_context_id: None,
        }
    }

    /// Dispose every client, then release the native attachment.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let clients: Vec<Arc<dyn DebugClient>> =
            self.clients.iter().map(|e| e.value().clone()).collect();
        self.clients.clear();
        for client in clients {
            client.dispose();
        }

        let listener = self.listener.lock().await.take();
        if let Some(id) = listener {
            self.debugger.remove_listener(id);
            self.attached.store(false, Ordering::SeqCst);
            if let Err(e) = self.debugger.detach().await {
                tracing::error!(target_id = %self.target_id, "Failed to detach debugger: {}", e);
            }
        }
    }
}

fn broadcast_cdp_event(clients: &Clients, method: &str, params: Option<&Value>) {
    let recipients: Vec<Arc<dyn DebugClient>> =
        clients.iter().map(|e| e.value().clone()).collect();
    for client in recipients {
        if client.page_attached() {
            let session_id = client.page_session_id();
            client.send_event(method, params, session_id.as_deref());
        }
    }
}
