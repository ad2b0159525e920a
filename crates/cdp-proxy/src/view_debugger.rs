//! Browser View Debugger - per-client CDP sessions on one page
//!
//! Every `attach()` opens a fresh flattened session with
//! `Target.attachToTarget`, so each client gets its own breakpoints,
//! instrumentation and event stream. Native events are routed by session id
//! to exactly one connection.
//!
//! ```text
//! client A ──▶ CDPConnection(S1) ─┐                       ┌─▶ emitter S1
//!                                 ├─▶ NativeDebugger ──▶ route
//! client B ──▶ CDPConnection(S2) ─┘                       └─▶ emitter S2
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OnceCell};

use crate::cdp::protocol::{
    AttachToTargetResult, GetTargetInfoResult, SessionId, TargetId, TargetInfo,
};
use crate::config::ProxyConfig;
use crate::debugger::{BrowserView, DebuggerMessage, ListenerId, NativeDebugger};
use crate::error::{ProxyError, Result};
use crate::events::Emitter;

/// Capability a client-facing CDP router needs from a page
#[async_trait]
pub trait CDPTarget: Send + Sync {
    /// Open an isolated session
    async fn attach(&self) -> Result<CDPConnection>;

    async fn get_target_info(&self) -> Result<TargetInfo>;
}

struct SessionEmitters {
    events: Emitter<DebuggerMessage>,
    close: Emitter<()>,
}

impl SessionEmitters {
    fn new(capacity: usize) -> Self {
        Self {
            events: Emitter::with_capacity(capacity),
            close: Emitter::with_capacity(1),
        }
    }

    fn dispose(&self) {
        self.events.dispose();
        self.close.dispose();
    }
}

type Sessions = DashMap<SessionId, Arc<SessionEmitters>>;

pub struct BrowserViewDebugger {
    view: Arc<dyn BrowserView>,
    debugger: Arc<dyn NativeDebugger>,
    config: Arc<ProxyConfig>,
    /// Shared by concurrent first callers; stays empty after a failure
    real_target_id: OnceCell<TargetId>,
    sessions: Arc<Sessions>,
    listener: Mutex<Option<ListenerId>>,
    disposed: AtomicBool,
}

impl BrowserViewDebugger {
    pub fn new(
        view: Arc<dyn BrowserView>,
        debugger: Arc<dyn NativeDebugger>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self {
            view,
            debugger,
            config,
            real_target_id: OnceCell::new(),
            sessions: Arc::new(DashMap::new()),
            listener: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Discovered target id, if initialization has completed
    pub fn real_target_id(&self) -> Option<&str> {
        self.real_target_id.get().map(String::as_str)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn attach(&self) -> Result<CDPConnection> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ProxyError::Closed);
        }
        let target_id = self.initialize().await?.clone();

        let result = self
            .debugger
            .send_command(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                None,
            )
            .await?;
        let AttachToTargetResult { session_id } = serde_json::from_value(result)?;

        if self.disposed.load(Ordering::SeqCst) {
            self.detach_session(&session_id).await;
            return Err(ProxyError::Closed);
        }

        let emitters = Arc::new(SessionEmitters::new(self.config.event_capacity));
        self.sessions.insert(session_id.clone(), emitters.clone());

        // `dispose` may have cleared the table between the check and the insert
        if self.disposed.load(Ordering::SeqCst) {
            self.sessions.remove(&session_id);
            emitters.dispose();
            self.detach_session(&session_id).await;
            return Err(ProxyError::Closed);
        }
        tracing::debug!(target_id = %target_id, session_id = %session_id, "Session attached");

        Ok(CDPConnection {
            session_id,
            emitters,
            debugger: self.debugger.clone(),
            sessions: self.sessions.clone(),
            config: self.config.clone(),
        })
    }

    async fn detach_session(&self, session_id: &str) {
        tracing::debug!(session_id, "Debugger disposed during attach, detaching session");
        if let Err(e) = self
            .debugger
            .send_command(
                "Target.detachFromTarget",
                Some(json!({ "sessionId": session_id })),
                None,
            )
            .await
        {
            tracing::debug!(session_id, "Failed to detach session: {}", e);
        }
    }

    pub async fn get_target_info(&self) -> Result<TargetInfo> {
        let target_id = self.initialize().await?.clone();
        Ok(TargetInfo {
            target_id,
            target_type: "page".to_string(),
            title: self.view.title(),
            url: self.view.url(),
            attached: !self.sessions.is_empty(),
            can_access_opener: None,
            browser_context_id: self.view.browser_context_id(),
        })
    }

    async fn initialize(&self) -> Result<&TargetId> {
        self.real_target_id
            .get_or_try_init(move || async move {
                self.attach_debugger().await?;
                self.discover_real_target_id().await.ok_or_else(|| {
                    ProxyError::TargetDiscovery("Target.getTargetInfo returned no id".to_string())
                })
            })
            .await
    }

    async fn attach_debugger(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        // `dispose` sets the flag before taking this lock
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ProxyError::Closed);
        }
        if !self.debugger.is_attached() {
            self.debugger.attach(&self.config.protocol_version).await?;
        }
        if listener.is_none() {
            let sessions = self.sessions.clone();
            *listener = Some(
                self.debugger
                    .add_listener(Arc::new(move |message| route_cdp_event(&sessions, message))),
            );
        }
        Ok(())
    }

    async fn discover_real_target_id(&self) -> Option<TargetId> {
        let result = match self
            .debugger
            .send_command("Target.getTargetInfo", None, None)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Failed to discover real target id: {}", e);
                return None;
            }
        };

        match serde_json::from_value::<GetTargetInfoResult>(result) {
            Ok(info) => {
                tracing::info!(target_id = %info.target_info.target_id, "Discovered real target id");
                Some(info.target_info.target_id)
            }
            Err(e) => {
                tracing::error!("Malformed Target.getTargetInfo result: {}", e);
                None
            }
        }
    }

    /// Release the native attachment and drop every session.
    ///
    /// Live connections are not sent a close notification; their receivers
    /// just see the channels close.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(id) = self.listener.lock().await.take() {
            self.debugger.remove_listener(id);
            if self.debugger.is_attached() {
                if let Err(e) = self.debugger.detach().await {
                    tracing::warn!("Failed to detach debugger: {}", e);
                }
            }
        }

        let emitters: Vec<Arc<SessionEmitters>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        self.sessions.clear();
        for emitter in emitters {
            emitter.dispose();
        }
    }
}

#[async_trait]
impl CDPTarget for BrowserViewDebugger {
    async fn attach(&self) -> Result<CDPConnection> {
        BrowserViewDebugger::attach(self).await
    }

    async fn get_target_info(&self) -> Result<TargetInfo> {
        BrowserViewDebugger::get_target_info(self).await
    }
}

fn route_cdp_event(sessions: &Sessions, message: DebuggerMessage) {
    let Some(session_id) = message.session_id.as_deref() else {
        // Flattened sessions always carry an id
        tracing::warn!(method = %message.method, "CDP event without session id, broadcasting");
        let all: Vec<Arc<SessionEmitters>> = sessions.iter().map(|e| e.value().clone()).collect();
        for emitters in all {
            emitters.events.fire(message.clone());
        }
        return;
    };

    let emitters = sessions.get(session_id).map(|e| e.value().clone());
    match emitters {
        Some(emitters) => {
            emitters.events.fire(message);
        }
        None => {
            tracing::trace!(session_id, method = %message.method, "Dropping event for unknown session");
        }
    }
}

/// One client's session on a `BrowserViewDebugger`
pub struct CDPConnection {
    session_id: SessionId,
    emitters: Arc<SessionEmitters>,
    debugger: Arc<dyn NativeDebugger>,
    sessions: Arc<Sessions>,
    config: Arc<ProxyConfig>,
}

impl CDPConnection {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Events routed to this session
    pub fn events(&self) -> broadcast::Receiver<DebuggerMessage> {
        self.emitters.events.subscribe()
    }

    /// Fires once when the connection is disposed
    pub fn closed(&self) -> broadcast::Receiver<()> {
        self.emitters.close.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.emitters.events.is_disposed()
    }

    pub async fn send_message(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.config.is_blocked(method) {
            tracing::debug!(session_id = %self.session_id, method, "Answering blocked method locally");
            return Ok(json!({}));
        }
        self.debugger
            .send_command(method, params, Some(&self.session_id))
            .await
    }

    /// Detach the session and notify close listeners. Safe to call repeatedly.
    pub async fn dispose(&self) {
        if self.sessions.remove(&self.session_id).is_none() {
            return;
        }

        if let Err(e) = self
            .debugger
            .send_command(
                "Target.detachFromTarget",
                Some(json!({ "sessionId": self.session_id })),
                None,
            )
            .await
        {
            tracing::debug!(session_id = %self.session_id, "Failed to detach session: {}", e);
        }

        self.emitters.close.fire(());
        self.emitters.dispose();
    }
}

impl std::fmt::Debug for CDPConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CDPConnection")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
