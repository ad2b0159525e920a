//! Native Debugger - the seam between the proxy and a real page debugger
//!
//! One `NativeDebugger` per debuggable page. It speaks raw CDP: commands go in
//! tagged with an optional session id, events come out the same way.
//! Nothing here knows about proxy clients.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::cdp::protocol::CDPEvent;
use crate::error::Result;

/// A protocol event pushed by the native debugger.
pub type DebuggerMessage = CDPEvent;

/// Listener invoked synchronously for every native message
pub type MessageListener = Arc<dyn Fn(DebuggerMessage) + Send + Sync>;

/// Handle returned by `add_listener`, used to unregister.
pub type ListenerId = u64;

/// Native debugger attached to a single page
///
/// Mirrors the shape of an embedded browser's debugger object:
/// attach with a protocol version, send commands, detach, and listen for
/// `message` events.
#[async_trait]
pub trait NativeDebugger: Send + Sync {
    /// Attach at the given protocol version. Fails if already attached.
    async fn attach(&self, protocol_version: &str) -> Result<()>;

    /// Send a command, optionally scoped to a flattened session
    async fn send_command(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value>;

    async fn detach(&self) -> Result<()>;

    fn is_attached(&self) -> bool;

    fn add_listener(&self, listener: MessageListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

/// Accessors for the page behind a debugger, evaluated on demand
pub trait BrowserView: Send + Sync {
    fn title(&self) -> String;

    fn url(&self) -> String;

    /// Id of the browser session (context) that owns the view
    fn browser_context_id(&self) -> Option<String>;
}

/// Plain `BrowserView` whose fields can be updated as the page navigates
#[derive(Default)]
pub struct PageInfo {
    title: RwLock<String>,
    url: RwLock<String>,
    browser_context_id: Option<String>,
}

impl PageInfo {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        browser_context_id: Option<String>,
    ) -> Self {
        Self {
            title: RwLock::new(title.into()),
            url: RwLock::new(url.into()),
            browser_context_id,
        }
    }

    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.write().unwrap_or_else(|e| e.into_inner()) = title.into();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        *self.url.write().unwrap_or_else(|e| e.into_inner()) = url.into();
    }
}

impl BrowserView for PageInfo {
    fn title(&self) -> String {
        self.title.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn url(&self) -> String {
        self.url.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn browser_context_id(&self) -> Option<String> {
        self.browser_context_id.clone()
    }
}

/// Listener table shared by the debugger implementations
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: DashMap<ListenerId, MessageListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: MessageListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(id, listener);
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver a message to every listener.
    ///
    /// Listeners are snapshotted first so a listener may add or remove
    /// listeners without deadlocking on the map.
    pub fn emit(&self, message: &DebuggerMessage) {
        let listeners: Vec<MessageListener> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        for listener in listeners {
            listener(message.clone());
        }
    }
}
