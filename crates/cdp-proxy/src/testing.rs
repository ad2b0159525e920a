//! In-memory `NativeDebugger` for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::debugger::{DebuggerMessage, ListenerId, Listeners, MessageListener, NativeDebugger};
use crate::error::{ProxyError, Result};
use crate::target::{ClientId, DebugClient};
use uuid::Uuid;

pub const REAL_TARGET_ID: &str = "real-target";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    pub method: String,
    pub params: Option<Value>,
    pub session_id: Option<String>,
}

#[derive(Default)]
pub struct MockDebugger {
    attached: AtomicBool,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,
    next_session: AtomicUsize,
    commands: Mutex<Vec<RecordedCommand>>,
    failing: Mutex<HashSet<String>>,
    responses: Mutex<HashMap<String, Value>>,
    command_delay: Mutex<Option<Duration>>,
    attached_version: Mutex<Option<String>>,
    fail_detach: AtomicBool,
    listeners: Listeners,
}

impl MockDebugger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }

    /// Protocol version passed to the last `attach`
    pub fn attached_version(&self) -> Option<String> {
        self.attached_version.lock().unwrap().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.commands().iter().filter(|c| c.method == method).count()
    }

    /// Make every call to `method` fail with a protocol error
    pub fn fail(&self, method: &str) {
        self.failing.lock().unwrap().insert(method.to_string());
    }

    pub fn succeed(&self, method: &str) {
        self.failing.lock().unwrap().remove(method);
    }

    pub fn fail_detach(&self) {
        self.fail_detach.store(true, Ordering::SeqCst);
    }

    pub fn respond(&self, method: &str, result: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(method.to_string(), result);
    }

    /// Suspend every command for `delay` before answering
    pub fn delay_commands(&self, delay: Duration) {
        *self.command_delay.lock().unwrap() = Some(delay);
    }

    pub fn emit(&self, method: &str, params: Value, session_id: Option<&str>) {
        self.listeners.emit(&DebuggerMessage {
            method: method.to_string(),
            params: Some(params),
            session_id: session_id.map(str::to_string),
        });
    }
}

#[async_trait]
impl NativeDebugger for MockDebugger {
    async fn attach(&self, protocol_version: &str) -> Result<()> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        *self.attached_version.lock().unwrap() = Some(protocol_version.to_string());
        if self.attached.swap(true, Ordering::SeqCst) {
            return Err(ProxyError::AlreadyAttached);
        }
        Ok(())
    }

    async fn send_command(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value> {
        self.commands.lock().unwrap().push(RecordedCommand {
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        });

        let delay = *self.command_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(method) {
            return Err(ProxyError::Protocol {
                code: -32000,
                message: format!("{} failed", method),
            });
        }
        if let Some(result) = self.responses.lock().unwrap().get(method) {
            return Ok(result.clone());
        }

        Ok(match method {
            "Target.getTargetInfo" => json!({
                "targetInfo": {
                    "targetId": REAL_TARGET_ID,
                    "type": "page",
                    "title": "",
                    "url": "about:blank",
                    "attached": true
                }
            }),
            "Target.attachToTarget" => {
                let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
                json!({ "sessionId": format!("session-{}", n) })
            }
            _ => json!({}),
        })
    }

    async fn detach(&self) -> Result<()> {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        self.attached.store(false, Ordering::SeqCst);
        if self.fail_detach.load(Ordering::SeqCst) {
            return Err(ProxyError::Closed);
        }
        Ok(())
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

/// `DebugClient` that records what it receives
pub struct RecordingClient {
    id: ClientId,
    page_attached: AtomicBool,
    page_session_id: Option<String>,
    events: Mutex<Vec<(String, Option<Value>, Option<String>)>>,
    disposals: AtomicUsize,
}

impl RecordingClient {
    pub fn new(page_attached: bool, page_session_id: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::now_v7(),
            page_attached: AtomicBool::new(page_attached),
            page_session_id: page_session_id.map(str::to_string),
            events: Mutex::new(Vec::new()),
            disposals: AtomicUsize::new(0),
        })
    }

    pub fn set_page_attached(&self, value: bool) {
        self.page_attached.store(value, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(String, Option<Value>, Option<String>)> {
        self.events.lock().unwrap().clone()
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl DebugClient for RecordingClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn page_attached(&self) -> bool {
        self.page_attached.load(Ordering::SeqCst)
    }

    fn page_session_id(&self) -> Option<String> {
        self.page_session_id.clone()
    }

    fn send_event(&self, method: &str, params: Option<&Value>, session_id: Option<&str>) {
        self.events.lock().unwrap().push((
            method.to_string(),
            params.cloned(),
            session_id.map(str::to_string),
        ));
    }

    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}
