//! Router - answers client requests and carries events back to clients
//!
//! Requests for methods in the `MethodRegistry` are answered locally,
//! everything else goes over the client's own `CDPConnection`.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cdp::protocol::{CDPEvent, CDPRequest, RequestId, SessionId};
use crate::config::ProxyConfig;
use crate::domains::{MethodContext, MethodRegistry};
use crate::error::{ProxyError, Result};
use crate::target::{ClientId, DebugClient};
use crate::view_debugger::CDPConnection;

pub struct Router {
    registry: MethodRegistry,
    config: Arc<ProxyConfig>,
}

impl Router {
    pub fn new(registry: MethodRegistry, config: Arc<ProxyConfig>) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Handle one client request
    pub async fn handle(
        &self,
        request: &CDPRequest,
        connection: Option<&CDPConnection>,
    ) -> Result<Value> {
        if self.registry.contains(&request.method) {
            let ctx = MethodContext {
                session_id: request.session_id.as_deref(),
                config: &self.config,
            };
            return self
                .registry
                .dispatch(&request.method, request.params.as_ref(), &ctx)
                .map(|r| r.result);
        }

        match connection {
            Some(connection) => {
                connection
                    .send_message(&request.method, request.params.clone())
                    .await
            }
            None => {
                tracing::debug!(method = %request.method, "No session for request");
                Err(ProxyError::NoSession)
            }
        }
    }

    /// Response envelope for a handled request
    pub fn response(id: RequestId, result: Result<Value>) -> Value {
        match result {
            Ok(result) => json!({ "id": id, "result": result }),
            Err(e) => {
                let message = match &e {
                    ProxyError::Protocol { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                json!({ "id": id, "error": { "code": e.code(), "message": message } })
            }
        }
    }
}

/// A connected CDP client
///
/// Events pushed by a `DebugTarget` come out of the receiver returned by
/// `new` as JSON messages, ready to write to the client's socket.
pub struct ClientSession {
    id: ClientId,
    page_session: RwLock<Option<SessionId>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Value>>>,
}

impl ClientSession {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: Uuid::now_v7(),
            page_session: RwLock::new(None),
            outbound: Mutex::new(Some(tx)),
        });
        (session, rx)
    }

    /// Mark the client's page session as attached
    pub fn attach_page(&self, session_id: impl Into<SessionId>) {
        *self.page_session.write().unwrap_or_else(|e| e.into_inner()) = Some(session_id.into());
    }

    pub fn detach_page(&self) {
        *self.page_session.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

impl DebugClient for ClientSession {
    fn id(&self) -> ClientId {
        self.id
    }

    fn page_attached(&self) -> bool {
        self.page_session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn page_session_id(&self) -> Option<SessionId> {
        self.page_session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn send_event(&self, method: &str, params: Option<&Value>, session_id: Option<&str>) {
        let event = CDPEvent {
            method: method.to_string(),
            params: params.cloned(),
            session_id: session_id.map(str::to_string),
        };
        let message = match serde_json::to_value(&event) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(method, "Failed to serialize event: {}", e);
                return;
            }
        };

        let outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = outbound.as_ref() {
            if tx.send(message).is_err() {
                tracing::debug!(client_id = %self.id, "Client receiver dropped");
            }
        }
    }

    fn dispose(&self) {
        let sender = self
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if sender.is_some() {
            tracing::debug!(client_id = %self.id, "Client session disposed");
        }
        self.detach_page();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::PageInfo;
    use crate::target::DebugTarget;
    use crate::testing::MockDebugger;
    use crate::view_debugger::BrowserViewDebugger;

    fn router() -> Router {
        Router::new(
            MethodRegistry::with_defaults().unwrap(),
            Arc::new(ProxyConfig::default()),
        )
    }

    fn request(method: &str, params: Option<Value>) -> CDPRequest {
        CDPRequest {
            id: 1,
            method: method.to_string(),
            params,
            session_id: None,
        }
    }

    #[tokio::test]
    async fn local_methods_never_need_a_session() {
        let router = router();
        let version = router
            .handle(&request("Browser.getVersion", None), None)
            .await
            .unwrap();
        assert_eq!(version["protocolVersion"], "1.3");
    }

    #[tokio::test]
    async fn other_methods_go_over_the_connection() {
        let debugger = MockDebugger::new();
        debugger.respond("Page.navigate", json!({ "frameId": "F1" }));
        let bvd = BrowserViewDebugger::new(
            Arc::new(PageInfo::default()),
            debugger.clone(),
            Arc::new(ProxyConfig::default()),
        );
        let conn = bvd.attach().await.unwrap();
        let router = router();

        let req = request("Page.navigate", Some(json!({ "url": "https://example.com/" })));
        let result = router.handle(&req, Some(&conn)).await.unwrap();
        assert_eq!(result, json!({ "frameId": "F1" }));

        let sent = debugger.commands().pop().unwrap();
        assert_eq!(sent.session_id.as_deref(), Some(conn.session_id()));
        assert_eq!(sent.params, req.params);

        assert!(matches!(
            router.handle(&req, None).await,
            Err(ProxyError::NoSession)
        ));
    }

    #[test]
    fn response_envelopes() {
        assert_eq!(
            Router::response(4, Ok(json!({}))),
            json!({ "id": 4, "result": {} })
        );
        assert_eq!(
            Router::response(
                5,
                Err(ProxyError::Protocol {
                    code: -32602,
                    message: "Invalid params".into()
                })
            ),
            json!({ "id": 5, "error": { "code": -32602, "message": "Invalid params" } })
        );
        let not_found = Router::response(6, Err(ProxyError::MethodNotFound("X.y".into())));
        assert_eq!(not_found["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn client_session_receives_target_events_once_page_attached() {
        let debugger = MockDebugger::new();
        let target = DebugTarget::new(
            "t1",
            Arc::new(PageInfo::default()),
            debugger.clone(),
            Arc::new(ProxyConfig::default()),
        );
        let (client, mut rx) = ClientSession::new();
        target.add_client(client.clone()).await.unwrap();

        debugger.emit("Page.loadEventFired", json!({ "timestamp": 1.0 }), None);
        assert!(rx.try_recv().is_err());

        client.attach_page("page-session");
        debugger.emit("Page.loadEventFired", json!({ "timestamp": 2.0 }), None);
        assert_eq!(
            rx.try_recv().unwrap(),
            json!({
                "method": "Page.loadEventFired",
                "params": { "timestamp": 2.0 },
                "sessionId": "page-session"
            })
        );
    }

    #[tokio::test]
    async fn disposed_sessions_close_their_channel() {
        let debugger = MockDebugger::new();
        let target = DebugTarget::new(
            "t1",
            Arc::new(PageInfo::default()),
            debugger.clone(),
            Arc::new(ProxyConfig::default()),
        );
        let (client, mut rx) = ClientSession::new();
        client.attach_page("s1");
        target.add_client(client.clone()).await.unwrap();

        target.dispose().await;

        assert!(client.is_disposed());
        assert!(!client.page_attached());
        assert_eq!(rx.recv().await, None);
    }
}
