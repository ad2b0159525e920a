//! Two isolated sessions on one page through a DevTools WebSocket
//!
//! Start Chrome with `--remote-debugging-port=9222` and pass a page's
//! `webSocketDebuggerUrl` as the first argument.

use cdp_proxy::cdp::protocol::CDPRequest;
use cdp_proxy::{BrowserViewDebugger, MethodRegistry, PageInfo, ProxyConfig, RemoteDebugger, Router};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let ws_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9222/devtools/page/1".to_string());
    println!("Debugging page at: {}", ws_url);

    let config = Arc::new(ProxyConfig::default());
    let debugger = Arc::new(RemoteDebugger::new(&ws_url)?);
    let page = Arc::new(PageInfo::new("", ws_url.clone(), None));
    let view = BrowserViewDebugger::new(page, debugger, config.clone());

    let first = view.attach().await?;
    let second = view.attach().await?;
    println!("Sessions: {} and {}", first.session_id(), second.session_id());

    let mut events = first.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[first] {}", event.method);
        }
    });

    let router = Router::new(MethodRegistry::with_defaults()?, config);
    let version = router
        .handle(
            &CDPRequest {
                id: 1,
                method: "Browser.getVersion".into(),
                params: None,
                session_id: None,
            },
            None,
        )
        .await?;
    println!("Version: {}", version);

    first.send_message("Page.enable", None).await?;
    second
        .send_message(
            "Runtime.evaluate",
            Some(json!({ "expression": "document.title", "returnByValue": true })),
        )
        .await?;

    println!("Target: {:?}", view.get_target_info().await?);

    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    first.dispose().await;
    second.dispose().await;
    view.dispose().await;
    println!("Disconnected");

    Ok(())
}
