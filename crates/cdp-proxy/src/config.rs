//! Proxy configuration

use serde::{Deserialize, Serialize};

use crate::cdp::protocol::PROTOCOL_VERSION;
use crate::events::DEFAULT_CAPACITY;

/// Fixed window geometry reported by the Browser domain stubs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            width: 1280,
            height: 720,
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Version passed to every native attach
    pub protocol_version: String,
    pub product: String,
    pub user_agent: String,
    pub window_bounds: WindowBounds,
    /// Buffer size of each per-session event channel
    pub event_capacity: usize,
    /// Commands answered with `{}` instead of reaching the native debugger.
    /// `Emulation.setDeviceMetricsOverride` crashes the embedded debugger.
    pub blocked_methods: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            product: "Chrome/BrowserView".to_string(),
            user_agent: format!("cdp-proxy/{}", env!("CARGO_PKG_VERSION")),
            window_bounds: WindowBounds::default(),
            event_capacity: DEFAULT_CAPACITY,
            blocked_methods: vec!["Emulation.setDeviceMetricsOverride".to_string()],
        }
    }
}

impl ProxyConfig {
    pub fn is_blocked(&self, method: &str) -> bool {
        self.blocked_methods.iter().any(|m| m == method)
    }
}
