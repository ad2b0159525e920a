//! CDP Debugging Proxy
//!
//! Lets several DevTools clients debug one embedded browser page at once.
//!
//! # Pieces
//!
//! 1. **`DebugTarget`**: one page, one native attachment, events fanned out
//!    to every client whose page session is attached
//! 2. **`BrowserViewDebugger`**: one flattened CDP session per client, events
//!    routed strictly by session id
//! 3. **`MethodRegistry`**: methods answered by the proxy itself (Browser
//!    domain stubs)
//!
//! The page's debugger is reached through the `NativeDebugger` trait;
//! `RemoteDebugger` implements it over a DevTools WebSocket.

pub mod cdp;
pub mod config;
pub mod debugger;
pub mod domains;
pub mod error;
pub mod events;
pub mod registry;
pub mod router;
pub mod target;
pub mod view_debugger;

#[cfg(test)]
mod testing;

pub use cdp::{CDPClient, RemoteDebugger};
pub use config::ProxyConfig;
pub use debugger::{BrowserView, NativeDebugger, PageInfo};
pub use domains::{Domain, MethodRegistry};
pub use error::{ProxyError, Result};
pub use events::Emitter;
pub use registry::TargetRegistry;
pub use router::{ClientSession, Router};
pub use target::{DebugClient, DebugTarget};
pub use view_debugger::{BrowserViewDebugger, CDPConnection, CDPTarget};
