//! CDP (Chrome DevTools Protocol) transport
//!
//! Core principle: Single WebSocket connection, multiplexed sessions.

pub mod client;
pub mod protocol;
pub mod remote;

pub use client::CDPClient;
pub use protocol::{CDPEvent, CDPRequest, CDPResponse, TargetInfo};
pub use remote::RemoteDebugger;
