//! Error types for the debugging proxy
//!
//! One flat enum. Teardown paths never return these; they log and move on.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("Connection closed")]
    Closed,

    #[error("Debugger is not attached")]
    NotAttached,

    #[error("Debugger is already attached")]
    AlreadyAttached,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid debugger URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to discover target id: {0}")]
    TargetDiscovery(String),

    #[error("No session available for request")]
    NoSession,

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid method registration: {0}")]
    Registration(String),
}

impl ProxyError {
    /// JSON-RPC style error code reported back to CDP clients.
    pub fn code(&self) -> i32 {
        match self {
            ProxyError::Protocol { code, .. } => *code,
            ProxyError::MethodNotFound(_) => -32601,
            _ => -32000,
        }
    }
}
