//! Browser domain
//!
//! The embedding has no real browser process behind a page, so these answer
//! with fixed data. `close` is acknowledged and ignored: remote clients may
//! not shut the host down.

use serde_json::{json, Value};

use super::{DomainTable, MethodContext, MethodHandler, MethodResult};
use crate::error::Result;

/// Only one window is ever reported
pub const WINDOW_ID: u32 = 1;

pub const HANDLERS: DomainTable = &[
    ("getVersion", get_version as MethodHandler),
    ("close", close as MethodHandler),
    ("getWindowForTarget", get_window_for_target as MethodHandler),
    ("getWindowBounds", get_window_bounds as MethodHandler),
];

fn get_version(_params: &Value, ctx: &MethodContext<'_>) -> Result<MethodResult> {
    Ok(MethodResult::new(json!({
        "protocolVersion": ctx.config.protocol_version,
        "product": ctx.config.product,
        "revision": env!("CARGO_PKG_VERSION"),
        "userAgent": ctx.config.user_agent,
        "jsVersion": env!("CARGO_PKG_VERSION"),
    })))
}

fn close(_params: &Value, ctx: &MethodContext<'_>) -> Result<MethodResult> {
    tracing::info!(session_id = ?ctx.session_id, "Ignoring Browser.close");
    Ok(MethodResult::new(json!({})))
}

fn bounds(ctx: &MethodContext<'_>) -> Value {
    let b = ctx.config.window_bounds;
    json!({
        "left": b.left,
        "top": b.top,
        "width": b.width,
        "height": b.height,
        "windowState": "normal",
    })
}

fn get_window_for_target(_params: &Value, ctx: &MethodContext<'_>) -> Result<MethodResult> {
    Ok(MethodResult::new(json!({
        "windowId": WINDOW_ID,
        "bounds": bounds(ctx),
    })))
}

fn get_window_bounds(_params: &Value, ctx: &MethodContext<'_>) -> Result<MethodResult> {
    Ok(MethodResult::new(json!({ "bounds": bounds(ctx) })))
}
