use super::handlers;
use super::sync;
use super::types::{AppState, Request};
use crate::ipc::error::err;

fn dispatch(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::session::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::courses::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::shadow::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::calc::try_handle(state, req) {
        return Some(resp);
    }
    handlers::scenario::try_handle(state, req)
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    let resp = dispatch(state, &req);
    // Store changes made by this request reach the cache before the reply.
    sync::flush_store_events(state);

    match resp {
        Some(resp) => resp,
        None => err(
            &req.id,
            "not_implemented",
            format!("unknown method: {}", req.method),
            None,
        ),
    }
}
