use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str, session_mut, session_ref, transport_error};
use crate::ipc::sync;
use crate::ipc::types::{AppState, Request};
use crate::policy::PolicyVariant;
use crate::session::Session;
use serde_json::json;

const VARIANT_OVERRIDE_KEY: &str = "policy.variantOverride";

fn session_json(session: &Session) -> serde_json::Value {
    json!({
        "host": session.host,
        "authenticated": session.token.is_some(),
        "student": session.student,
        "policy": session.policy,
        "policyVariant": session.variant,
        "gradingPeriods": session.grading_periods,
        "defaultPeriod": session.default_period().map(|p| p.id.clone()),
        "courseOrdering": session.course_ordering,
    })
}

fn workspace_variant_override(state: &AppState) -> Option<PolicyVariant> {
    let conn = state.db.as_ref()?;
    match db::settings_get_json(conn, VARIANT_OVERRIDE_KEY) {
        Ok(v) => v.and_then(|v| v.as_str().and_then(PolicyVariant::parse)),
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "variant override unreadable");
            None
        }
    }
}

/// Login param, then environment, then workspace setting, then host name.
fn resolve_variant(state: &AppState, requested: Option<PolicyVariant>, host: &str) -> PolicyVariant {
    requested
        .or(state.config.policy_variant)
        .or_else(|| workspace_variant_override(state))
        .unwrap_or_else(|| PolicyVariant::from_host(host))
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let host = match required_str(req, "host") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let requested = match optional_str(req, "policyVariant") {
        None => None,
        Some(raw) => match PolicyVariant::parse(&raw) {
            Some(v) => Some(v),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "policyVariant must be one of: generic, mcps",
                    Some(json!({ "policyVariant": raw })),
                )
            }
        },
    };

    let Some(transport) = state.transport.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let payload = match transport.login(&host, &username, &password) {
        Ok(p) => p,
        Err(e) => return transport_error(req, e),
    };

    let variant = resolve_variant(state, requested, &host);
    state.install_session(Session::from_payload(&host, payload, variant));
    sync::persist_session_snapshot(state);
    tracing::info!(host = %host, variant = variant.as_str(), "logged in");

    match state.session.as_ref() {
        Some(session) => ok(&req.id, session_json(session)),
        None => err(&req.id, "no_session", "session was not installed", None),
    }
}

fn handle_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let token = match session_ref(state, req) {
        Ok(s) => s.token.clone(),
        Err(e) => return e,
    };
    let Some(token) = token else {
        return err(&req.id, "unauthenticated", "session is offline; log in again", None);
    };
    let Some(transport) = state.transport.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let payload = match transport.refresh_session(&token) {
        Ok(p) => p,
        Err(e) => return transport_error(req, e),
    };

    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    session.apply_refresh(payload);
    let result = session_json(session);
    sync::persist_session_snapshot(state);
    ok(&req.id, result)
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let had_session = state.session.is_some();
    state.clear_session();
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = db::settings_delete(conn, "session.snapshot") {
            tracing::warn!(error = %format!("{:#}", e), "session snapshot not removed");
        }
    }
    ok(&req.id, json!({ "loggedOut": had_session }))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session_ref(state, req) {
        Ok(s) => ok(&req.id, session_json(s)),
        Err(e) => e,
    }
}

fn handle_set_policy_variant(state: &mut AppState, req: &Request) -> serde_json::Value {
    let variant = match req.params.get("variant") {
        None => return err(&req.id, "bad_params", "missing variant", None),
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_str().and_then(PolicyVariant::parse) {
            Some(parsed) => Some(parsed),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "variant must be one of: generic, mcps, or null",
                    None,
                )
            }
        },
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let saved = match variant {
        Some(v) => db::settings_set_json(conn, VARIANT_OVERRIDE_KEY, &json!(v.as_str())),
        None => db::settings_delete(conn, VARIANT_OVERRIDE_KEY),
    };
    if let Err(e) = saved {
        return err(&req.id, "db_update_failed", format!("{e:#}"), None);
    }

    // The running session re-resolves with the same precedence as login.
    let host = state.session.as_ref().map(|s| s.host.clone());
    let applied = host.map(|host| resolve_variant(state, None, &host));
    if let (Some(session), Some(resolved)) = (state.session.as_mut(), applied) {
        session.variant = resolved;
    }
    sync::persist_session_snapshot(state);
    ok(
        &req.id,
        json!({
            "override": variant.map(|v| v.as_str()),
            "sessionVariant": applied.map(|v| v.as_str()),
        }),
    )
}

fn handle_districts_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let zip_code = match required_str(req, "zipCode") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(transport) = state.transport.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match transport.fetch_districts(&zip_code) {
        Ok(districts) => ok(&req.id, json!({ "districts": districts })),
        Err(e) => transport_error(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.refresh" => Some(handle_refresh(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.get" => Some(handle_get(state, req)),
        "session.setPolicyVariant" => Some(handle_set_policy_variant(state, req)),
        "districts.search" => Some(handle_districts_search(state, req)),
        _ => None,
    }
}
