use crate::calc::CalcError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::policy::PolicyLookupError;
use crate::session::Session;
use crate::store::{CourseKey, StoreError};
use crate::transport::TransportError;
use serde::de::DeserializeOwned;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Deserializes `params[key]`; absent or null yields `None`.
pub fn optional_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<Option<T>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("invalid {}: {}", key, e),
                None,
            )
        }),
    }
}

pub fn required_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, serde_json::Value> {
    optional_param(req, key)?
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn session_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a Session, serde_json::Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_session", "log in first", None))
}

pub fn session_mut<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut Session, serde_json::Value> {
    state
        .session
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_session", "log in first", None))
}

/// `period` param, checked against the session's grading periods.
pub fn known_period(session: &Session, req: &Request) -> Result<String, serde_json::Value> {
    let period = required_str(req, "period")?;
    if session.period(&period).is_none() {
        return Err(err(
            &req.id,
            "not_found",
            "unknown grading period",
            Some(json!({ "period": period })),
        ));
    }
    Ok(period)
}

pub fn course_key(session: &Session, req: &Request) -> Result<CourseKey, serde_json::Value> {
    let period = known_period(session, req)?;
    let course_id = required_str(req, "courseId")?;
    Ok(CourseKey { period, course_id })
}

pub fn calc_error(req: &Request, e: CalcError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn lookup_error(req: &Request, e: PolicyLookupError) -> serde_json::Value {
    calc_error(req, CalcError::from(e))
}

pub fn store_error(req: &Request, e: StoreError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}

pub fn transport_error(req: &Request, e: TransportError) -> serde_json::Value {
    tracing::warn!(method = %req.method, error = %e, "transport call failed");
    err(&req.id, e.code(), e.to_string(), None)
}
