use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{known_period, required_param, required_str, session_mut, session_ref, transport_error};
use crate::ipc::types::{AppState, Request};
use crate::model::Course;
use crate::session::Session;
use serde_json::json;
use std::collections::HashSet;

fn populate_result(session: &Session, period: &str) -> serde_json::Value {
    json!({
        "period": period,
        "courseIds": session.store.course_ids(period),
    })
}

fn reject_duplicate_ids(req: &Request, courses: &[Course]) -> Result<(), serde_json::Value> {
    let mut seen = HashSet::new();
    for c in courses {
        if !seen.insert(c.class_id.as_str()) {
            return Err(err(
                &req.id,
                "bad_params",
                "duplicate classId in courses",
                Some(json!({ "classId": c.class_id })),
            ));
        }
    }
    Ok(())
}

fn handle_fetch_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if session.token.is_none() {
        return err(&req.id, "unauthenticated", "session is offline; log in again", None);
    }
    let period = match known_period(session, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let Some(transport) = state.transport.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let courses = match transport.fetch_grading_period_courses(&period) {
        Ok(c) => c,
        Err(e) => return transport_error(req, e),
    };
    if let Err(e) = reject_duplicate_ids(req, &courses) {
        return e;
    }

    // Last writer wins: a slower, older response still replaces a newer one.
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    session.store.populate_all_courses(&period, courses);
    ok(&req.id, populate_result(session, &period))
}

fn handle_populate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let courses: Vec<Course> = match required_param(req, "courses") {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = reject_duplicate_ids(req, &courses) {
        return e;
    }
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let period = match known_period(session, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    session.store.populate_all_courses(&period, courses);
    ok(&req.id, populate_result(session, &period))
}

/// Course ordering for a period, annotated with what the store holds.
fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let period = match known_period(session, req) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let mut listed: HashSet<&str> = HashSet::new();
    let mut courses: Vec<serde_json::Value> = session
        .course_ordering
        .iter()
        .map(|meta| {
            listed.insert(meta.id.as_str());
            let shadow = session.store.modified_course(&period, &meta.id);
            json!({
                "id": meta.id,
                "name": meta.name,
                "markPreview": meta.mark_preview,
                "loaded": session.store.course(&period, &meta.id).is_some(),
                "needsRollback": shadow.map(|m| m.needs_rollback).unwrap_or(false),
            })
        })
        .collect();

    // Fetched courses the ordering does not mention still show up, after it.
    for id in session.store.course_ids(&period) {
        if listed.contains(id.as_str()) {
            continue;
        }
        let shadow = session.store.modified_course(&period, &id);
        courses.push(json!({
            "id": id,
            "name": id,
            "markPreview": "",
            "loaded": true,
            "needsRollback": shadow.map(|m| m.needs_rollback).unwrap_or(false),
        }));
    }

    ok(&req.id, json!({ "period": period, "courses": courses }))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let period = match known_period(session, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.store.course(&period, &course_id) {
        Some(course) => ok(&req.id, json!({ "period": period, "course": course })),
        None => err(
            &req.id,
            "not_found",
            "course not loaded for period",
            Some(json!({ "period": period, "courseId": course_id })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.fetchPeriod" => Some(handle_fetch_period(state, req)),
        "courses.populate" => Some(handle_populate(state, req)),
        "courses.list" => Some(handle_list(state, req)),
        "courses.get" => Some(handle_get(state, req)),
        _ => None,
    }
}
