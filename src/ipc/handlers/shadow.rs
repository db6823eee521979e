use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    course_key, known_period, lookup_error, optional_str, required_param, required_str, session_mut,
    session_ref, store_error,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{AssignmentPatch, CourseKey, NewAssignment};
use serde_json::json;

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let key = match course_key(session, req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    match session.store.modified_course(&key.period, &key.course_id) {
        Some(shadow) => ok(&req.id, json!({ "key": key, "shadow": shadow })),
        None => err(
            &req.id,
            "not_found",
            "course not loaded for period",
            Some(json!({ "key": key })),
        ),
    }
}

fn handle_edit_assignment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let patch: AssignmentPatch = match required_param(req, "patch") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let key = match course_key(session, req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    if let Some(measure_type_id) = patch.measure_type_id.as_deref() {
        if let Err(e) = session.policy.measure_type(measure_type_id) {
            return lookup_error(req, e);
        }
    }

    match session.store.edit_assignment(&key, &assignment_id, &patch) {
        Ok(updated) => ok(&req.id, json!({ "key": key, "assignment": updated })),
        Err(e) => store_error(req, e),
    }
}

fn handle_add_assignment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let draft: NewAssignment = match serde_json::from_value(req.params.clone()) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "bad_params", format!("invalid assignment: {}", e), None),
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let key = match course_key(session, req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    if let Err(e) = session.policy.measure_type(&draft.measure_type_id) {
        return lookup_error(req, e);
    }

    match session.store.add_custom_assignment(&key, draft) {
        Ok(added) => ok(&req.id, json!({ "key": key, "assignment": added })),
        Err(e) => store_error(req, e),
    }
}

fn handle_remove_assignment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let key = match course_key(session, req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    match session.store.remove_custom_assignment(&key, &assignment_id) {
        Ok(removed) => ok(&req.id, json!({ "key": key, "removed": removed })),
        Err(e) => store_error(req, e),
    }
}

/// One course when `courseId` is given, otherwise the whole period.
fn handle_rollback(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let period = match known_period(session, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let rolled_back: Vec<CourseKey> = match optional_str(req, "courseId") {
        Some(course_id) => {
            let key = CourseKey { period, course_id };
            if let Err(e) = session.store.rollback(&key) {
                return store_error(req, e);
            }
            vec![key]
        }
        None => session.store.rollback_period(&period),
    };
    ok(&req.id, json!({ "rolledBack": rolled_back }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "shadow.get" => Some(handle_get(state, req)),
        "shadow.editAssignment" => Some(handle_edit_assignment(state, req)),
        "shadow.addAssignment" => Some(handle_add_assignment(state, req)),
        "shadow.removeAssignment" => Some(handle_remove_assignment(state, req)),
        "shadow.rollback" => Some(handle_rollback(state, req)),
        _ => None,
    }
}
