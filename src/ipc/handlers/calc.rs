use crate::calc::{calculate_weighted_point_ratio, summarize_course, Adjustments};
use crate::gpa::calculate_mcps_gpa;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    calc_error, course_key, known_period, lookup_error, optional_param, optional_str, session_ref,
};
use crate::ipc::types::{AppState, Request};
use crate::marks::{calculate_score_style, try_calculate_mark};
use crate::model::Assignment;
use crate::session::Session;
use crate::store::ViewSource;
use serde_json::json;
use std::collections::HashSet;

/// `ratio` param; JSON null stands for an undefined (NaN) ratio.
fn ratio_param(req: &Request) -> Result<f64, serde_json::Value> {
    match req.params.get("ratio") {
        None => Err(err(&req.id, "bad_params", "missing ratio", None)),
        Some(v) if v.is_null() => Ok(f64::NAN),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| err(&req.id, "bad_params", "ratio must be a number or null", None)),
    }
}

fn score_type_param(session: &Session, req: &Request) -> String {
    optional_str(req, "scoreTypeId").unwrap_or_else(|| session.policy.default_score_type_id.clone())
}

fn handle_course_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let key = match course_key(session, req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let adjustments: Option<Adjustments> = match optional_param(req, "adjustments") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let source: ViewSource = match optional_param(req, "source") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };
    let score_type_id = optional_str(req, "scoreTypeId");

    match summarize_course(
        &session.policy_context(),
        &session.store,
        &key.period,
        &key.course_id,
        score_type_id.as_deref(),
        adjustments.as_ref(),
        source,
    ) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => calc_error(req, e),
    }
}

/// Summaries for every loaded course, in course-ordering order first.
fn handle_period_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let period = match known_period(session, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let ctx = session.policy_context();

    let mut ordered: Vec<String> = session.course_ordering.iter().map(|c| c.id.clone()).collect();
    let mut seen: HashSet<String> = ordered.iter().cloned().collect();
    for id in session.store.course_ids(&period) {
        if seen.insert(id.clone()) {
            ordered.push(id);
        }
    }

    let mut summaries = Vec::new();
    let mut not_loaded = Vec::new();
    for course_id in ordered {
        if session.store.course(&period, &course_id).is_none() {
            not_loaded.push(course_id);
            continue;
        }
        match summarize_course(
            &ctx,
            &session.store,
            &period,
            &course_id,
            None,
            None,
            ViewSource::Modified,
        ) {
            Ok(summary) => summaries.push(summary),
            Err(e) => return calc_error(req, e),
        }
    }

    ok(
        &req.id,
        json!({ "period": period, "courses": summaries, "notLoaded": not_loaded }),
    )
}

/// Raw weighted ratio, optionally over a caller-supplied assignment list.
fn handle_ratio(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let key = match course_key(session, req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let adjustments: Option<Adjustments> = match optional_param(req, "adjustments") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignments: Option<Vec<Assignment>> = match optional_param(req, "assignments") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if assignments.is_none() && session.store.course(&key.period, &key.course_id).is_none() {
        return err(
            &req.id,
            "not_found",
            "course not loaded for period",
            Some(json!({ "key": key })),
        );
    }

    let ratio = calculate_weighted_point_ratio(
        &session.policy_context(),
        &session.store,
        &key.period,
        &key.course_id,
        adjustments.as_ref(),
        assignments.as_deref(),
    );
    ok(&req.id, json!({ "key": key, "ratio": ratio }))
}

fn handle_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let ratio = match ratio_param(req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let score_type_id = score_type_param(session, req);
    match try_calculate_mark(&session.policy_context(), &score_type_id, ratio) {
        Ok(mark) => ok(&req.id, json!({ "scoreTypeId": score_type_id, "mark": mark })),
        Err(e) => lookup_error(req, e),
    }
}

fn handle_style(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let ratio = match ratio_param(req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let score_type_id = score_type_param(session, req);
    let style = calculate_score_style(&session.policy_context(), &score_type_id, ratio);
    ok(&req.id, json!({ "scoreTypeId": score_type_id, "style": style }))
}

fn handle_gpa(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let period = match known_period(session, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let gpa = calculate_mcps_gpa(
        &session.policy_context(),
        &session.store,
        &period,
        &session.course_ordering,
    );
    ok(&req.id, json!({ "period": period, "gpa": gpa }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.courseSummary" => Some(handle_course_summary(state, req)),
        "calc.periodSummary" => Some(handle_period_summary(state, req)),
        "calc.ratio" => Some(handle_ratio(state, req)),
        "calc.mark" => Some(handle_mark(state, req)),
        "calc.style" => Some(handle_style(state, req)),
        "calc.gpa" => Some(handle_gpa(state, req)),
        _ => None,
    }
}
