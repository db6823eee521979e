use crate::bundle;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, session_mut, session_ref};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match bundle::export_scenario_bundle(&session.store, &out_path) {
        Ok(summary) => {
            tracing::info!(path = %out_path.to_string_lossy(), courses = summary.course_count, "scenario exported");
            ok(
                &req.id,
                json!({
                    "outPath": out_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "courseCount": summary.course_count,
                    "sha256": summary.sha256,
                }),
            )
        }
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match required_str(req, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match bundle::import_scenario_bundle(&mut session.store, &in_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "inPath": in_path.to_string_lossy(),
                "applied": summary.applied,
                "skipped": summary.skipped,
            }),
        ),
        Err(e) => err(&req.id, "bad_bundle", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scenario.export" => Some(handle_export(state, req)),
        "scenario.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
