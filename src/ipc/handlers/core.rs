use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::sync;
use crate::ipc::types::{AppState, Request};
use crate::session::{Session, SessionSnapshot};
use crate::transport::WorkspaceTransport;
use anyhow::Context;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
    pub session: bool,
    pub periods: usize,
    pub shadows: usize,
    pub skipped_shadows: usize,
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = state.session.as_ref();
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "sessionActive": session.is_some(),
            "authenticated": session.map(|s| s.token.is_some()).unwrap_or(false),
            "policyVariant": session.map(|s| s.variant.as_str()),
        }),
    )
}

/// Opens the workspace cache and rebuilds the last session from it.
///
/// Nothing in `state` changes unless every cached row loads.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<RestoreSummary> {
    let conn = db::open_db(path)?;
    let mut summary = RestoreSummary::default();

    let snapshot = db::settings_get_json(&conn, "session.snapshot")?
        .map(serde_json::from_value::<SessionSnapshot>)
        .transpose()
        .context("cached session snapshot is invalid")?;

    let restored = match snapshot {
        Some(snapshot) => Some(restore_session(&conn, snapshot, &mut summary)?),
        None => None,
    };

    state.clear_session();
    if let Some(session) = restored {
        summary.session = true;
        state.install_session(session);
    }
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.transport = Some(Box::new(WorkspaceTransport::new(path)));
    // The cache already holds what the rebuild just replayed.
    sync::discard_store_events(state);

    tracing::info!(
        workspace = %path.to_string_lossy(),
        periods = summary.periods,
        shadows = summary.shadows,
        "workspace opened"
    );
    Ok(summary)
}

fn restore_session(
    conn: &rusqlite::Connection,
    snapshot: SessionSnapshot,
    summary: &mut RestoreSummary,
) -> anyhow::Result<Session> {
    let mut session = Session::from_snapshot(snapshot);
    for (period, courses) in db::load_period_snapshots(conn)? {
        session.store.populate_all_courses(&period, courses);
        summary.periods += 1;
    }
    for (key, shadow) in db::load_shadows(conn)? {
        match session.store.restore_shadow(&key, shadow) {
            Ok(()) => summary.shadows += 1,
            Err(e) => {
                tracing::warn!(%key, error = %e, "cached shadow has no live course");
                summary.skipped_shadows += 1;
            }
        }
    }
    Ok(session)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "restored": {
                    "session": summary.session,
                    "periods": summary.periods,
                    "shadows": summary.shadows,
                    "skippedShadows": summary.skipped_shadows,
                }
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
