use crate::db;
use crate::ipc::types::AppState;
use crate::store::StoreEvent;

/// Writes pending store notifications through to the workspace cache.
pub fn flush_store_events(state: &AppState) {
    let Some(rx) = state.store_events.as_ref() else {
        return;
    };
    let events: Vec<StoreEvent> = rx.try_iter().collect();
    if events.is_empty() {
        return;
    }
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.session.as_ref()) else {
        return;
    };

    for event in events {
        let result = match &event {
            StoreEvent::PeriodPopulated { period, course_ids } => {
                let courses: Vec<_> = course_ids
                    .iter()
                    .filter_map(|id| session.store.course(period, id))
                    .collect();
                db::replace_period_snapshot(conn, period, &courses)
            }
            StoreEvent::ShadowChanged(key) => match session.store.modified_course(&key.period, &key.course_id) {
                Some(shadow) => db::save_shadow(conn, key, shadow),
                None => Ok(()),
            },
            StoreEvent::ShadowRolledBack(key) => db::delete_shadow(conn, key),
        };
        if let Err(e) = result {
            tracing::warn!(event = ?event, error = %format!("{:#}", e), "workspace cache write failed");
        }
    }
}

/// Drops pending notifications, e.g. after the store was rebuilt from the cache.
pub fn discard_store_events(state: &AppState) {
    if let Some(rx) = state.store_events.as_ref() {
        let dropped = rx.try_iter().count();
        tracing::trace!(dropped, "store events discarded");
    }
}

pub fn persist_session_snapshot(state: &AppState) {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.session.as_ref()) else {
        return;
    };
    let value = match serde_json::to_value(session.snapshot()) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "session snapshot not serializable");
            return;
        }
    };
    if let Err(e) = db::settings_set_json(conn, "session.snapshot", &value) {
        tracing::warn!(error = %format!("{:#}", e), "session snapshot not saved");
    }
}
