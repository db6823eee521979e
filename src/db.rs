use crate::model::{Course, ModifiedCourse};
use crate::store::CourseKey;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

pub const DB_FILE: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // One row per course of the last fetch of each period.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS period_snapshots(
            period_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            course_json TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY(period_id, course_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_period_snapshots_period ON period_snapshots(period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS shadow_courses(
            period_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            shadow_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(period_id, course_id)
        )",
        [],
    )?;

    Ok(conn)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(
            serde_json::from_str(&text).with_context(|| format!("setting {} is not json", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(())
}

/// Wholesale replace of a period's cached courses. Shadows of the period go too.
pub fn replace_period_snapshot(conn: &Connection, period: &str, courses: &[&Course]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM period_snapshots WHERE period_id = ?", [period])?;
    tx.execute("DELETE FROM shadow_courses WHERE period_id = ?", [period])?;
    let fetched_at = now_rfc3339();
    for (i, course) in courses.iter().enumerate() {
        let course_json = serde_json::to_string(course)?;
        tx.execute(
            "INSERT INTO period_snapshots(period_id, course_id, sort_order, course_json, fetched_at)
             VALUES(?, ?, ?, ?, ?)",
            (period, &course.class_id, i as i64, course_json, &fetched_at),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn load_period_snapshots(conn: &Connection) -> anyhow::Result<BTreeMap<String, Vec<Course>>> {
    let mut stmt = conn.prepare(
        "SELECT period_id, course_json
         FROM period_snapshots
         ORDER BY period_id, sort_order",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out: BTreeMap<String, Vec<Course>> = BTreeMap::new();
    for (period, course_json) in rows {
        let course: Course = serde_json::from_str(&course_json)
            .with_context(|| format!("cached course in period {} is corrupt", period))?;
        out.entry(period).or_default().push(course);
    }
    Ok(out)
}

pub fn save_shadow(conn: &Connection, key: &CourseKey, shadow: &ModifiedCourse) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO shadow_courses(period_id, course_id, shadow_json, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(period_id, course_id) DO UPDATE SET
           shadow_json = excluded.shadow_json,
           updated_at = excluded.updated_at",
        (
            &key.period,
            &key.course_id,
            serde_json::to_string(shadow)?,
            now_rfc3339(),
        ),
    )?;
    Ok(())
}

pub fn delete_shadow(conn: &Connection, key: &CourseKey) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM shadow_courses WHERE period_id = ? AND course_id = ?",
        (&key.period, &key.course_id),
    )?;
    Ok(())
}

pub fn load_shadows(conn: &Connection) -> anyhow::Result<Vec<(CourseKey, ModifiedCourse)>> {
    let mut stmt = conn.prepare(
        "SELECT period_id, course_id, shadow_json
         FROM shadow_courses
         ORDER BY period_id, course_id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(period, course_id, json)| -> anyhow::Result<(CourseKey, ModifiedCourse)> {
            let key = CourseKey { period, course_id };
            let shadow: ModifiedCourse = serde_json::from_str(&json)
                .with_context(|| format!("cached shadow for {} is corrupt", key))?;
            Ok((key, shadow))
        })
        .collect()
}
