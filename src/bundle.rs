use crate::model::ModifiedCourse;
use crate::store::{CourseKey, CourseStore};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const SCENARIO_ENTRY: &str = "scenario.json";
pub const SCENARIO_FORMAT_V1: &str = "gradebook-scenario-v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioCourse {
    #[serde(flatten)]
    pub key: CourseKey,
    pub shadow: ModifiedCourse,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub course_count: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub applied: Vec<CourseKey>,
    pub skipped: Vec<CourseKey>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes every diverged shadow course to a zip bundle.
pub fn export_scenario_bundle(store: &CourseStore, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let courses: Vec<ScenarioCourse> = store
        .diverged()
        .into_iter()
        .map(|(key, shadow)| ScenarioCourse {
            key: key.clone(),
            shadow: shadow.clone(),
        })
        .collect();
    let payload = serde_json::to_vec_pretty(&courses).context("failed to serialize scenario")?;
    let checksum = sha256_hex(&payload);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": SCENARIO_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "courseCount": courses.len(),
        "sha256": checksum,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(SCENARIO_ENTRY, opts)
        .context("failed to start scenario entry")?;
    zip.write_all(&payload)
        .context("failed to write scenario entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: SCENARIO_FORMAT_V1.to_string(),
        course_count: courses.len(),
        sha256: checksum,
    })
}

pub fn read_scenario_bundle(in_path: &Path) -> anyhow::Result<Vec<ScenarioCourse>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != SCENARIO_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected = manifest
        .get("sha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing sha256"))?
        .to_string();

    let mut payload = Vec::new();
    archive
        .by_name(SCENARIO_ENTRY)
        .context("bundle missing scenario.json")?
        .read_to_end(&mut payload)
        .context("failed to read scenario.json")?;
    let actual = sha256_hex(&payload);
    if actual != expected {
        return Err(anyhow!(
            "scenario checksum mismatch: manifest {}, payload {}",
            expected,
            actual
        ));
    }

    serde_json::from_slice(&payload).context("scenario.json is invalid")
}

/// Overlays bundled shadows onto courses the store already holds.
pub fn import_scenario_bundle(store: &mut CourseStore, in_path: &Path) -> anyhow::Result<ImportSummary> {
    let courses = read_scenario_bundle(in_path)?;
    let mut summary = ImportSummary::default();
    for c in courses {
        match store.restore_shadow(&c.key, c.shadow) {
            Ok(()) => summary.applied.push(c.key),
            Err(e) => {
                tracing::debug!(key = %c.key, error = %e, "scenario course skipped");
                summary.skipped.push(c.key);
            }
        }
    }
    Ok(summary)
}
