//! Local persistence: JSON exports and auto-saved job summaries.

use crate::model::{ColumnRules, JobHandle};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Record written after a job finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct JobSummary {
    pub saved_at: String,
    pub job: JobHandle,
    pub rules: ColumnRules,
    pub input_file: Option<String>,
    pub downloaded_to: Option<PathBuf>,
}

impl JobSummary {
    pub fn new(job: JobHandle, rules: ColumnRules, input_file: Option<String>) -> Self {
        let saved_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            saved_at,
            job,
            rules,
            input_file,
            downloaded_to: None,
        }
    }
}

fn base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("csv-sanitizer")
}

pub(crate) fn jobs_dir() -> PathBuf {
    base_dir().join("jobs")
}

/// Where downloads land when no `--output` is given.
pub(crate) fn default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub(crate) fn export_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub(crate) fn save_job(summary: &JobSummary) -> Result<PathBuf> {
    save_job_in(&jobs_dir(), summary)
}

fn save_job_in(dir: &Path, summary: &JobSummary) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year][month][day]T[hour][minute][second]Z"
        ))
        .context("format timestamp")?;
    let path = dir.join(format!("job-{}-{stamp}.json", summary.job.job_execution_id));
    export_json(&path, summary)?;
    debug!(path = %path.display(), "saved job summary");
    Ok(path)
}

/// Most recent saved summaries, newest first.
pub(crate) fn load_recent(limit: usize) -> Result<Vec<JobSummary>> {
    load_recent_in(&jobs_dir(), limit)
}

fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<JobSummary>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("read {}", dir.display())),
    };

    let mut out = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|data| Ok(serde_json::from_slice::<JobSummary>(&data)?));
        match parsed {
            Ok(summary) => out.push(summary),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job summary"),
        }
    }
    // RFC 3339 UTC timestamps sort lexically.
    out.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    out.truncate(limit);
    Ok(out)
}
