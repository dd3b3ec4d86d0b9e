//! Post-job processing utilities.
//!
//! Handles download, diff fetch, auto-save, and exports after a job succeeds.

use crate::engine::SanitizerClient;
use crate::model::{ColumnRules, JobHandle};
use crate::storage::{self, JobSummary};
use crate::view::{self, DiffView, ResultView};
use std::path::{Path, PathBuf};
use tracing::warn;

pub(crate) struct CompletionOptions<'a> {
    /// File or directory to download into; `None` skips the download.
    pub download_to: Option<&'a Path>,
    /// Fetch the diff with this many rows.
    pub diff_rows: Option<usize>,
    pub export_json: Option<&'a Path>,
    pub auto_save: bool,
}

/// Result of post-job processing, ready for presentation layers.
pub(crate) struct ProcessedJob {
    pub result: ResultView,
    pub downloaded: Option<PathBuf>,
    pub diff: Option<DiffView>,
    pub messages: Vec<String>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Process a finished job. Individual step failures become messages rather
/// than errors: the job itself already succeeded.
pub(crate) async fn process_job_completion(
    client: &SanitizerClient,
    opts: &CompletionOptions<'_>,
    rules: &ColumnRules,
    input_file: Option<&str>,
    job: &JobHandle,
) -> ProcessedJob {
    let job_id = job.job_execution_id;
    let download_url = client
        .download_url(job_id)
        .map(|u| u.to_string())
        .unwrap_or_default();
    let result = view::result_view(job, &download_url);
    let mut messages = Vec::new();

    let downloaded = match opts.download_to {
        Some(target) => match client.download(job_id, target, &result.output_file).await {
            Ok(path) => {
                messages.push(format!("Downloaded: {}", path.display()));
                Some(path)
            }
            Err(e) => {
                warn!(job_id, error = %e, "download failed");
                messages.push(format!("Download failed: {e}"));
                None
            }
        },
        None => None,
    };

    let diff = match opts.diff_rows {
        Some(rows) => match client.diff(job_id, rows).await {
            Ok(diff) => Some(view::diff_view(job_id, &diff)),
            Err(e) => {
                warn!(job_id, error = %e, "diff fetch failed");
                messages.push(format!("Diff unavailable: {e}"));
                None
            }
        },
        None => None,
    };

    let mut summary = JobSummary::new(job.clone(), rules.clone(), input_file.map(str::to_string));
    summary.downloaded_to = downloaded.clone();

    let auto_saved_path = if opts.auto_save {
        match storage::save_job(&summary) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "auto-save failed");
                None
            }
        }
    } else {
        None
    };

    if let Some(export_path) = opts.export_json {
        match storage::export_json(export_path, &summary) {
            Ok(_) => messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedJob {
        result,
        downloaded,
        diff,
        messages,
        auto_saved_path,
    }
}
