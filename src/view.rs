//! Pure view-models built from session and job state.
//!
//! Nothing here does I/O; `text_summary` turns these into terminal lines and
//! `--json` serializes them as-is.

use crate::model::{DiffResult, JobHandle, JobId, JobPhase, Operation, PreviewResponse};
use crate::preview::PreviewOutcome;
use crate::session::{SelectAllState, SelectedFile, UploadState};
use serde::Serialize;

const BIN: &str = "csv-sanitizer";
const PREVIEW_CELL_CHARS: usize = 30;
const DIFF_CELL_CHARS: usize = 20;
const DEFAULT_OUTPUT_NAME: &str = "sanitized.csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PreviewView {
    pub file_name: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub info: String,
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ColumnView {
    pub name: String,
    pub enabled: bool,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SessionView {
    pub file: Option<SelectedFile>,
    pub file_size: Option<String>,
    pub phase: JobPhase,
    pub columns: Vec<ColumnView>,
    pub select_all: SelectAllState,
    pub submittable: bool,
    pub job_id: Option<JobId>,
    pub progress: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ResultView {
    pub job_id: JobId,
    pub status: String,
    pub rows_processed: u64,
    pub rows_skipped: u64,
    pub output_file: String,
    pub download_url: String,
    pub diff_command: String,
    pub new_job_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum DiffCellView {
    Changed { original: String, sanitized: String },
    Unchanged { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DiffRowView {
    pub label: String,
    pub cells: Vec<DiffCellView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DiffView {
    pub job_id: JobId,
    pub headers: Vec<String>,
    pub rows: Vec<DiffRowView>,
    pub total_changes: u64,
    pub changes_by_column: Vec<(String, u64)>,
}

impl DiffView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `Status: RUNNING | Rows: 1,234`
pub(crate) fn progress_text(job: &JobHandle) -> String {
    format!(
        "Status: {} | Rows: {}",
        job.status,
        format_count(job.rows_processed.unwrap_or(0))
    )
}

/// Trailing path segment of the backend's output path, split on `/` or `\`.
pub(crate) fn output_file_name(output_file: Option<&str>) -> String {
    output_file
        .and_then(|p| p.rsplit(|c: char| c == '/' || c == '\\').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_OUTPUT_NAME)
        .to_string()
}

/// Terminal view of a finished job, computed from the last poll response alone.
pub(crate) fn result_view(job: &JobHandle, download_url: &str) -> ResultView {
    ResultView {
        job_id: job.job_execution_id,
        status: job.status.to_string(),
        rows_processed: job.rows_processed.unwrap_or(0),
        rows_skipped: job.rows_skipped.unwrap_or(0),
        output_file: output_file_name(job.output_file.as_deref()),
        download_url: download_url.to_string(),
        diff_command: format!("{BIN} diff {}", job.job_execution_id),
        new_job_command: format!("{BIN} sanitize <FILE>"),
    }
}

pub(crate) fn preview_view(outcome: &PreviewOutcome) -> PreviewView {
    match &outcome.table {
        Some(table) => table_view(table),
        None => PreviewView {
            file_name: None,
            headers: outcome.headers.clone(),
            rows: Vec::new(),
            info: "Headers only".to_string(),
            degraded: outcome.degraded.clone(),
        },
    }
}

/// Preview table with cells cut to 30 characters.
pub(crate) fn table_view(table: &PreviewResponse) -> PreviewView {
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| truncate(cell.as_deref().unwrap_or(""), PREVIEW_CELL_CHARS))
                .collect()
        })
        .collect();
    let info = if rows.is_empty() {
        "0 rows".to_string()
    } else if table.total_rows > 0 {
        format!(
            "Showing {} of {} rows",
            table.preview_rows,
            format_count(table.total_rows as u64)
        )
    } else {
        format!("Showing {} of many rows", table.preview_rows)
    };
    PreviewView {
        file_name: table.file_name.clone(),
        headers: table.headers.clone(),
        rows,
        info,
        degraded: None,
    }
}

pub(crate) fn diff_view(job_id: JobId, diff: &DiffResult) -> DiffView {
    let rows = diff
        .rows
        .iter()
        .map(|row| DiffRowView {
            label: format!("#{}", row.row_number),
            cells: row
                .cells
                .iter()
                .map(|cell| {
                    let original = truncate(cell.original_value.as_deref().unwrap_or(""), DIFF_CELL_CHARS);
                    if cell.changed {
                        DiffCellView::Changed {
                            original,
                            sanitized: truncate(
                                cell.sanitized_value.as_deref().unwrap_or(""),
                                DIFF_CELL_CHARS,
                            ),
                        }
                    } else {
                        DiffCellView::Unchanged { value: original }
                    }
                })
                .collect(),
        })
        .collect();
    DiffView {
        job_id,
        headers: diff.headers.clone(),
        rows,
        total_changes: diff.total_changes,
        changes_by_column: diff
            .changes_by_column
            .iter()
            .map(|(col, n)| (col.clone(), *n))
            .collect(),
    }
}

pub(crate) fn session_view(
    state: &UploadState,
    phase: JobPhase,
    job: Option<&JobHandle>,
) -> SessionView {
    SessionView {
        file: state.selected_file().cloned(),
        file_size: state.selected_file().map(|f| format_bytes(f.size)),
        phase,
        columns: state
            .headers()
            .iter()
            .map(|name| ColumnView {
                name: name.clone(),
                enabled: state.is_enabled(name),
                operation: state.operation_for(name),
            })
            .collect(),
        select_all: state.select_all_state(),
        submittable: state.is_submittable(),
        job_id: state.current_job_id(),
        progress: job.map(progress_text),
    }
}

/// Thousands-separated integer, e.g. `1,234,567`.
pub(crate) fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.1} MB", b / KB / KB)
    } else {
        format!("{:.1} GB", b / KB / KB / KB)
    }
}

/// Cut to `max` characters, marking the cut with `...`.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
