//! Text rendering for CLI output.
//!
//! Turns view-models into human-readable lines for text mode.

use crate::model::{AuditRecord, AuditStats, HealthStatus};
use crate::storage::JobSummary;
use crate::view::{
    format_count, progress_text, DiffCellView, DiffView, PreviewView, ResultView, SessionView,
};
use std::path::Path;

pub(crate) fn health_line(status: &HealthStatus) -> String {
    match status {
        HealthStatus::Online(Some(report)) => {
            let app = report.application.as_deref().unwrap_or("sanitizer");
            match report.version.as_deref() {
                Some(v) => format!("Online ({app} {v})"),
                None => format!("Online ({app})"),
            }
        }
        HealthStatus::Online(None) => "Online".to_string(),
        HealthStatus::Offline => "Offline".to_string(),
    }
}

pub(crate) fn preview_lines(view: &PreviewView) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(name) = view.file_name.as_deref() {
        lines.push(format!("File: {name}"));
    }
    if let Some(reason) = view.degraded.as_deref() {
        lines.push(format!("Server preview unavailable: {reason}"));
        lines.push(format!("Columns: {}", view.headers.join(", ")));
        return lines;
    }
    if view.rows.is_empty() {
        lines.push(format!("Columns: {}", view.headers.join(", ")));
        lines.push("No data rows found in this file (only headers?)".to_string());
    } else {
        lines.extend(render_table(&view.headers, &view.rows));
    }
    lines.push(view.info.clone());
    lines
}

pub(crate) fn session_lines(view: &SessionView) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(file) = view.file.as_ref() {
        let size = view.file_size.as_deref().unwrap_or("?");
        lines.push(format!("File: {} ({size})", file.name));
    }
    lines.push("Columns:".to_string());
    for col in &view.columns {
        let mark = if col.enabled { "x" } else { " " };
        lines.push(format!("  [{mark}] {} -> {}", col.name, col.operation));
    }
    if let Some(progress) = view.progress.as_deref() {
        lines.push(progress.to_string());
    }
    lines
}

pub(crate) fn result_lines(view: &ResultView, downloaded: Option<&Path>) -> Vec<String> {
    let mut lines = vec![
        format!("Job ID: {}", view.job_id),
        format!("Status: {}", view.status),
        format!("Rows Processed: {}", format_count(view.rows_processed)),
        format!("Rows Skipped: {}", view.rows_skipped),
        format!("Output File: {}", view.output_file),
    ];
    match downloaded {
        Some(path) => lines.push(format!("Saved to: {}", path.display())),
        None => lines.push(format!("Download: {}", view.download_url)),
    }
    lines.push(format!("View changes: {}", view.diff_command));
    lines.push(format!("New job: {}", view.new_job_command));
    lines
}

pub(crate) fn diff_lines(view: &DiffView) -> Vec<String> {
    if view.is_empty() {
        return vec!["No changes to display".to_string()];
    }
    let mut lines = vec![format!("Total changes: {}", view.total_changes)];
    if !view.changes_by_column.is_empty() {
        let per_col: Vec<String> = view
            .changes_by_column
            .iter()
            .map(|(col, n)| format!("{col}: {n}"))
            .collect();
        lines.push(format!("By column: {}", per_col.join(", ")));
    }

    let mut headers = vec!["Row".to_string()];
    headers.extend(view.headers.iter().cloned());
    let rows: Vec<Vec<String>> = view
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.label.clone()];
            cells.extend(row.cells.iter().map(|cell| match cell {
                DiffCellView::Changed {
                    original,
                    sanitized,
                } => format!("{original} -> {sanitized}"),
                DiffCellView::Unchanged { value } => value.clone(),
            }));
            cells
        })
        .collect();
    lines.extend(render_table(&headers, &rows));
    lines
}

pub(crate) fn history_lines(records: &[AuditRecord]) -> Vec<String> {
    if records.is_empty() {
        return vec!["No jobs recorded".to_string()];
    }
    let headers: Vec<String> = ["Job", "Status", "Input", "Rows", "Duration"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.job_execution_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".into()),
                r.status.clone().unwrap_or_else(|| "-".into()),
                r.input_file_name.clone().unwrap_or_else(|| "-".into()),
                format_count(r.rows_processed.unwrap_or(0)),
                r.duration_ms
                    .map(|ms| humantime::format_duration(std::time::Duration::from_millis(ms)).to_string())
                    .unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    render_table(&headers, &rows)
}

pub(crate) fn local_history_lines(saved: &[JobSummary]) -> Vec<String> {
    if saved.is_empty() {
        return vec!["No saved jobs".to_string()];
    }
    saved
        .iter()
        .map(|s| {
            let rules: Vec<String> = s.rules.iter().map(|(c, op)| format!("{c}={op}")).collect();
            format!(
                "{}  job {}  {}  {}  [{}]",
                s.saved_at,
                s.job.job_execution_id,
                s.input_file.as_deref().unwrap_or("-"),
                progress_text(&s.job),
                rules.join(", ")
            )
        })
        .collect()
}

pub(crate) fn stats_lines(stats: &AuditStats) -> Vec<String> {
    vec![
        format!("Total jobs: {}", format_count(stats.total_jobs)),
        format!("Successful: {}", format_count(stats.successful_jobs)),
        format!("Failed: {}", format_count(stats.failed_jobs)),
        format!("Rows processed: {}", format_count(stats.total_rows_processed)),
        format!("Average rate: {:.1} rows/s", stats.average_processing_rate),
    ]
}

/// Left-aligned table with a dashed rule under the header row.
fn render_table(headers: &[String], rows: &[Vec<String>]) -> Vec<String> {
    let cols = rows.iter().map(Vec::len).chain([headers.len()]).max().unwrap_or(0);
    let mut widths = vec![0usize; cols];
    for row in std::iter::once(headers).chain(rows.iter().map(Vec::as_slice)) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let fmt_row = |row: &[String]| -> String {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                format!("{cell:<w$}")
            })
            .collect();
        cells.join(" | ").trim_end().to_string()
    };

    let mut lines = vec![fmt_row(headers)];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(rows.iter().map(|r| fmt_row(r)));
    lines
}
