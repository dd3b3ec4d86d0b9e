//! CSV preview loading with a local, best-effort header fallback.

use crate::engine::SanitizerClient;
use crate::model::PreviewResponse;
use crate::session::SelectedFile;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Rows requested from the preview endpoint.
pub(crate) const DEFAULT_PREVIEW_ROWS: usize = 10;
/// Bytes read from the start of the file by the local fallback.
const LOCAL_SLICE_BYTES: u64 = 10_000;

#[derive(Debug, Clone)]
pub(crate) struct PreviewOutcome {
    pub headers: Vec<String>,
    /// Server preview table; `None` when headers were parsed locally.
    pub table: Option<PreviewResponse>,
    /// Why the server preview was not used.
    pub degraded: Option<String>,
}

/// Ask the backend for a preview of `file`, falling back to parsing the
/// header line locally if the request fails for any reason.
pub(crate) async fn load_preview(
    client: &SanitizerClient,
    file: &SelectedFile,
    rows: usize,
) -> Result<PreviewOutcome> {
    match client.preview(&file.path, rows).await {
        Ok(table) => Ok(PreviewOutcome {
            headers: table.headers.clone(),
            table: Some(table),
            degraded: None,
        }),
        Err(e) => {
            warn!(file = %file.path.display(), error = %e, "preview failed, parsing headers locally");
            let text = read_head(&file.path).await?;
            Ok(PreviewOutcome {
                headers: parse_headers_local(&text),
                table: None,
                degraded: Some(e.to_string()),
            })
        }
    }
}

/// Header tokens of the first line: split on commas, trimmed, quotes removed.
///
/// No quoting rules apply, so a quoted header containing a comma is split.
pub(crate) fn parse_headers_local(text: &str) -> Vec<String> {
    // Excel writes UTF-8 CSVs with a byte order mark.
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let first_line = text.split('\n').next().unwrap_or_default();
    first_line
        .split(',')
        .map(|h| h.trim().replace('"', ""))
        .collect()
}

async fn read_head(path: &Path) -> Result<String> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    let mut buf = Vec::new();
    file.take(LOCAL_SLICE_BYTES)
        .read_to_end(&mut buf)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
