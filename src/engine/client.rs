//! Typed HTTP client for the sanitizer REST API (`<base>/api/v1`).

use crate::model::{
    AuditRecord, AuditStats, ClientConfig, DiffResult, HealthReport, HealthStatus, JobHandle,
    JobId, PreviewResponse, SanitizeRequest,
};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const API_PREFIX: &str = "api/v1";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("file error on {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone)]
pub struct SanitizerClient {
    http: reqwest::Client,
    base_url: String,
}

impl SanitizerClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self, ApiError> {
        let base_url = cfg.base_url.trim_end_matches('/').to_string();
        // Fail early on a malformed base URL rather than on the first request.
        Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| ApiError::Transport {
                url: base_url.clone(),
                source: e,
            })?;

        Ok(Self { http, base_url })
    }

    /// Absolute URL of an API path such as `jobs/42`.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let raw = format!("{}/{}/{}", self.base_url, API_PREFIX, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))
    }

    /// Link to the sanitized CSV of a job; the download itself is a plain GET.
    pub fn download_url(&self, job_id: JobId) -> Result<Url, ApiError> {
        self.endpoint(&format!("jobs/{job_id}/download"))
    }

    /// Any transport error or non-success status means offline.
    pub async fn health(&self) -> HealthStatus {
        let Ok(url) = self.endpoint("health") else {
            return HealthStatus::Offline;
        };
        match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                HealthStatus::Online(resp.json::<HealthReport>().await.ok())
            }
            Ok(resp) => {
                debug!(status = %resp.status(), "health check returned non-success");
                HealthStatus::Offline
            }
            Err(e) => {
                debug!(error = %e, "health check failed");
                HealthStatus::Offline
            }
        }
    }

    pub async fn preview(&self, path: &Path, rows: usize) -> Result<PreviewResponse, ApiError> {
        let url = self.endpoint("preview")?;
        let form = Form::new()
            .part("file", csv_part(path).await?)
            .text("rows", rows.to_string());
        debug!(%url, file = %path.display(), rows, "requesting preview");
        let resp = self.send(self.http.post(url.clone()).multipart(form), &url).await?;
        parse_json(&url, resp).await
    }

    pub async fn sanitize(
        &self,
        path: &Path,
        request: &SanitizeRequest,
    ) -> Result<JobHandle, ApiError> {
        let url = self.endpoint("sanitize")?;
        let config = serde_json::to_string(request)?;
        let form = Form::new()
            .part("file", csv_part(path).await?)
            .text("config", config);
        debug!(%url, file = %path.display(), columns = request.columns.len(), "submitting job");
        let resp = self.send(self.http.post(url.clone()).multipart(form), &url).await?;
        parse_json(&url, resp).await
    }

    pub async fn job_status(&self, job_id: JobId) -> Result<JobHandle, ApiError> {
        self.get_json(&format!("jobs/{job_id}")).await
    }

    pub async fn diff(&self, job_id: JobId, rows: usize) -> Result<DiffResult, ApiError> {
        self.get_json(&format!("jobs/{job_id}/diff?rows={rows}")).await
    }

    /// Preview of the stored input or output file of a finished job.
    pub async fn job_file_preview(
        &self,
        job_id: JobId,
        output: bool,
        rows: usize,
    ) -> Result<PreviewResponse, ApiError> {
        let which = if output { "output" } else { "input" };
        self.get_json(&format!("jobs/{job_id}/preview/{which}?rows={rows}"))
            .await
    }

    pub async fn stop_job(&self, job_id: JobId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("jobs/{job_id}/stop"))?;
        debug!(%url, "stopping job");
        self.send(self.http.post(url.clone()), &url).await?;
        Ok(())
    }

    pub async fn restart_job(&self, job_id: JobId) -> Result<JobHandle, ApiError> {
        let url = self.endpoint(&format!("jobs/{job_id}/restart"))?;
        debug!(%url, "restarting job");
        let resp = self.send(self.http.post(url.clone()), &url).await?;
        parse_json(&url, resp).await
    }

    pub async fn audits(&self) -> Result<Vec<AuditRecord>, ApiError> {
        self.get_json("audits").await
    }

    pub async fn audit_stats(&self) -> Result<AuditStats, ApiError> {
        self.get_json("audits/stats").await
    }

    /// Stream a job's sanitized CSV to `target`.
    ///
    /// If `target` is an existing directory the file name comes from the
    /// `Content-Disposition` header, falling back to `fallback_name`. Only the
    /// last path segment of either name is used. The body is written to a
    /// `.part` sibling and renamed into place once complete, so a failed
    /// transfer leaves any existing file untouched.
    pub async fn download(
        &self,
        job_id: JobId,
        target: &Path,
        fallback_name: &str,
    ) -> Result<PathBuf, ApiError> {
        let url = self.download_url(job_id)?;
        debug!(%url, target = %target.display(), "downloading sanitized file");
        let resp = self.send(self.http.get(url.clone()), &url).await?;

        let file_path = if tokio::fs::metadata(target)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            let name = filename_from_headers(&resp)
                .and_then(|n| safe_file_name(&n))
                .or_else(|| safe_file_name(fallback_name))
                .unwrap_or_else(|| "sanitized.csv".to_string());
            target.join(name)
        } else {
            target.to_path_buf()
        };

        let mut part = file_path.clone().into_os_string();
        part.push(".part");
        let part_path = PathBuf::from(part);

        if let Err(e) = write_body(resp, &url, &part_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e);
        }
        if let Err(source) = tokio::fs::rename(&part_path, &file_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(ApiError::File {
                path: file_path,
                source,
            });
        }

        Ok(file_path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let resp = self.send(self.http.get(url.clone()), &url).await?;
        parse_json(&url, resp).await
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: &Url) -> Result<Response, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: resp.status(),
            });
        }
        Ok(resp)
    }
}

async fn parse_json<T: DeserializeOwned>(url: &Url, resp: Response) -> Result<T, ApiError> {
    let body = resp.text().await.map_err(|e| ApiError::Transport {
        url: url.to_string(),
        source: e,
    })?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        source: e,
    })
}

async fn csv_part(path: &Path) -> Result<Part, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| ApiError::File {
        path: path.to_path_buf(),
        source: e,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

async fn write_body(resp: Response, url: &Url, path: &Path) -> Result<(), ApiError> {
    let file_err = |source: std::io::Error| ApiError::File {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(file_err)?;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        file.write_all(&chunk).await.map_err(file_err)?;
    }
    file.flush().await.map_err(file_err)
}

/// Last path segment of `name`, or `None` if nothing usable is left.
fn safe_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    match last {
        "" | "." | ".." => None,
        s if s.contains(':') => None,
        s => Some(s.to_string()),
    }
}

fn filename_from_headers(resp: &Response) -> Option<String> {
    resp.headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?
        .split("filename=")
        .nth(1)?
        .split(';')
        .next()
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_config;

    #[test]
    fn endpoint_joins_api_prefix() {
        let client = SanitizerClient::new(&test_config("http://localhost:8080/")).unwrap();
        assert_eq!(
            client.endpoint("jobs/42").unwrap().as_str(),
            "http://localhost:8080/api/v1/jobs/42"
        );
        assert_eq!(
            client.download_url(42).unwrap().as_str(),
            "http://localhost:8080/api/v1/jobs/42/download"
        );
    }

    #[test]
    fn rejects_malformed_base_url() {
        assert!(matches!(
            SanitizerClient::new(&test_config("not a url")),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn health_reports_online_and_offline() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();

        let up = server
            .mock("GET", "/api/v1/health")
            .with_status(200)
            .with_body(r#"{"status":"UP","version":"1.0.0"}"#)
            .create_async()
            .await;
        let status = client.health().await;
        up.assert_async().await;
        match status {
            HealthStatus::Online(Some(report)) => {
                assert_eq!(report.status.as_deref(), Some("UP"));
                assert_eq!(report.version.as_deref(), Some("1.0.0"));
            }
            other => panic!("expected online, got {other:?}"),
        }

        let mut down = mockito::Server::new_async().await;
        down.mock("GET", "/api/v1/health")
            .with_status(503)
            .create_async()
            .await;
        let client = SanitizerClient::new(&test_config(&down.url())).unwrap();
        assert_eq!(client.health().await, HealthStatus::Offline);
    }

    #[tokio::test]
    async fn health_is_offline_when_unreachable() {
        let client = SanitizerClient::new(&test_config("http://127.0.0.1:9")).unwrap();
        assert_eq!(client.health().await, HealthStatus::Offline);
    }

    #[tokio::test]
    async fn sanitize_sends_file_and_config() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name,email\nAda,ada@example.com\n").unwrap();

        let mock = server
            .mock("POST", "/api/v1/sanitize")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex(r#"name="file"; filename="people.csv""#.into()),
                mockito::Matcher::Regex(r#"\{"columns":\{"email":"MASK"\}\}"#.into()),
            ]))
            .with_status(202)
            .with_body(r#"{"jobExecutionId": 42, "status": "STARTING"}"#)
            .create_async()
            .await;

        let mut columns = crate::model::ColumnRules::new();
        columns.insert("email".into(), crate::model::Operation::Mask);
        let job = client
            .sanitize(&path, &SanitizeRequest { columns })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(job.job_execution_id, 42);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();
        server
            .mock("GET", "/api/v1/jobs/5")
            .with_status(404)
            .create_async()
            .await;

        let err = client.job_status(5).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { status, .. } if status == reqwest::StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();
        server
            .mock("GET", "/api/v1/jobs/5")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        assert!(matches!(
            client.job_status(5).await,
            Err(ApiError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn diff_passes_row_limit() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();
        let mock = server
            .mock("GET", "/api/v1/jobs/3/diff")
            .match_query(mockito::Matcher::UrlEncoded("rows".into(), "20".into()))
            .with_status(200)
            .with_body(
                r#"{"headers":["email"],"rows":[{"rowNumber":1,"cells":[
                    {"column":"email","originalValue":"a@b.c","sanitizedValue":"*****","changed":true,"operation":"MASK"}
                ]}],"totalChanges":1,"changesByColumn":{"email":1}}"#,
            )
            .create_async()
            .await;

        let diff = client.diff(3, 20).await.unwrap();
        mock.assert_async().await;
        assert_eq!(diff.total_changes, 1);
        assert!(diff.rows[0].cells[0].changed);
        assert_eq!(diff.changes_by_column.get("email"), Some(&1));
    }

    #[tokio::test]
    async fn download_names_file_from_content_disposition() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();
        server
            .mock("GET", "/api/v1/jobs/9/download")
            .with_status(200)
            .with_header("content-disposition", "attachment; filename=\"out_9.csv\"")
            .with_body("name,email\nAda,*****\n")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = client.download(9, dir.path(), "sanitized.csv").await.unwrap();
        assert_eq!(path, dir.path().join("out_9.csv"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "name,email\nAda,*****\n"
        );
    }

    #[tokio::test]
    async fn download_keeps_header_name_inside_target_dir() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();
        server
            .mock("GET", "/api/v1/jobs/9/download")
            .with_status(200)
            .with_header("content-disposition", "attachment; filename=\"../escaped.csv\"")
            .with_body("a\n")
            .create_async()
            .await;

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("out");
        std::fs::create_dir(&dir).unwrap();
        let path = client.download(9, &dir, "sanitized.csv").await.unwrap();
        assert_eq!(path, dir.join("escaped.csv"));
        assert!(!root.path().join("escaped.csv").exists());
    }

    #[tokio::test]
    async fn download_falls_back_when_header_name_is_unusable() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();
        server
            .mock("GET", "/api/v1/jobs/9/download")
            .with_status(200)
            .with_header("content-disposition", "attachment; filename=\"..\"")
            .with_body("a\n")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = client.download(9, dir.path(), "/data/out/people.csv").await.unwrap();
        assert_eq!(path, dir.path().join("people.csv"));
    }

    #[test]
    fn safe_file_name_keeps_last_segment() {
        assert_eq!(safe_file_name("out.csv").as_deref(), Some("out.csv"));
        assert_eq!(safe_file_name("../../etc/x.csv").as_deref(), Some("x.csv"));
        assert_eq!(safe_file_name("C:\\tmp\\y.csv").as_deref(), Some("y.csv"));
        assert_eq!(safe_file_name("/abs/"), None);
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name(""), None);
    }

    #[tokio::test]
    async fn truncated_download_leaves_existing_file_alone() {
        use std::io::{Read, Write};

        // Declares 100 bytes, sends 10, then hangs up.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 1024];
            while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = conn.read(&mut buf).unwrap();
                if n == 0 {
                    return;
                }
                req.extend_from_slice(&buf[..n]);
            }
            conn.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nname,email")
                .unwrap();
            conn.flush().unwrap();
        });

        let client = SanitizerClient::new(&test_config(&format!("http://{addr}"))).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("result.csv");
        std::fs::write(&target, "previous\n").unwrap();

        let err = client.download(9, &target, "sanitized.csv").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }), "{err}");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "previous\n");
        assert!(!dir.path().join("result.csv.part").exists());
    }

    #[tokio::test]
    async fn stop_and_restart_hit_job_actions() {
        let mut server = mockito::Server::new_async().await;
        let client = SanitizerClient::new(&test_config(&server.url())).unwrap();
        let stop = server
            .mock("POST", "/api/v1/jobs/4/stop")
            .with_status(202)
            .create_async()
            .await;
        let restart = server
            .mock("POST", "/api/v1/jobs/4/restart")
            .with_status(202)
            .with_body(r#"{"jobExecutionId": 5, "status": "STARTED"}"#)
            .create_async()
            .await;

        client.stop_job(4).await.unwrap();
        let job = client.restart_job(4).await.unwrap();
        stop.assert_async().await;
        restart.assert_async().await;
        assert_eq!(job.job_execution_id, 5);
    }
}
