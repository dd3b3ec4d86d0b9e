use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Backend job execution id.
pub type JobId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Upper bound on total polling time; `None` polls until a terminal status.
    #[serde(default, with = "humantime_serde")]
    pub max_wait: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

/// Sanitization operation applied to a single column.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    #[default]
    Mask,
    Hash,
    Nullify,
    Randomize,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Mask,
        Operation::Hash,
        Operation::Nullify,
        Operation::Randomize,
    ];

    /// Wire name, sent verbatim to the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Mask => "MASK",
            Operation::Hash => "HASH",
            Operation::Nullify => "NULLIFY",
            Operation::Randomize => "RANDOMIZE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown operation '{s}' (expected one of MASK, HASH, NULLIFY, RANDOMIZE)")
            })
    }
}

/// Column name to operation. Sorted so the submitted JSON is deterministic.
pub type ColumnRules = BTreeMap<String, Operation>;

/// Body of the `config` multipart field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeRequest {
    pub columns: ColumnRules,
}

/// Job status as reported by the backend.
///
/// Values other than the named ones are kept verbatim and are not terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    #[default]
    Running,
    Completed,
    Success,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Success | JobStatus::Failed
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Success)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
            JobStatus::Other(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "SUCCESS" => JobStatus::Success,
            "FAILED" => JobStatus::Failed,
            _ => JobStatus::Other(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(s: JobStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of a backend job. Only ever replaced by a newer poll response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_execution_id: JobId,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default, deserialize_with = "status_or_default")]
    pub status: JobStatus,
    #[serde(default)]
    pub input_file: Option<String>,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub rows_processed: Option<u64>,
    #[serde(default)]
    pub rows_skipped: Option<u64>,
    #[serde(default)]
    pub exit_description: Option<String>,
}

// `"status": null` means the job has not reported yet.
fn status_or_default<'de, D>(de: D) -> Result<JobStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?
        .map(JobStatus::from)
        .unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub total_rows: i64,
    #[serde(default)]
    pub preview_rows: u64,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<DiffRow>,
    #[serde(default)]
    pub total_changes: u64,
    #[serde(default)]
    pub changes_by_column: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRow {
    pub row_number: u64,
    #[serde(default)]
    pub cells: Vec<DiffCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffCell {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub original_value: Option<String>,
    #[serde(default)]
    pub sanitized_value: Option<String>,
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub operation: Option<String>,
}

/// One row of the backend's job audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: u64,
    #[serde(default)]
    pub job_execution_id: Option<JobId>,
    #[serde(default)]
    pub job_uuid: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub input_file_name: Option<String>,
    #[serde(default)]
    pub output_file_name: Option<String>,
    #[serde(default)]
    pub rows_processed: Option<u64>,
    #[serde(default)]
    pub rows_skipped: Option<u64>,
    #[serde(default)]
    pub columns_sanitized: Option<u32>,
    #[serde(default)]
    pub rules_applied: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub processing_rate: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    #[serde(default)]
    pub total_jobs: u64,
    #[serde(default)]
    pub successful_jobs: u64,
    #[serde(default)]
    pub failed_jobs: u64,
    #[serde(default)]
    pub total_rows_processed: u64,
    #[serde(default)]
    pub average_processing_rate: f64,
}

/// Body of `GET /health`. Every field is informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "report", rename_all = "lowercase")]
pub enum HealthStatus {
    Online(Option<HealthReport>),
    Offline,
}

impl HealthStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, HealthStatus::Online(_))
    }
}

/// Lifecycle of the single job a controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Idle,
    Submitting,
    Running,
    Succeeded,
    Failed,
}

impl JobPhase {
    pub fn is_active(self) -> bool {
        matches!(self, JobPhase::Submitting | JobPhase::Running)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Idle => "idle",
            JobPhase::Submitting => "submitting",
            JobPhase::Running => "running",
            JobPhase::Succeeded => "succeeded",
            JobPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    PhaseChanged {
        phase: JobPhase,
    },
    Submitted {
        job_id: JobId,
    },
    /// One status response from the poll loop.
    Progress {
        job: Box<JobHandle>,
    },
    Completed {
        job: Box<JobHandle>,
    },
    Failed {
        message: String,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the engine and consumed by CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    PreviewDegraded { reason: String },
    Cancelling { job_id: JobId },
}

impl InfoEvent {
    /// Render a human-readable message for CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::PreviewDegraded { reason } => {
                format!("Server preview unavailable ({reason}); headers parsed locally")
            }
            InfoEvent::Cancelling { job_id } => format!("Cancelling polling for job {job_id}…"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("mask".parse::<Operation>(), Ok(Operation::Mask));
        assert_eq!(" Randomize ".parse::<Operation>(), Ok(Operation::Randomize));
        assert!("scramble".parse::<Operation>().is_err());
    }

    #[test]
    fn request_serializes_operations_verbatim() {
        let mut columns = ColumnRules::new();
        columns.insert("email".into(), Operation::Mask);
        columns.insert("ssn".into(), Operation::Hash);
        let json = serde_json::to_string(&SanitizeRequest { columns }).unwrap();
        assert_eq!(json, r#"{"columns":{"email":"MASK","ssn":"HASH"}}"#);
    }

    #[test]
    fn job_handle_defaults_missing_status_to_running() {
        let job: JobHandle = serde_json::from_str(r#"{"jobExecutionId": 42}"#).unwrap();
        assert_eq!(job.job_execution_id, 42);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.rows_processed, None);

        let job: JobHandle =
            serde_json::from_str(r#"{"jobExecutionId": 7, "status": null}"#).unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }

    #[test]
    fn unknown_status_is_kept_and_not_terminal() {
        let job: JobHandle =
            serde_json::from_str(r#"{"jobExecutionId": 1, "status": "STARTING"}"#).unwrap();
        assert_eq!(job.status, JobStatus::Other("STARTING".into()));
        assert!(!job.status.is_terminal());
        assert_eq!(job.status.to_string(), "STARTING");
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_success());
        assert!(JobStatus::Success.is_success());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Failed.is_success());
        assert!(!JobStatus::Running.is_terminal());
    }
}
