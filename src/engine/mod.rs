mod client;
mod poll;

pub use client::{ApiError, SanitizerClient};

use crate::model::{ClientConfig, JobEvent, JobHandle, JobId};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum JobControl {
    /// Stop polling at the next suspension point
    Cancel,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("select a CSV file and at least one column rule before submitting")]
    NotSubmittable,
    #[error("a job is already {0}")]
    Busy(crate::model::JobPhase),
    #[error("the previous job finished; reset before starting a new one")]
    AlreadyFinished,
    #[error("Job failed to start: {0}")]
    Submit(#[source] ApiError),
    #[error("Failed to check status: {0}")]
    StatusCheck(#[source] ApiError),
    #[error("Job failed: {}", .description.as_deref().unwrap_or("Unknown error"))]
    JobFailed {
        job: Box<JobHandle>,
        description: Option<String>,
    },
    #[error("stopped waiting for job {job_id} after {}", humantime::format_duration(.waited.to_owned()))]
    TimedOut { job_id: JobId, waited: Duration },
    #[error("polling cancelled for job {0}")]
    Cancelled(JobId),
    #[error("no job is being polled")]
    NotRunning,
    #[error("poll task ended abnormally: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Cloneable handle that cancels a running poll task.
#[derive(Debug, Clone)]
pub struct PollCanceller {
    job_id: JobId,
    ctrl_tx: mpsc::UnboundedSender<JobControl>,
}

impl PollCanceller {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Returns false if the task already finished.
    pub fn cancel(&self) -> bool {
        self.ctrl_tx.send(JobControl::Cancel).is_ok()
    }
}

/// A spawned poll task for one job.
pub struct PollHandle {
    canceller: PollCanceller,
    handle: tokio::task::JoinHandle<Result<JobHandle, JobError>>,
}

impl PollHandle {
    pub fn canceller(&self) -> PollCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// Drop the task at its next suspension point; it emits nothing further.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the final job state or the error that ended polling.
    pub async fn join(self) -> Result<JobHandle, JobError> {
        self.handle.await?
    }
}

/// Start polling `job_id` on the runtime. Each status response is sent to
/// `event_tx` as [`JobEvent::Progress`].
pub fn spawn_poll(
    client: SanitizerClient,
    cfg: &ClientConfig,
    job_id: JobId,
    event_tx: mpsc::UnboundedSender<JobEvent>,
) -> PollHandle {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<JobControl>();
    let params = poll::PollParams {
        job_id,
        interval: cfg.poll_interval,
        max_wait: cfg.max_wait,
    };
    let handle =
        tokio::spawn(async move { poll::poll_until_terminal(&client, params, &event_tx, ctrl_rx).await });
    PollHandle {
        canceller: PollCanceller { job_id, ctrl_tx },
        handle,
    }
}

#[cfg(test)]
pub(crate) fn test_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        poll_interval: Duration::from_millis(10),
        max_wait: None,
        request_timeout: Duration::from_secs(5),
        user_agent: "csv-sanitizer-test".into(),
    }
}
