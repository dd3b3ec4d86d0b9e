use crate::engine::client::SanitizerClient;
use crate::engine::{JobControl, JobError};
use crate::model::{JobEvent, JobHandle, JobId, JobStatus};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Parameters for a status poll loop.
pub(crate) struct PollParams {
    pub job_id: JobId,
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

/// Fetch job status every `interval` until the backend reports a terminal
/// status.
///
/// A fetch or decode failure ends the loop at once; there is no retry. Status
/// values other than COMPLETED, SUCCESS and FAILED keep the loop going.
pub(crate) async fn poll_until_terminal(
    client: &SanitizerClient,
    params: PollParams,
    event_tx: &mpsc::UnboundedSender<JobEvent>,
    mut control_rx: mpsc::UnboundedReceiver<JobControl>,
) -> Result<JobHandle, JobError> {
    let PollParams {
        job_id,
        interval,
        max_wait,
    } = params;
    let start = Instant::now();
    let mut control_open = true;

    loop {
        let job = match client.job_status(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id, error = %e, "status check failed");
                return Err(JobError::StatusCheck(e));
            }
        };
        debug!(
            job_id,
            status = %job.status,
            rows = job.rows_processed.unwrap_or(0),
            "job status"
        );
        let _ = event_tx.send(JobEvent::Progress {
            job: Box::new(job.clone()),
        });

        if job.status.is_success() {
            return Ok(job);
        }
        if job.status == JobStatus::Failed {
            let description = job.exit_description.clone();
            return Err(JobError::JobFailed {
                job: Box::new(job),
                description,
            });
        }

        if let Some(max) = max_wait {
            if start.elapsed() >= max {
                warn!(job_id, "giving up on job after {}", humantime::format_duration(max));
                return Err(JobError::TimedOut {
                    job_id,
                    waited: start.elapsed(),
                });
            }
        }

        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                ctrl = control_rx.recv(), if control_open => match ctrl {
                    Some(JobControl::Cancel) => {
                        debug!(job_id, "polling cancelled");
                        return Err(JobError::Cancelled(job_id));
                    }
                    // All cancellers dropped: nothing can cancel any more, keep polling.
                    None => control_open = false,
                },
            }
        }
    }
}
