//! Job lifecycle controller.
//!
//! Drives one job through IDLE → SUBMITTING → RUNNING → SUCCEEDED | FAILED and
//! emits events for presentation layers. A new job after success needs `reset`.

use crate::engine::{self, JobError, PollCanceller, PollHandle, SanitizerClient};
use crate::model::{ClientConfig, InfoEvent, JobEvent, JobHandle, JobId, JobPhase};
use crate::session::UploadState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub(crate) struct JobController {
    client: SanitizerClient,
    cfg: ClientConfig,
    event_tx: UnboundedSender<JobEvent>,
    phase: JobPhase,
    job: Option<JobHandle>,
    poll: Option<PollHandle>,
}

impl JobController {
    pub fn new(client: SanitizerClient, cfg: ClientConfig, event_tx: UnboundedSender<JobEvent>) -> Self {
        Self {
            client,
            cfg,
            event_tx,
            phase: JobPhase::Idle,
            job: None,
            poll: None,
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Last job state received from the backend.
    pub fn job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    /// Submit the session's file and rules, then start polling.
    ///
    /// On failure the session is left as it was so the same configuration can
    /// be submitted again.
    pub async fn submit(&mut self, session: &mut UploadState) -> Result<JobId, JobError> {
        let job = self.send_job(session).await?;
        let job_id = job.job_execution_id;
        self.start_polling(job);
        Ok(job_id)
    }

    /// Submit without polling. The job keeps running on the backend; this
    /// controller only records it.
    pub async fn submit_detached(&mut self, session: &mut UploadState) -> Result<JobId, JobError> {
        let job = self.send_job(session).await?;
        let job_id = job.job_execution_id;
        self.job = Some(job);
        self.set_phase(JobPhase::Running);
        Ok(job_id)
    }

    async fn send_job(&mut self, session: &mut UploadState) -> Result<JobHandle, JobError> {
        self.ensure_can_start()?;
        let file = match session.selected_file() {
            Some(file) if session.is_submittable() => file.clone(),
            _ => return Err(JobError::NotSubmittable),
        };
        let request = session.request();

        self.set_phase(JobPhase::Submitting);
        let job = match self.client.sanitize(&file.path, &request).await {
            Ok(job) => job,
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "submit failed");
                let err = JobError::Submit(e);
                self.fail(&err);
                return Err(err);
            }
        };

        let job_id = job.job_execution_id;
        info!(job_id, columns = request.columns.len(), "job submitted");
        session.set_current_job_id(job_id);
        let _ = self.event_tx.send(JobEvent::Submitted { job_id });
        Ok(job)
    }

    /// Follow a job that was started elsewhere (a previous run, a restart).
    pub fn attach(&mut self, job: JobHandle) -> Result<(), JobError> {
        self.ensure_can_start()?;
        debug!(job_id = job.job_execution_id, "attaching to job");
        self.start_polling(job);
        Ok(())
    }

    /// Handle that cancels the current poll task; `None` when not polling.
    pub fn canceller(&self) -> Option<PollCanceller> {
        self.poll.as_ref().map(PollHandle::canceller)
    }

    pub fn cancel(&self) -> bool {
        match &self.poll {
            Some(poll) => {
                let _ = self.event_tx.send(JobEvent::Info(InfoEvent::Cancelling {
                    job_id: poll.canceller().job_id(),
                }));
                poll.cancel()
            }
            None => false,
        }
    }

    /// Wait for the poll task to end and apply its outcome. Emits exactly one
    /// terminal event.
    pub async fn wait(&mut self) -> Result<JobHandle, JobError> {
        let poll = self.poll.take().ok_or(JobError::NotRunning)?;
        match poll.join().await {
            Ok(job) => {
                info!(
                    job_id = job.job_execution_id,
                    rows = job.rows_processed.unwrap_or(0),
                    "job completed"
                );
                self.job = Some(job.clone());
                self.set_phase(JobPhase::Succeeded);
                let _ = self.event_tx.send(JobEvent::Completed {
                    job: Box::new(job.clone()),
                });
                Ok(job)
            }
            Err(err) => {
                if let JobError::JobFailed { job, .. } = &err {
                    self.job = Some((**job).clone());
                }
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Drop the job (stopping any polling) and clear the session.
    ///
    /// The poll task is aborted rather than cancelled so that a fetch already
    /// in flight cannot report progress for the discarded job.
    pub fn reset(&mut self, session: &mut UploadState) {
        if let Some(poll) = self.poll.take() {
            if !poll.is_finished() {
                debug!("reset while polling; aborting poll task");
            }
            poll.abort();
        }
        self.job = None;
        session.reset();
        self.set_phase(JobPhase::Idle);
    }

    fn ensure_can_start(&self) -> Result<(), JobError> {
        match self.phase {
            phase if phase.is_active() => Err(JobError::Busy(phase)),
            JobPhase::Succeeded => Err(JobError::AlreadyFinished),
            _ => Ok(()),
        }
    }

    fn start_polling(&mut self, job: JobHandle) {
        let job_id = job.job_execution_id;
        self.job = Some(job);
        self.poll = Some(engine::spawn_poll(
            self.client.clone(),
            &self.cfg,
            job_id,
            self.event_tx.clone(),
        ));
        self.set_phase(JobPhase::Running);
    }

    fn fail(&mut self, err: &JobError) {
        self.set_phase(JobPhase::Failed);
        let _ = self.event_tx.send(JobEvent::Failed {
            message: err.to_string(),
        });
    }

    fn set_phase(&mut self, phase: JobPhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "job phase");
        }
        self.phase = phase;
        let _ = self.event_tx.send(JobEvent::PhaseChanged { phase });
    }
}
