//! Application-level orchestration.
//!
//! This module owns the job lifecycle (submit/poll/reset) and post-job
//! processing such as download, diff, auto-save, and exports. The CLI layer
//! calls into this module to keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::JobController;
pub(crate) use post_process::{process_job_completion, CompletionOptions, ProcessedJob};
