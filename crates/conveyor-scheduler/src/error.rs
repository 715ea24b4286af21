//! Scheduler error types.
//!
//! Every variant is a structural failure: it aborts the whole admission pass.
//! Failures local to one build are logged and never surface here.

use conveyor_core::{BuildId, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to update max in flight for job {job}: {source}")]
    MaxInFlight { job: String, source: Error },

    #[error("failed to scan resource {resource}: {source}")]
    Scan { resource: String, source: Error },

    #[error("failed to load versions db: {0}")]
    LoadVersions(#[source] Error),

    #[error("failed to save next input mapping for job {job}: {source}")]
    InputMapping { job: String, source: Error },

    #[error("failed to check if pipeline {pipeline} is paused: {source}")]
    CheckPaused { pipeline: String, source: Error },

    #[error("failed to look up job {job}: {source}")]
    JobLookup { job: String, source: Error },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("failed to get next build inputs for job {job}: {source}")]
    NextBuildInputs { job: String, source: Error },

    #[error("failed to schedule build {build_id}: {source}")]
    Schedule { build_id: BuildId, source: Error },

    #[error("failed to use inputs for build {build_id}: {source}")]
    UseInputs { build_id: BuildId, source: Error },
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
