//! Pipeline and job records as seen by the scheduler.

use async_trait::async_trait;
use std::sync::Arc;

use crate::build::BuildInput;
use crate::versions::{InputMapping, VersionsDb};
use crate::{BuildId, JobId, Result};

/// A job record.
pub trait Job: Send + Sync {
    fn id(&self) -> JobId;
    fn name(&self) -> &str;
    fn paused(&self) -> bool;
}

/// A pipeline record and the queries the scheduler runs against it.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the pipeline is currently paused.
    async fn check_paused(&self) -> Result<bool>;

    /// Look up a job by name. `None` if the pipeline has no such job.
    async fn job(&self, name: &str) -> Result<Option<Arc<dyn Job>>>;

    /// Inputs precomputed for the job's next build.
    ///
    /// `None` while no valid inputs have been determined.
    async fn next_build_inputs(&self, job_name: &str) -> Result<Option<Vec<BuildInput>>>;

    /// Load a fresh, consistent snapshot of the pipeline's version history.
    async fn load_versions_db(&self) -> Result<VersionsDb>;

    /// Persist the mapping as the job's next build inputs.
    async fn save_next_input_mapping(&self, job_name: &str, mapping: &InputMapping)
    -> Result<()>;

    /// Forget the job's next build inputs.
    async fn delete_next_input_mapping(&self, job_name: &str) -> Result<()>;

    /// Builds that are scheduled but not yet completed in any of the serial groups.
    async fn running_builds_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> Result<Vec<BuildId>>;

    /// The oldest pending build in any of the serial groups.
    async fn next_pending_build_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> Result<Option<BuildId>>;

    /// Record whether the job is currently held back by its ceiling.
    async fn set_max_in_flight_reached(&self, job_name: &str, reached: bool) -> Result<()>;
}
