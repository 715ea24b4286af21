//! Max-in-flight accounting.

use async_trait::async_trait;
use conveyor_core::{BuildId, JobConfig, Pipeline, Result};
use std::sync::Arc;
use tracing::debug;

/// Decides whether a job is at its concurrency ceiling for a given build.
#[async_trait]
pub trait MaxInFlightUpdater: Send + Sync {
    /// Returns true when `build_id` must not start now. The decision is
    /// persisted on the job as a side effect.
    async fn update_max_in_flight_reached(
        &self,
        job_config: &JobConfig,
        build_id: BuildId,
    ) -> Result<bool>;
}

/// Counts running builds across the job's serial groups.
pub struct PipelineMaxInFlightUpdater {
    pipeline: Arc<dyn Pipeline>,
}

impl PipelineMaxInFlightUpdater {
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self { pipeline }
    }

    async fn is_reached(&self, job_config: &JobConfig, build_id: BuildId) -> Result<bool> {
        let max_in_flight = job_config.max_in_flight();
        if max_in_flight == 0 {
            return Ok(false);
        }

        let serial_groups = job_config.effective_serial_groups();
        let running = self
            .pipeline
            .running_builds_by_serial_group(&job_config.name, &serial_groups)
            .await?;
        if running.len() >= max_in_flight as usize {
            return Ok(true);
        }

        // Below the ceiling, only the oldest pending build in the groups may go.
        let next = self
            .pipeline
            .next_pending_build_by_serial_group(&job_config.name, &serial_groups)
            .await?;
        Ok(match next {
            Some(next) => next != build_id,
            None => true,
        })
    }
}

#[async_trait]
impl MaxInFlightUpdater for PipelineMaxInFlightUpdater {
    async fn update_max_in_flight_reached(
        &self,
        job_config: &JobConfig,
        build_id: BuildId,
    ) -> Result<bool> {
        let reached = self.is_reached(job_config, build_id).await?;
        debug!(job = %job_config.name, %build_id, reached, "Max in flight");
        self.pipeline
            .set_max_in_flight_reached(&job_config.name, reached)
            .await?;
        Ok(reached)
    }
}
