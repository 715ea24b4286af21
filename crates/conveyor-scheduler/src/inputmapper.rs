//! Next-input mapping for jobs.

use async_trait::async_trait;
use conveyor_core::{InputMapping, JobConfig, JobInput, Pipeline, Result, VersionsDb};
use std::sync::Arc;
use tracing::debug;

/// Picks a version for every input of a job from a versions snapshot.
pub trait InputResolver: Send + Sync {
    /// `None` when some input has no satisfying version.
    fn resolve(&self, versions: &VersionsDb, inputs: &[JobInput]) -> Option<InputMapping>;
}

/// Computes and persists the next input mapping of a job.
#[async_trait]
pub trait InputMapper: Send + Sync {
    async fn save_next_input_mapping(
        &self,
        versions: &VersionsDb,
        job_config: &JobConfig,
    ) -> Result<Option<InputMapping>>;
}

pub struct PipelineInputMapper {
    pipeline: Arc<dyn Pipeline>,
    resolver: Arc<dyn InputResolver>,
}

impl PipelineInputMapper {
    pub fn new(pipeline: Arc<dyn Pipeline>, resolver: Arc<dyn InputResolver>) -> Self {
        Self { pipeline, resolver }
    }
}

#[async_trait]
impl InputMapper for PipelineInputMapper {
    async fn save_next_input_mapping(
        &self,
        versions: &VersionsDb,
        job_config: &JobConfig,
    ) -> Result<Option<InputMapping>> {
        let mapping = self.resolver.resolve(versions, &job_config.inputs());

        match &mapping {
            Some(mapping) => {
                debug!(job = %job_config.name, inputs = mapping.len(), "Saving next input mapping");
                self.pipeline
                    .save_next_input_mapping(&job_config.name, mapping)
                    .await?;
            }
            None => {
                debug!(job = %job_config.name, "No satisfiable inputs, clearing next input mapping");
                self.pipeline
                    .delete_next_input_mapping(&job_config.name)
                    .await?;
            }
        }

        Ok(mapping)
    }
}
