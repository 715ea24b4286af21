//! Build admission.
//!
//! [`PipelineBuildStarter`] walks a job's pending builds in order and admits
//! each one that passes the job's gates: the max-in-flight ceiling, pipeline
//! and job pauses, and the availability of next inputs. An admitted build is
//! claimed atomically, bound to its inputs, compiled into a plan and handed to
//! the engine, whose `resume` runs in the background.
//!
//! Failures fall into two classes. Structural ones (collaborator errors and
//! any closed gate) stop the whole pass. Build-local ones (a lost schedule
//! race, a plan that does not compile, an engine that refuses the build) only
//! skip the build at hand.
//!
//! When the lead pending build was triggered manually, the pass instead
//! refreshes the job's inputs: it scans every input resource, loads a fresh
//! versions snapshot and recomputes the next input mapping. The build itself
//! is admitted by a later pass once that mapping exists.

use async_trait::async_trait;
use conveyor_core::{
    Build, BuildId, BuildStatus, Engine, EngineBuild, JobConfig, Pipeline, ResourceConfig,
    VersionedResourceType,
};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::factory::BuildFactory;
use crate::inputmapper::InputMapper;
use crate::maxinflight::MaxInFlightUpdater;
use crate::scanner::Scanner;

/// Starts the pending builds of a job that are allowed to run.
#[async_trait]
pub trait BuildStarter: Send + Sync {
    /// `pending_builds` is in admission order. An empty list is a no-op.
    async fn try_start_pending_builds_for_job(
        &self,
        job_config: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[VersionedResourceType],
        pending_builds: &[Arc<dyn Build>],
    ) -> SchedulerResult<()>;
}

/// Why a pass stopped before running out of builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HaltReason {
    MaxInFlightReached,
    PipelinePaused,
    JobPaused,
    NoInputs,
}

/// What happened to a single build that did not halt the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Started,
    LostRace,
    PlanFailed,
    EngineFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Halt(HaltReason),
    Continue(Outcome),
}

pub struct PipelineBuildStarter {
    pipeline: Arc<dyn Pipeline>,
    updater: Arc<dyn MaxInFlightUpdater>,
    factory: Arc<dyn BuildFactory>,
    scanner: Arc<dyn Scanner>,
    input_mapper: Arc<dyn InputMapper>,
    engine: Arc<dyn Engine>,
}

impl PipelineBuildStarter {
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        updater: Arc<dyn MaxInFlightUpdater>,
        factory: Arc<dyn BuildFactory>,
        scanner: Arc<dyn Scanner>,
        input_mapper: Arc<dyn InputMapper>,
        engine: Arc<dyn Engine>,
    ) -> Self {
        Self {
            pipeline,
            updater,
            factory,
            scanner,
            input_mapper,
            engine,
        }
    }

    async fn prepare_manual_build(
        &self,
        job_config: &JobConfig,
        build_id: BuildId,
    ) -> SchedulerResult<()> {
        let reached = self
            .updater
            .update_max_in_flight_reached(job_config, build_id)
            .await
            .map_err(|source| SchedulerError::MaxInFlight {
                job: job_config.name.clone(),
                source,
            })?;
        if reached {
            debug!(%build_id, "Max in flight reached, not refreshing inputs");
            return Ok(());
        }

        for resource in input_resources(job_config) {
            self.scanner
                .scan(&resource)
                .await
                .map_err(|source| SchedulerError::Scan {
                    resource: resource.clone(),
                    source,
                })?;
        }

        let versions = self
            .pipeline
            .load_versions_db()
            .await
            .map_err(SchedulerError::LoadVersions)?;

        let mapping = self
            .input_mapper
            .save_next_input_mapping(&versions, job_config)
            .await
            .map_err(|source| SchedulerError::InputMapping {
                job: job_config.name.clone(),
                source,
            })?;

        info!(
            %build_id,
            resolved = mapping.is_some(),
            "Refreshed inputs for manually triggered build"
        );
        Ok(())
    }

    async fn try_start_next_pending_build(
        &self,
        job_config: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[VersionedResourceType],
        build: &Arc<dyn Build>,
    ) -> SchedulerResult<Admission> {
        let build_id = build.id();
        let job_name = &job_config.name;

        let reached = self
            .updater
            .update_max_in_flight_reached(job_config, build_id)
            .await
            .map_err(|source| SchedulerError::MaxInFlight {
                job: job_name.clone(),
                source,
            })?;
        if reached {
            return Ok(Admission::Halt(HaltReason::MaxInFlightReached));
        }

        let paused = self
            .pipeline
            .check_paused()
            .await
            .map_err(|source| SchedulerError::CheckPaused {
                pipeline: self.pipeline.name().to_string(),
                source,
            })?;
        if paused {
            return Ok(Admission::Halt(HaltReason::PipelinePaused));
        }

        let job = self
            .pipeline
            .job(job_name)
            .await
            .map_err(|source| SchedulerError::JobLookup {
                job: job_name.clone(),
                source,
            })?
            .ok_or_else(|| SchedulerError::JobNotFound(job_name.clone()))?;
        if job.paused() {
            return Ok(Admission::Halt(HaltReason::JobPaused));
        }

        let inputs = match self
            .pipeline
            .next_build_inputs(job_name)
            .await
            .map_err(|source| SchedulerError::NextBuildInputs {
                job: job_name.clone(),
                source,
            })? {
            Some(inputs) => inputs,
            None => return Ok(Admission::Halt(HaltReason::NoInputs)),
        };

        let scheduled = build
            .schedule()
            .await
            .map_err(|source| SchedulerError::Schedule { build_id, source })?;
        if !scheduled {
            return Ok(Admission::Continue(Outcome::LostRace));
        }

        build
            .use_inputs(&inputs)
            .await
            .map_err(|source| SchedulerError::UseInputs { build_id, source })?;

        let plan = match self
            .factory
            .create(job_config, resources, resource_types, &inputs)
        {
            Ok(plan) => plan,
            Err(e) => {
                error!(%build_id, error = %e, "Failed to create build plan");
                if let Err(e) = build.finish(BuildStatus::Errored).await {
                    error!(%build_id, error = %e, "Failed to mark build as errored");
                }
                return Ok(Admission::Continue(Outcome::PlanFailed));
            }
        };

        let engine_build = match self.engine.create_build(build.clone(), plan).await {
            Ok(engine_build) => engine_build,
            Err(e) => {
                warn!(%build_id, engine = self.engine.name(), error = %e, "Failed to create engine build");
                return Ok(Admission::Continue(Outcome::EngineFailed));
            }
        };

        info!(%build_id, engine = self.engine.name(), "Build started");
        spawn_resume(engine_build, build_id);
        Ok(Admission::Continue(Outcome::Started))
    }
}

#[async_trait]
impl BuildStarter for PipelineBuildStarter {
    #[instrument(skip_all, fields(job = %job_config.name, pending = pending_builds.len()))]
    async fn try_start_pending_builds_for_job(
        &self,
        job_config: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[VersionedResourceType],
        pending_builds: &[Arc<dyn Build>],
    ) -> SchedulerResult<()> {
        let Some(lead) = pending_builds.first() else {
            return Ok(());
        };

        if lead.is_manually_triggered() {
            return self.prepare_manual_build(job_config, lead.id()).await;
        }

        for build in pending_builds {
            match self
                .try_start_next_pending_build(job_config, resources, resource_types, build)
                .await
            {
                Ok(Admission::Continue(outcome)) => {
                    debug!(build_id = %build.id(), ?outcome, "Pending build handled");
                }
                Ok(Admission::Halt(reason)) => {
                    debug!(build_id = %build.id(), ?reason, "Not starting any more builds");
                    break;
                }
                Err(e) => {
                    error!(build_id = %build.id(), error = %e, "Admission failed");
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

/// Distinct input resources of a job, in plan order.
fn input_resources(job_config: &JobConfig) -> Vec<String> {
    let mut resources: Vec<String> = Vec::new();
    for input in job_config.inputs() {
        if !resources.contains(&input.resource) {
            resources.push(input.resource);
        }
    }
    resources
}

fn spawn_resume(engine_build: Box<dyn EngineBuild>, build_id: BuildId) {
    tokio::spawn(
        async move { engine_build.resume().await }
            .instrument(info_span!("resume", build_id = %build_id)),
    );
}
