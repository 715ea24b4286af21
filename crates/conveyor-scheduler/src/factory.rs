//! Build plan compilation.

use conveyor_core::plan::{GetPlan, PutPlan, TaskPlan};
use conveyor_core::{
    BuildInput, Error, JobConfig, Plan, PlanId, PlanStep, ResourceConfig, Result, StepConfig,
    VersionedResourceType,
};

/// Compiles a job's configuration and a build's bound inputs into a plan.
pub trait BuildFactory: Send + Sync {
    fn create(
        &self,
        job_config: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[VersionedResourceType],
        inputs: &[BuildInput],
    ) -> Result<Plan>;
}

/// Compiles the job's plan steps one-to-one into plan nodes.
///
/// A job with several top-level steps runs them in sequence under a single
/// `Do` node.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFactory;

impl BuildFactory for PlanFactory {
    fn create(
        &self,
        job_config: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[VersionedResourceType],
        inputs: &[BuildInput],
    ) -> Result<Plan> {
        let mut compiler = Compiler {
            resources,
            resource_types,
            inputs,
            next_id: 0,
        };

        match job_config.plan.as_slice() {
            [] => Err(Error::InvalidInput(format!(
                "job {} has an empty plan",
                job_config.name
            ))),
            [step] => compiler.compile(step),
            steps => compiler.compile_sequence(steps),
        }
    }
}

struct Compiler<'a> {
    resources: &'a [ResourceConfig],
    resource_types: &'a [VersionedResourceType],
    inputs: &'a [BuildInput],
    next_id: u64,
}

impl Compiler<'_> {
    fn plan_id(&mut self) -> PlanId {
        self.next_id += 1;
        PlanId::new(self.next_id.to_string())
    }

    fn resource(&self, name: &str) -> Result<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown resource: {}", name)))
    }

    fn compile_sequence(&mut self, steps: &[StepConfig]) -> Result<Plan> {
        let id = self.plan_id();
        let children = steps
            .iter()
            .map(|step| self.compile(step))
            .collect::<Result<Vec<_>>>()?;
        Ok(Plan {
            id,
            step: PlanStep::Do(children),
        })
    }

    fn compile(&mut self, step: &StepConfig) -> Result<Plan> {
        let id = self.plan_id();
        let step = match step {
            StepConfig::Get { name, params, .. } => {
                let resource = self.resource(step.resource_name().unwrap_or(name))?;
                let version = self
                    .inputs
                    .iter()
                    .find(|input| &input.name == name)
                    .map(|input| input.version.clone());
                PlanStep::Get(GetPlan {
                    name: name.clone(),
                    resource: resource.name.clone(),
                    type_: resource.type_.clone(),
                    source: resource.source.clone(),
                    params: params.clone(),
                    version,
                    resource_types: self.resource_types.to_vec(),
                })
            }
            StepConfig::Put { name, params, .. } => {
                let resource = self.resource(step.resource_name().unwrap_or(name))?;
                PlanStep::Put(PutPlan {
                    name: name.clone(),
                    resource: resource.name.clone(),
                    type_: resource.type_.clone(),
                    source: resource.source.clone(),
                    params: params.clone(),
                    resource_types: self.resource_types.to_vec(),
                })
            }
            StepConfig::Task {
                name,
                file,
                privileged,
            } => PlanStep::Task(TaskPlan {
                name: name.clone(),
                config_path: file.clone(),
                privileged: *privileged,
            }),
            StepConfig::Aggregate(steps) => PlanStep::Aggregate(
                steps
                    .iter()
                    .map(|s| self.compile(s))
                    .collect::<Result<Vec<_>>>()?,
            ),
            StepConfig::Do(steps) => PlanStep::Do(
                steps
                    .iter()
                    .map(|s| self.compile(s))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        Ok(Plan { id, step })
    }
}
