//! Job, resource and resource type configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resource version, e.g. `{"ref": "abc123"}`.
pub type Version = BTreeMap<String, String>;

/// A resource declared by a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource name (e.g., "repo").
    pub name: String,
    /// Resource type name (e.g., "git").
    #[serde(rename = "type")]
    pub type_: String,
    /// Type-specific source configuration.
    pub source: serde_json::Value,
}

/// A custom resource type declared by a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceType {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
    #[serde(default)]
    pub privileged: bool,
}

/// A resource type together with the version it was last checked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedResourceType {
    pub resource_type: ResourceType,
    pub version: Version,
}

/// A step in a job's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepConfig {
    /// Fetch a version of a resource.
    Get {
        name: String,
        /// Resource to fetch; defaults to `name`.
        resource: Option<String>,
        /// Jobs the version must have passed through.
        passed: Vec<String>,
        /// Whether new versions trigger the job.
        trigger: bool,
        params: Option<serde_json::Value>,
    },
    /// Push to a resource.
    Put {
        name: String,
        resource: Option<String>,
        params: Option<serde_json::Value>,
    },
    /// Run a task.
    Task {
        name: String,
        file: Option<String>,
        privileged: bool,
    },
    /// Run steps in parallel.
    Aggregate(Vec<StepConfig>),
    /// Run steps in sequence.
    Do(Vec<StepConfig>),
}

impl StepConfig {
    /// The resource a get or put step refers to.
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            StepConfig::Get { name, resource, .. } | StepConfig::Put { name, resource, .. } => {
                Some(resource.as_deref().unwrap_or(name))
            }
            _ => None,
        }
    }
}

/// An input of a job, derived from one of its get steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInput {
    pub name: String,
    pub resource: String,
    pub passed: Vec<String>,
    pub trigger: bool,
}

/// Configuration of a single job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub plan: Vec<StepConfig>,
    #[serde(default)]
    pub serial: bool,
    #[serde(default)]
    pub serial_groups: Vec<String>,
    /// Configured `max_in_flight`; 0 means unlimited.
    #[serde(default)]
    pub raw_max_in_flight: u32,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// All get steps of the plan, in plan order, including nested ones.
    pub fn inputs(&self) -> Vec<JobInput> {
        let mut inputs = Vec::new();
        collect_inputs(&self.plan, &mut inputs);
        inputs
    }

    /// The concurrency ceiling for this job. 0 means unlimited.
    pub fn max_in_flight(&self) -> u32 {
        if self.serial || !self.serial_groups.is_empty() {
            return 1;
        }
        self.raw_max_in_flight
    }

    /// Serial groups whose running builds count against this job's ceiling.
    pub fn effective_serial_groups(&self) -> Vec<String> {
        if !self.serial_groups.is_empty() {
            return self.serial_groups.clone();
        }
        if self.serial || self.raw_max_in_flight > 0 {
            return vec![self.name.clone()];
        }
        Vec::new()
    }
}

fn collect_inputs(steps: &[StepConfig], inputs: &mut Vec<JobInput>) {
    for step in steps {
        match step {
            StepConfig::Get {
                name,
                resource,
                passed,
                trigger,
                ..
            } => inputs.push(JobInput {
                name: name.clone(),
                resource: resource.clone().unwrap_or_else(|| name.clone()),
                passed: passed.clone(),
                trigger: *trigger,
            }),
            StepConfig::Aggregate(nested) | StepConfig::Do(nested) => {
                collect_inputs(nested, inputs)
            }
            StepConfig::Put { .. } | StepConfig::Task { .. } => {}
        }
    }
}
