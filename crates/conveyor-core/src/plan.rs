//! Build plans.
//!
//! A plan is compiled once from a job's configuration and resolved inputs,
//! attached to exactly one build and handed to the engine. It is never
//! mutated afterwards.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::config::{Version, VersionedResourceType};

/// Identifies a node within one plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct PlanId(String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// A node of a build plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub step: PlanStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStep {
    Get(GetPlan),
    Put(PutPlan),
    Task(TaskPlan),
    Aggregate(Vec<Plan>),
    Do(Vec<Plan>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPlan {
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
    pub params: Option<serde_json::Value>,
    /// Version pinned by the build's inputs; `None` fetches the latest.
    pub version: Option<Version>,
    pub resource_types: Vec<VersionedResourceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutPlan {
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub source: serde_json::Value,
    pub params: Option<serde_json::Value>,
    pub resource_types: Vec<VersionedResourceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub name: String,
    pub config_path: Option<String>,
    pub privileged: bool,
}
