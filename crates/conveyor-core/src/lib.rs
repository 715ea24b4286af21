//! Core domain types and traits for the Conveyor build scheduler.
//!
//! This crate contains:
//! - Integer identifiers for builds, jobs, resources and versions
//! - Job, resource and resource type configuration
//! - Build records, build inputs and build status
//! - Pipeline and job records as seen by the scheduler
//! - The versions database snapshot and input mappings
//! - Build plans and the execution engine traits

pub mod build;
pub mod config;
pub mod engine;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod plan;
pub mod versions;

pub use build::{Build, BuildInput, BuildStatus};
pub use config::{
    JobConfig, JobInput, ResourceConfig, ResourceType, StepConfig, Version, VersionedResourceType,
};
pub use engine::{Engine, EngineBuild};
pub use error::{Error, Result};
pub use id::{BuildId, JobId, ResourceId, VersionId};
pub use pipeline::{Job, Pipeline};
pub use plan::{Plan, PlanId, PlanStep};
pub use versions::{InputMapping, InputVersion, VersionsDb};
