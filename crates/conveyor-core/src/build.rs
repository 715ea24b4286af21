//! Build records as seen by the scheduler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Version;
use crate::{BuildId, Result, VersionId};

/// Lifecycle status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
    /// The build could not run at all (e.g. its plan failed to compile).
    Errored,
    Aborted,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Started => "started",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::Errored => "errored",
            BuildStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Succeeded | BuildStatus::Failed | BuildStatus::Errored | BuildStatus::Aborted
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BuildStatus::Pending),
            "started" => Ok(BuildStatus::Started),
            "succeeded" => Ok(BuildStatus::Succeeded),
            "failed" => Ok(BuildStatus::Failed),
            "errored" => Ok(BuildStatus::Errored),
            "aborted" => Ok(BuildStatus::Aborted),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown build status: {}",
                other
            ))),
        }
    }
}

/// A resolved input bound to a specific build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInput {
    /// Input name (the get step's name).
    pub name: String,
    /// The versioned resource row this input resolved to.
    pub version_id: VersionId,
    /// Resource the version belongs to.
    pub resource: String,
    /// Resource type name.
    pub resource_type: String,
    pub version: Version,
    /// Whether this is the first build to use this version for this input.
    pub first_occurrence: bool,
}

/// A build record owned by the persistence layer.
///
/// The scheduler never creates or owns builds; it observes them and drives
/// their lifecycle through these operations.
#[async_trait]
pub trait Build: Send + Sync {
    fn id(&self) -> BuildId;

    /// Whether a user requested this build directly.
    fn is_manually_triggered(&self) -> bool;

    /// Atomically claim the build for starting.
    ///
    /// Returns `false` without error when another scheduler already claimed it.
    async fn schedule(&self) -> Result<bool>;

    /// Attach resolved inputs to the build.
    async fn use_inputs(&self, inputs: &[BuildInput]) -> Result<()>;

    /// Mark the build as finished with a terminal status.
    async fn finish(&self, status: BuildStatus) -> Result<()>;
}
