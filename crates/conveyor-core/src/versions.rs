//! The versions database snapshot and input mappings.
//!
//! A [`VersionsDb`] is loaded once per resolution and only ever borrowed
//! immutably afterwards, so a resolution always sees one consistent view of
//! the version history.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::{BuildId, JobId, ResourceId, VersionId};

/// A known version of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub version_id: VersionId,
    pub resource_id: ResourceId,
    /// Increases each time a newer version is discovered; used for freshness.
    pub check_order: i64,
}

/// A version a past build produced for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub resource_version: ResourceVersion,
    pub build_id: BuildId,
    pub job_id: JobId,
}

/// A version a past build consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInputVersion {
    pub resource_version: ResourceVersion,
    pub build_id: BuildId,
    pub job_id: JobId,
    pub input_name: String,
}

/// Point-in-time view of a pipeline's resource version history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionsDb {
    pub resource_versions: Vec<ResourceVersion>,
    pub build_outputs: Vec<BuildOutput>,
    pub build_inputs: Vec<BuildInputVersion>,
    pub job_ids: HashMap<String, JobId>,
    pub resource_ids: HashMap<String, ResourceId>,
}

/// A version chosen for one input of a job's next build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVersion {
    pub version_id: VersionId,
    pub resource_id: ResourceId,
    pub first_occurrence: bool,
}

/// Input name to resolved version, for a job's next build.
pub type InputMapping = BTreeMap<String, InputVersion>;
