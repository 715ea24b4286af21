//! Execution engine traits.
//!
//! The engine turns a scheduled build and its plan into a running build. How
//! the plan is interpreted step by step is entirely up to the engine.

use async_trait::async_trait;
use std::sync::Arc;

use crate::build::Build;
use crate::plan::Plan;
use crate::Result;

/// A build instantiated by an engine.
#[async_trait]
pub trait EngineBuild: Send + Sync {
    /// Drive the build to completion.
    ///
    /// Callers spawn this and do not wait on it; failures are the engine's to
    /// record on the build.
    async fn resume(&self);
}

/// Trait for execution engines.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of this engine.
    fn name(&self) -> &'static str;

    /// Instantiate a running build from a scheduled build record and its plan.
    async fn create_build(&self, build: Arc<dyn Build>, plan: Plan)
    -> Result<Box<dyn EngineBuild>>;
}
