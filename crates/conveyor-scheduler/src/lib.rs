//! Build admission scheduling for Conveyor.
//!
//! Decides which pending builds of a job may start, enforces the job's
//! concurrency ceiling, keeps inputs fresh for manually triggered builds and
//! hands admitted builds to the execution engine without waiting on them.

pub mod build_starter;
pub mod error;
pub mod factory;
pub mod inputmapper;
pub mod logging;
pub mod maxinflight;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testing;

pub use build_starter::{BuildStarter, PipelineBuildStarter};
pub use error::{SchedulerError, SchedulerResult};
pub use factory::{BuildFactory, PlanFactory};
pub use inputmapper::{InputMapper, InputResolver, PipelineInputMapper};
pub use logging::{LogFormat, init_tracing};
pub use maxinflight::{MaxInFlightUpdater, PipelineMaxInFlightUpdater};
pub use scanner::Scanner;
