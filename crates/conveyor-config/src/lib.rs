//! KDL configuration parsing for Conveyor.
//!
//! Parses pipeline definitions (resources, resource types and jobs) into the
//! configuration types the scheduler consumes.

pub mod error;
pub mod pipeline;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{PipelineConfig, load_pipeline_config, parse_pipeline_config};
