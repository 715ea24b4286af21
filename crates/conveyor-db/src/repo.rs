//! Record implementations backed by PostgreSQL.

pub mod build;
pub mod pipeline;

pub use build::{BuildRecord, PgBuild};
pub use pipeline::{JobRecord, PgPipeline};
