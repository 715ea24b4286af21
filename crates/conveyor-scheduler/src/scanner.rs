//! Resource version discovery.

use async_trait::async_trait;
use conveyor_core::Result;

/// Triggers discovery of new versions for a resource.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Check the named resource for new versions, returning once they are saved.
    async fn scan(&self, resource_name: &str) -> Result<()>;
}
