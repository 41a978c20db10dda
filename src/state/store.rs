//! Persistence seam for the deployment snapshot.

use async_trait::async_trait;

use super::types::DeploymentState;
use crate::error::Result;

/// Keeps the recorded instances and address reservations of one deployment
/// between planning runs.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the snapshot, or `None` before the first `plan --reserve`.
    async fn load(&self) -> Result<Option<DeploymentState>>;

    /// Replaces the snapshot.
    ///
    /// A reader never observes a partially written snapshot.
    async fn save(&self, state: &DeploymentState) -> Result<()>;

    /// Returns true if a snapshot has been written.
    async fn exists(&self) -> Result<bool>;

    /// Short name of the backend, for logs.
    fn backend_type(&self) -> &'static str;
}
