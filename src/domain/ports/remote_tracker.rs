use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskDraft};

/// Outbound synchronization port for one external tracker binding.
///
/// Implementations talk to the provider's real API. The engine decides
/// *when* these are called (fire-and-forget relative to registry locks,
/// retried with backoff) and how results feed back into task metadata.
#[async_trait]
pub trait RemoteTracker: Send + Sync {
    /// Binding name; also the metadata namespace for correlation ids.
    fn provider(&self) -> &str;

    /// Create the remote counterpart; returns the provider's id.
    async fn create_remote(&self, task: &Task) -> DomainResult<String>;

    /// Push the task's current fields to an existing remote record.
    async fn update_remote(&self, external_id: &str, task: &Task) -> DomainResult<()>;

    /// Delete (or close, where the provider forbids deletion) the
    /// remote record.
    async fn delete_remote(&self, external_id: &str) -> DomainResult<()>;

    /// Pull all remote records as drafts for reconciliation. Each draft
    /// carries the provider correlation id in its metadata.
    async fn list_remote(&self) -> DomainResult<Vec<TaskDraft>>;
}
