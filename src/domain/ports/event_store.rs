use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AutomationEvent, EventQuery};

/// Append-only store for automation events.
///
/// Appends must be O(1) amortized and safe under concurrent writers;
/// relative order of events for the same task is preserved. The store
/// is capacity-bounded: once full, the oldest events are evicted.
/// Metrics over windows shorter than the retention horizon are
/// unaffected by eviction.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event.
    async fn append(&self, event: &AutomationEvent) -> DomainResult<()>;

    /// Events matching the query, oldest first.
    async fn query(&self, query: EventQuery) -> DomainResult<Vec<AutomationEvent>>;

    /// Total retained events.
    async fn count(&self) -> DomainResult<u64>;
}
