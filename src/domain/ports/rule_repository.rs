use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::AutomationRule;

/// Repository port for automation rule persistence.
///
/// Rules are immutable after insertion apart from the enabled flag;
/// there is deliberately no general update method.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Insert a new rule.
    async fn insert(&self, rule: &AutomationRule) -> DomainResult<()>;

    /// Get a rule by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationRule>>;

    /// Delete a rule by id. Returns false when the rule did not exist.
    async fn delete(&self, id: Uuid) -> DomainResult<bool>;

    /// All rules in creation order (`created_at`, then id). Dispatch
    /// relies on this order being deterministic.
    async fn list(&self) -> DomainResult<Vec<AutomationRule>>;

    /// Flip the enabled flag. Returns false when the rule is unknown.
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<bool>;
}
