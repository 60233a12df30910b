//! In-memory automation rule repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::AutomationRule;
use crate::domain::ports::RuleRepository;

#[derive(Debug, Default)]
pub struct MemoryRuleRepository {
    rules: RwLock<HashMap<Uuid, AutomationRule>>,
}

impl MemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn insert(&self, rule: &AutomationRule) -> DomainResult<()> {
        self.rules.write().await.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationRule>> {
        Ok(self.rules.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        Ok(self.rules.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> DomainResult<Vec<AutomationRule>> {
        let rules = self.rules.read().await;
        let mut all: Vec<AutomationRule> = rules.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<bool> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&id) {
            Some(rule) => {
                rule.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
