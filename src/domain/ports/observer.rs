use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Task;

/// Details of one failed rule execution, surfaced to observers.
#[derive(Debug, Clone)]
pub struct AutomationFailure {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub task_id: Uuid,
    pub error: String,
}

/// Registered observer for automation failures. Failures are always
/// logged as events too; observers are the hook for alerting layers.
pub trait AutomationObserver: Send + Sync {
    fn on_failure(&self, failure: &AutomationFailure);
}

/// Delivery port for `send_notification` actions.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, task: &Task, message: &str) -> DomainResult<()>;
}

/// Default notifier: emits the message as a structured log line.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, task: &Task, message: &str) -> DomainResult<()> {
        tracing::info!(task_id = %task.id, message, "Task notification");
        Ok(())
    }
}
