//! Domain models: pure data structures and their invariants.

pub mod binding;
pub mod config;
pub mod event;
pub mod rule;
pub mod task;

pub use binding::{provider_key, ExternalBinding, TrackerKind};
pub use config::{
    AutomationConfig, Config, DatabaseConfig, EventLogConfig, LoggingConfig, MetricsConfig,
    ServerConfig, StorageBackend, SyncConfig, WebhookEndpointConfig,
};
pub use event::{AutomationEvent, EventKind, EventQuery};
pub use rule::{
    parse_schedule, AutomationRule, Condition, ConditionOperator, RuleAction, TaskTemplate,
    Trigger,
};
pub use task::{
    CompletionCriterion, CriterionKind, Task, TaskDraft, TaskPatch, TaskPriority, TaskStatus,
};
