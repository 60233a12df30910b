//! Service layer: the engine, webhook routing, metrics, sync, and the
//! structured-result API facade.

pub mod api;
pub mod engine;
pub mod metrics;
pub mod rules;
pub mod sync;
pub mod webhook;

pub use api::{ApiResponse, AutomationApi, BulkResult};
pub use engine::{AutomationEngine, DispatchChain};
pub use metrics::{
    Bottleneck, EfficiencyReport, MetricsService, RealtimeHealth, RulePerformance, SystemHealth,
    TaskMetrics, VelocityTrend,
};
pub use rules::{builtin_rules, TriggerEvent};
pub use sync::SyncService;
pub use webhook::{Normalizer, WebhookResponse, WebhookRouter};
