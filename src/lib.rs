//! Conveyor - Workflow Automation Core
//!
//! Conveyor is a rule-driven workflow automation engine: a task
//! registry with a status state machine, declarative automation rules,
//! webhook ingestion from external trackers, and metrics derived on
//! demand from an append-only event log.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, ports, and the error taxonomy
//! - **Service Layer** (`services`): the automation engine, webhook
//!   normalization, metrics, outbound sync, and the API facade
//! - **Adapters** (`adapters`): memory and SQLite stores, outbound
//!   tracker clients, and the HTTP surface
//! - **Infrastructure** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): the `conveyor` binary's commands
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use conveyor::adapters::memory::{
//!     MemoryEventStore, MemoryRuleRepository, MemoryTaskRepository,
//! };
//! use conveyor::domain::models::{AutomationConfig, TaskDraft};
//! use conveyor::services::AutomationEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = AutomationEngine::new(
//!         Arc::new(MemoryTaskRepository::new()),
//!         Arc::new(MemoryRuleRepository::new()),
//!         Arc::new(MemoryEventStore::new(10_000)),
//!         AutomationConfig::default(),
//!     );
//!     engine.create_task(TaskDraft::new("hello")).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AutomationEvent, AutomationRule, Condition, ConditionOperator, Config, EventKind,
    ExternalBinding, RuleAction, Task, TaskDraft, TaskPatch, TaskPriority, TaskStatus, Trigger,
};
pub use domain::ports::{
    AutomationObserver, EventStore, Notifier, RemoteTracker, RuleRepository, TaskFilters,
    TaskRepository,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AutomationApi, AutomationEngine, MetricsService, SyncService, WebhookRouter};
