//! Ports: async traits the adapters implement.

pub mod event_store;
pub mod observer;
pub mod remote_tracker;
pub mod rule_repository;
pub mod task_repository;

pub use event_store::EventStore;
pub use observer::{AutomationFailure, AutomationObserver, LogNotifier, Notifier};
pub use remote_tracker::RemoteTracker;
pub use rule_repository::RuleRepository;
pub use task_repository::{TaskFilters, TaskRepository};
