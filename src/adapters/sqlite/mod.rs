//! SQLite adapters for the three collections, plus pool and schema
//! setup.

pub mod connection;
pub mod event_repository;
pub mod migrations;
pub mod rule_repository;
pub mod task_repository;

pub use connection::{create_pool, create_test_pool, ConnectionError};
pub use event_repository::SqliteEventRepository;
pub use migrations::run_migrations;
pub use rule_repository::SqliteRuleRepository;
pub use task_repository::SqliteTaskRepository;
