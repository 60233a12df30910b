//! External system bindings.
//!
//! A binding names a configured connection to a third-party tracker:
//! provider kind, credentials, the container (board/project) tasks sync
//! into, and the mapping from canonical statuses to provider states.
//! Per-task correlation ids never live here; they are stored in each
//! task's metadata under the `provider.<name>.<field>` namespace.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// Supported outbound tracker providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Trello,
    Asana,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trello => "trello",
            Self::Asana => "asana",
        }
    }
}

/// A configured connection to one external tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalBinding {
    /// Binding name; also the provider namespace for metadata keys.
    pub name: String,
    pub kind: TrackerKind,
    /// API token or key for the provider.
    pub api_token: String,
    /// Board id (Trello) or project id (Asana) tasks sync into.
    pub container_id: String,
    /// Canonical status -> provider-native state (list id, section name).
    #[serde(default)]
    pub status_map: HashMap<TaskStatus, String>,
    /// Secret for verifying inbound webhooks from this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

impl ExternalBinding {
    pub fn new(
        name: impl Into<String>,
        kind: TrackerKind,
        api_token: impl Into<String>,
        container_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            api_token: api_token.into(),
            container_id: container_id.into(),
            status_map: HashMap::new(),
            webhook_secret: None,
        }
    }

    pub fn with_status_mapping(mut self, status: TaskStatus, remote: impl Into<String>) -> Self {
        self.status_map.insert(status, remote.into());
        self
    }

    /// Provider-native state for a canonical status; `None` when the
    /// binding has no mapping for it (callers skip the status update).
    pub fn remote_state(&self, status: TaskStatus) -> Option<&str> {
        self.status_map.get(&status).map(String::as_str)
    }

    /// Metadata key holding this binding's correlation id on a task.
    pub fn id_key(&self) -> String {
        provider_key(&self.name, "id")
    }
}

/// Build a key in the versioned provider metadata namespace:
/// `provider.<name>.<field>`.
pub fn provider_key(provider: &str, field: &str) -> String {
    format!("provider.{provider}.{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_key_namespace() {
        assert_eq!(provider_key("trello", "id"), "provider.trello.id");
        assert_eq!(provider_key("github", "pr_number"), "provider.github.pr_number");
    }

    #[test]
    fn test_binding_status_mapping() {
        let binding = ExternalBinding::new("trello", TrackerKind::Trello, "key", "board-1")
            .with_status_mapping(TaskStatus::Todo, "list-todo")
            .with_status_mapping(TaskStatus::Done, "list-done");

        assert_eq!(binding.remote_state(TaskStatus::Todo), Some("list-todo"));
        assert_eq!(binding.remote_state(TaskStatus::InReview), None);
        assert_eq!(binding.id_key(), "provider.trello.id");
    }
}
