//! Board/card webhook normalizer (Trello-style payloads).
//!
//! Card moves arrive as actions with before/after lists; list names
//! map onto task statuses with a fuzzy match, because board columns
//! are user-named.

use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{provider_key, TaskDraft, TaskPatch, TaskStatus};

use super::{Normalizer, ProviderAction, ProviderEvent};

#[derive(Debug, Deserialize)]
struct BoardPayload {
    action: BoardAction,
}

#[derive(Debug, Deserialize)]
struct BoardAction {
    #[serde(rename = "type")]
    kind: String,
    data: ActionData,
}

#[derive(Debug, Deserialize)]
struct ActionData {
    card: Card,
    #[serde(default)]
    list: Option<ListRef>,
    #[serde(default, rename = "listAfter")]
    list_after: Option<ListRef>,
    #[serde(default, rename = "listBefore")]
    list_before: Option<ListRef>,
}

#[derive(Debug, Deserialize)]
struct Card {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListRef {
    id: String,
    name: String,
}

#[derive(Debug, Default)]
pub struct BoardNormalizer;

impl BoardNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Fuzzy list-name to status mapping. Unrecognized names land in
    /// `todo`, matching how imported boards are triaged.
    fn map_list_name(name: &str) -> TaskStatus {
        let name = name.to_lowercase();
        if name.contains("in progress") || name.contains("doing") || name.contains("working") {
            TaskStatus::InProgress
        } else if name.contains("review") || name.contains("testing") {
            TaskStatus::InReview
        } else if name.contains("done") || name.contains("complete") || name.contains("finished") {
            TaskStatus::Done
        } else if name.contains("blocked") || name.contains("stuck") {
            TaskStatus::Blocked
        } else {
            TaskStatus::Todo
        }
    }

    fn list_patch(list: &ListRef) -> TaskPatch {
        TaskPatch::default()
            .with_metadata_entry(provider_key("board", "list_id"), serde_json::json!(list.id))
            .with_metadata_entry(
                provider_key("board", "list_name"),
                serde_json::json!(list.name),
            )
    }
}

impl Normalizer for BoardNormalizer {
    fn provider(&self) -> &str {
        "board"
    }

    fn signature_header(&self) -> &'static str {
        "x-board-webhook"
    }

    fn normalize(&self, payload: &serde_json::Value) -> DomainResult<Vec<ProviderEvent>> {
        let payload: BoardPayload = serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::Validation(format!("board payload: {e}")))?;

        let action = payload.action;
        let card_id = action.data.card.id.clone();

        let event = match action.kind.as_str() {
            "updateCard" => {
                let (Some(after), Some(before)) = (&action.data.list_after, &action.data.list_before)
                else {
                    return Ok(vec![ProviderEvent {
                        external_id: card_id,
                        label: "card_updated".to_string(),
                        action: ProviderAction::Ignore {
                            reason: "card update without a list move".to_string(),
                        },
                    }]);
                };
                if after.id == before.id {
                    ProviderEvent {
                        external_id: card_id,
                        label: "card_updated".to_string(),
                        action: ProviderAction::Ignore {
                            reason: "card stayed in its list".to_string(),
                        },
                    }
                } else {
                    ProviderEvent {
                        external_id: card_id,
                        label: "card_moved".to_string(),
                        action: ProviderAction::Status {
                            to: Self::map_list_name(&after.name),
                            patch: Some(Self::list_patch(after)),
                        },
                    }
                }
            }
            "createCard" => {
                let list = action.data.list.as_ref();
                let status = list.map_or(TaskStatus::Todo, |l| Self::map_list_name(&l.name));
                let mut draft = TaskDraft {
                    title: action
                        .data
                        .card
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("Card {card_id}")),
                    description: action.data.card.desc.clone().filter(|d| !d.is_empty()),
                    status,
                    ..TaskDraft::default()
                };
                if let Some(list) = list {
                    draft.metadata.insert(
                        provider_key("board", "list_id"),
                        serde_json::json!(list.id),
                    );
                    draft.metadata.insert(
                        provider_key("board", "list_name"),
                        serde_json::json!(list.name),
                    );
                }
                ProviderEvent {
                    external_id: card_id,
                    label: "card_created".to_string(),
                    action: ProviderAction::Started { draft },
                }
            }
            "deleteCard" => ProviderEvent {
                external_id: card_id,
                label: "card_deleted".to_string(),
                action: ProviderAction::Deleted,
            },
            other => ProviderEvent {
                external_id: card_id,
                label: "card_unknown".to_string(),
                action: ProviderAction::Ignore {
                    reason: format!("unhandled board action '{other}'"),
                },
            },
        };

        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_one(payload: serde_json::Value) -> ProviderEvent {
        let events = BoardNormalizer::new().normalize(&payload).unwrap();
        assert_eq!(events.len(), 1);
        events.into_iter().next().unwrap()
    }

    #[test]
    fn test_list_name_mapping() {
        assert_eq!(BoardNormalizer::map_list_name("To Do"), TaskStatus::Todo);
        assert_eq!(BoardNormalizer::map_list_name("Backlog"), TaskStatus::Todo);
        assert_eq!(
            BoardNormalizer::map_list_name("In Progress"),
            TaskStatus::InProgress
        );
        assert_eq!(
            BoardNormalizer::map_list_name("Code Review"),
            TaskStatus::InReview
        );
        assert_eq!(BoardNormalizer::map_list_name("Done ✅"), TaskStatus::Done);
        assert_eq!(
            BoardNormalizer::map_list_name("Blocked / waiting"),
            TaskStatus::Blocked
        );
        assert_eq!(
            BoardNormalizer::map_list_name("Someday maybe"),
            TaskStatus::Todo
        );
    }

    #[test]
    fn test_card_move_maps_to_status() {
        let event = normalize_one(serde_json::json!({
            "action": {
                "type": "updateCard",
                "data": {
                    "card": { "id": "c1", "name": "Fix bug" },
                    "listBefore": { "id": "l1", "name": "To Do" },
                    "listAfter": { "id": "l2", "name": "Doing" }
                }
            }
        }));

        assert_eq!(event.external_id, "c1");
        assert_eq!(event.label, "card_moved");
        match event.action {
            ProviderAction::Status { to, patch } => {
                assert_eq!(to, TaskStatus::InProgress);
                let metadata = patch.unwrap().metadata.unwrap();
                assert_eq!(
                    metadata.get("provider.board.list_name"),
                    Some(&serde_json::json!("Doing"))
                );
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn test_update_without_move_is_ignored() {
        let event = normalize_one(serde_json::json!({
            "action": {
                "type": "updateCard",
                "data": { "card": { "id": "c1", "name": "Renamed" } }
            }
        }));
        assert!(matches!(event.action, ProviderAction::Ignore { .. }));
    }

    #[test]
    fn test_create_card_becomes_started() {
        let event = normalize_one(serde_json::json!({
            "action": {
                "type": "createCard",
                "data": {
                    "card": { "id": "c2", "name": "New card", "desc": "details" },
                    "list": { "id": "l1", "name": "Backlog" }
                }
            }
        }));

        match event.action {
            ProviderAction::Started { draft } => {
                assert_eq!(draft.title, "New card");
                assert_eq!(draft.status, TaskStatus::Todo);
                assert_eq!(draft.description.as_deref(), Some("details"));
            }
            other => panic!("expected Started, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_card() {
        let event = normalize_one(serde_json::json!({
            "action": {
                "type": "deleteCard",
                "data": { "card": { "id": "c3" } }
            }
        }));
        assert!(matches!(event.action, ProviderAction::Deleted));
    }
}
