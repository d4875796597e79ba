/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Applies a validated inbound `action` envelope to the bookmark store and
//! produces the matching ack outcome, per the op dispatch table in §4.H.

use serde_json::Value;
use thiserror::Error;

use crate::bookmarks::{BookmarkStore, CreateInput, MoveInput, NodeType, UpdateInput};
use crate::envelope::{ActionBody, LegacyStatus};
use crate::node_index::{ManagedNodeIndex, NodeKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("bookmark store rejected the operation: {0}")]
    StoreFailure(String),
    #[error("unsupported action `{0}`")]
    UnsupportedOp(String),
}

/// The result of applying one inbound action, already expressed in the
/// legacy vocabulary the wire ack uses (§4.A's mapping converts it to the
/// generic vocabulary for the `status` field).
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub legacy_status: LegacyStatus,
    pub reason: Option<String>,
    pub resolved_key: Option<String>,
    pub resolved_path: Option<String>,
}

impl ApplyOutcome {
    fn applied(resolved_key: Option<String>) -> Self {
        Self {
            legacy_status: LegacyStatus::Applied,
            reason: None,
            resolved_key,
            resolved_path: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            legacy_status: LegacyStatus::RejectedInvalid,
            reason: Some(reason.into()),
            resolved_key: None,
            resolved_path: None,
        }
    }

    fn skipped_ambiguous(reason: impl Into<String>) -> Self {
        Self {
            legacy_status: LegacyStatus::SkippedAmbiguous,
            reason: Some(reason.into()),
            resolved_key: None,
            resolved_path: None,
        }
    }
}

fn resolve_id(index: &ManagedNodeIndex, key: &str) -> Option<String> {
    index
        .bookmarks
        .get(key)
        .or_else(|| index.folders.get(key))
        .cloned()
}

fn payload_str(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn payload_non_empty_str(payload: &Value, key: &'static str) -> Result<String, ApplyError> {
    payload_str(payload, key)
        .filter(|s| !s.is_empty())
        .ok_or(ApplyError::MissingField(key))
}

/// Applies a single `action` envelope body. `target` is taken to be the
/// bridge-visible managed key of the node being addressed; `payload`
/// carries the op-specific data described in §4.H and §6.
pub async fn apply_action(
    store: &impl BookmarkStore,
    index: &mut ManagedNodeIndex,
    action: &ActionBody,
) -> ApplyOutcome {
    match apply_inner(store, index, action).await {
        Ok(outcome) => outcome,
        Err(ApplyError::MissingField(field)) => {
            ApplyOutcome::rejected(format!("missing_{field}"))
        }
        Err(ApplyError::StoreFailure(msg)) => ApplyOutcome::skipped_ambiguous(msg),
        Err(ApplyError::UnsupportedOp(_)) => ApplyOutcome::rejected("unsupported_action"),
    }
}

async fn apply_inner(
    store: &impl BookmarkStore,
    index: &mut ManagedNodeIndex,
    action: &ActionBody,
) -> Result<ApplyOutcome, ApplyError> {
    match action.op.as_str() {
        "bookmark_created" => {
            let parent_key = payload_non_empty_str(&action.payload, "parentId")?;
            let parent_id = resolve_id(index, &parent_key).unwrap_or(parent_key);
            let title = payload_str(&action.payload, "title");
            let url = payload_str(&action.payload, "url");
            let node = store
                .create(CreateInput {
                    parent_id,
                    title,
                    url,
                })
                .await
                .map_err(|e| ApplyError::StoreFailure(e.to_string()))?;
            let resolved_key = payload_str(&action.payload, "managedKey")
                .or_else(|| Some(action.target.clone()))
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| node.id.clone());
            let kind = match node.kind {
                NodeType::Folder => NodeKind::Folder,
                NodeType::Bookmark => NodeKind::Bookmark,
            };
            index.record_mapping(&node.id, &resolved_key, kind);
            Ok(ApplyOutcome::applied(Some(resolved_key)))
        }
        "bookmark_updated" => {
            let Some(id) = resolve_id(index, &action.target) else {
                return Ok(ApplyOutcome::skipped_ambiguous("unresolved_target"));
            };
            let title = payload_str(&action.payload, "title");
            let url = payload_str(&action.payload, "url");
            store
                .update(&id, UpdateInput { title, url })
                .await
                .map_err(|e| ApplyError::StoreFailure(e.to_string()))?;
            let resolved_key = payload_str(&action.payload, "managedKey")
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| action.target.clone());
            Ok(ApplyOutcome::applied(Some(resolved_key)))
        }
        "bookmark_deleted" => {
            let Some(id) = resolve_id(index, &action.target) else {
                return Ok(ApplyOutcome::skipped_ambiguous("unresolved_target"));
            };
            store
                .remove(&id)
                .await
                .map_err(|e| ApplyError::StoreFailure(e.to_string()))?;
            Ok(ApplyOutcome::applied(None))
        }
        "folder_renamed" => {
            let Some(id) = resolve_id(index, &action.target) else {
                return Ok(ApplyOutcome::skipped_ambiguous("unresolved_target"));
            };
            let title = payload_str(&action.payload, "title");
            store
                .update(&id, UpdateInput { title, url: None })
                .await
                .map_err(|e| ApplyError::StoreFailure(e.to_string()))?;
            Ok(ApplyOutcome::applied(None))
        }
        "bookmark_moved" => {
            let Some(id) = resolve_id(index, &action.target) else {
                return Ok(ApplyOutcome::skipped_ambiguous("unresolved_target"));
            };
            let parent_key = payload_non_empty_str(&action.payload, "parentId")?;
            let parent_id = resolve_id(index, &parent_key).unwrap_or(parent_key);
            let move_index = action
                .payload
                .get("index")
                .and_then(Value::as_u64)
                .map(|n| n as u32);
            store
                .move_node(
                    &id,
                    MoveInput {
                        parent_id,
                        index: move_index,
                    },
                )
                .await
                .map_err(|e| ApplyError::StoreFailure(e.to_string()))?;
            Ok(ApplyOutcome::applied(None))
        }
        "snapshot" => apply_snapshot(store, index, &action.payload).await,
        other => Err(ApplyError::UnsupportedOp(other.to_string())),
    }
}

/// Wholesale re-apply of the desired tree. The payload is a flat list of
/// nodes `{managedKey, parentKey, title, url?, kind}`, each addressed by
/// managed key rather than local id, since that's the only identifier the
/// bridge itself retains. Unknown keys are created; known keys are
/// updated in place. This is a full apply in the sense of §3's data
/// model note ("idToKey… Rebuilt on every full apply"), so the inverse
/// map is rebuilt unconditionally at the end.
async fn apply_snapshot(
    store: &impl BookmarkStore,
    index: &mut ManagedNodeIndex,
    payload: &Value,
) -> Result<ApplyOutcome, ApplyError> {
    let nodes = payload
        .get("nodes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for entry in &nodes {
        let Some(managed_key) = entry.get("managedKey").and_then(Value::as_str) else {
            continue;
        };
        let parent_key = entry.get("parentKey").and_then(Value::as_str);
        let title = entry.get("title").and_then(Value::as_str).map(str::to_string);
        let url = entry.get("url").and_then(Value::as_str).map(str::to_string);
        let kind = if url.is_some() {
            NodeKind::Bookmark
        } else {
            NodeKind::Folder
        };

        if let Some(existing_id) = resolve_id(index, managed_key) {
            store
                .update(&existing_id, UpdateInput { title, url })
                .await
                .map_err(|e| ApplyError::StoreFailure(e.to_string()))?;
        } else {
            let parent_id = parent_key
                .and_then(|k| resolve_id(index, k))
                .unwrap_or_else(|| crate::node_index::ROOT_KEY.to_string());
            let node = store
                .create(CreateInput {
                    parent_id,
                    title,
                    url,
                })
                .await
                .map_err(|e| ApplyError::StoreFailure(e.to_string()))?;
            index.record_mapping(&node.id, managed_key, kind);
        }
    }
    index.rebuild_inverse();
    Ok(ApplyOutcome::applied(None))
}
