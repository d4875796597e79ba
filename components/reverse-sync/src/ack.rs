/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Applies a batch ack response to the reverse queue and the managed-node
//! index.

use std::collections::HashMap;

use crate::node_index::{ManagedNodeIndex, NodeKind};
use crate::queue::ReverseQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckResultStatus {
    Applied,
    Duplicate,
    SkippedAmbiguous,
    SkippedUnmanaged,
    RejectedInvalid,
    /// Anything the reconciler doesn't recognize. Kept in the queue.
    Unknown(String),
}

impl AckResultStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "applied" => Self::Applied,
            "duplicate" => Self::Duplicate,
            "skipped_ambiguous" => Self::SkippedAmbiguous,
            "skipped_unmanaged" => Self::SkippedUnmanaged,
            "rejected_invalid" => Self::RejectedInvalid,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckResult {
    pub event_id: String,
    pub status: AckResultStatus,
    pub reason: Option<String>,
    pub resolved_key: Option<String>,
    pub resolved_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchAckResponse {
    pub batch_id: String,
    pub results: Vec<AckResult>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub recorded_mappings: Vec<(String, String)>,
    pub unknown_status_events: Vec<String>,
}

/// Applies each ack result in the batch: resolves keys for `applied`
/// results with a non-empty `resolvedKey` and a known bookmarkId, then
/// removes every terminal result from the queue. Unknown statuses are left
/// in the queue untouched (retained for a future retry/ack).
pub fn reconcile(
    queue: &mut ReverseQueue,
    index: &mut ManagedNodeIndex,
    batch: &BatchAckResponse,
) -> ReconcileOutcome {
    // Snapshot eventId -> bookmarkId before any mutation, so resolvedKey
    // attribution doesn't depend on reconciliation order.
    let snapshot: HashMap<String, String> = queue
        .items()
        .iter()
        .map(|i| (i.event.event_id.clone(), i.event.bookmark_id.clone()))
        .collect();

    let mut outcome = ReconcileOutcome::default();
    for result in &batch.results {
        match &result.status {
            AckResultStatus::Applied => {
                if let (Some(resolved_key), Some(bookmark_id)) = (
                    result.resolved_key.as_ref().filter(|k| !k.is_empty()),
                    snapshot.get(&result.event_id).filter(|b| !b.is_empty()),
                ) {
                    index.record_mapping(bookmark_id, resolved_key, NodeKind::Bookmark);
                    outcome
                        .recorded_mappings
                        .push((bookmark_id.clone(), resolved_key.clone()));
                }
                queue.remove_by_event_id(&result.event_id);
            }
            AckResultStatus::Duplicate
            | AckResultStatus::SkippedAmbiguous
            | AckResultStatus::SkippedUnmanaged
            | AckResultStatus::RejectedInvalid => {
                queue.remove_by_event_id(&result.event_id);
            }
            AckResultStatus::Unknown(raw) => {
                tracing::warn!(event_id = %result.event_id, status = %raw, "unknown_status");
                outcome.unknown_status_events.push(result.event_id.clone());
            }
        }
    }
    outcome
}
