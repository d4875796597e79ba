/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Enqueue, coalesce, flush, retry and quarantine of the reverse (local →
//! bridge) event queue.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dedupe::{DedupeLedger, OUTBOUND_CLIENT_ID};

/// An item is dropped after this many transport failures.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReverseEventType {
    BookmarkCreated,
    BookmarkUpdated,
    BookmarkDeleted,
    FolderRenamed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReverseEvent {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    #[serde(rename = "batchId")]
    pub batch_id: String,
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: ReverseEventType,
    #[serde(rename = "bookmarkId")]
    pub bookmark_id: String,
    #[serde(rename = "managedKey")]
    pub managed_key: String,
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
    #[serde(rename = "moveIndex")]
    pub move_index: Option<u32>,
    #[serde(rename = "occurredAt")]
    pub occurred_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub event: ReverseEvent,
    pub retry_count: u32,
    pub enqueued_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    DuplicateDropped,
}

/// One item dropped after exhausting its retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedItem {
    pub event_id: String,
    pub bookmark_id: String,
    pub retry_count: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReverseQueue {
    items: Vec<QueueItem>,
    #[serde(skip)]
    in_flight: bool,
}

impl ReverseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a queue from a list of items, e.g. during state migration.
    pub fn from_items(items: Vec<QueueItem>) -> Self {
        Self {
            items,
            in_flight: false,
        }
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dedupes against `outbound:<eventId>` before appending. Returns
    /// whether the event was enqueued or dropped as a duplicate.
    pub fn enqueue(
        &mut self,
        dedupe: &mut DedupeLedger,
        event: ReverseEvent,
        now_ms: i64,
        now_iso: impl Into<String>,
    ) -> EnqueueOutcome {
        let dedupe_key = format!("outbound:{}", event.event_id);
        if !dedupe.record_and_check(OUTBOUND_CLIENT_ID, &dedupe_key, now_ms) {
            return EnqueueOutcome::DuplicateDropped;
        }
        self.items.push(QueueItem {
            event,
            retry_count: 0,
            enqueued_at: now_iso.into(),
        });
        EnqueueOutcome::Enqueued
    }

    /// Per-bookmark last-write-wins compaction. Pure: does not mutate the
    /// queue. Idempotent: `coalesce(coalesce(q)) == coalesce(q)`.
    pub fn coalesced_view(&self) -> Vec<QueueItem> {
        coalesce(&self.items)
    }

    /// At most one flush may run at a time. Returns `true` if this call
    /// acquired the guard.
    pub fn try_begin_flush(&mut self) -> bool {
        if self.in_flight {
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    pub fn end_flush(&mut self) {
        self.in_flight = false;
    }

    pub fn is_flushing(&self) -> bool {
        self.in_flight
    }

    /// Applies transport failures for a flush attempt: increments retry
    /// counts for items whose eventId is in `failed_event_ids`, quarantining
    /// (dropping, and returning a log entry for) any that reach
    /// [`MAX_RETRIES`]. Items not in the failed set are untouched.
    pub fn mark_failures(
        &mut self,
        failed_event_ids: &HashSet<String>,
        reason: &str,
    ) -> Vec<QuarantinedItem> {
        let mut quarantined = Vec::new();
        self.items.retain_mut(|item| {
            if !failed_event_ids.contains(&item.event.event_id) {
                return true;
            }
            item.retry_count += 1;
            if item.retry_count >= MAX_RETRIES {
                quarantined.push(QuarantinedItem {
                    event_id: item.event.event_id.clone(),
                    bookmark_id: item.event.bookmark_id.clone(),
                    retry_count: item.retry_count,
                    reason: reason.to_string(),
                });
                false
            } else {
                true
            }
        });
        quarantined
    }

    /// Removes queue items whose `bookmarkId` was subsumed by a coalesced
    /// event that has already been acked, preventing a coalesced-away
    /// predecessor from reappearing on a later retry.
    pub fn sweep_superseded(&mut self, coalesced: &[QueueItem]) {
        let coalesced_ids: HashSet<&str> = coalesced
            .iter()
            .map(|i| i.event.event_id.as_str())
            .collect();
        let coalesced_bookmark_ids: HashSet<&str> = coalesced
            .iter()
            .filter(|i| !i.event.bookmark_id.is_empty())
            .map(|i| i.event.bookmark_id.as_str())
            .collect();
        self.items.retain(|item| {
            if coalesced_ids.contains(item.event.event_id.as_str()) {
                return true;
            }
            !(!item.event.bookmark_id.is_empty()
                && coalesced_bookmark_ids.contains(item.event.bookmark_id.as_str()))
        });
    }

    /// Removes an item by eventId outright (used by the ack reconciler).
    pub fn remove_by_event_id(&mut self, event_id: &str) -> Option<QueueItem> {
        let pos = self.items.iter().position(|i| i.event.event_id == event_id)?;
        Some(self.items.remove(pos))
    }

    pub fn find_by_event_id(&self, event_id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.event.event_id == event_id)
    }

    #[cfg(test)]
    pub fn items_mut_for_test(&mut self) -> &mut Vec<QueueItem> {
        &mut self.items
    }
}

fn coalesce(items: &[QueueItem]) -> Vec<QueueItem> {
    let mut last_occurrence: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        if !item.event.bookmark_id.is_empty() {
            last_occurrence.insert(item.event.bookmark_id.as_str(), idx);
        }
    }
    items
        .iter()
        .enumerate()
        .filter(|(idx, item)| {
            item.event.bookmark_id.is_empty()
                || last_occurrence.get(item.event.bookmark_id.as_str()) == Some(idx)
        })
        .map(|(_, item)| item.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(event_id: &str, bookmark_id: &str) -> ReverseEvent {
        ReverseEvent {
            schema_version: "1".to_string(),
            batch_id: "b1".to_string(),
            event_id: event_id.to_string(),
            event_type: ReverseEventType::BookmarkUpdated,
            bookmark_id: bookmark_id.to_string(),
            managed_key: "bookmark:x".to_string(),
            title: None,
            url: None,
            parent_id: None,
            move_index: None,
            occurred_at: "2026-07-27T00:00:00Z".to_string(),
        }
    }

    fn item(event_id: &str, bookmark_id: &str, retry: u32) -> QueueItem {
        QueueItem {
            event: ev(event_id, bookmark_id),
            retry_count: retry,
            enqueued_at: "2026-07-27T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn enqueue_dedupes_against_outbound_bucket() {
        let mut q = ReverseQueue::new();
        let mut dedupe = DedupeLedger::new();
        assert_eq!(
            q.enqueue(&mut dedupe, ev("e1", "b1"), 0, "t"),
            EnqueueOutcome::Enqueued
        );
        assert_eq!(
            q.enqueue(&mut dedupe, ev("e1", "b1"), 1, "t"),
            EnqueueOutcome::DuplicateDropped
        );
        assert_eq!(q.len(), 1);
        assert_eq!(q.items()[0].retry_count, 0);
    }

    #[test]
    fn coalesce_keeps_only_last_occurrence_per_bookmark() {
        let q = ReverseQueue {
            items: vec![item("e1", "b1", 0), item("e2", "b1", 0), item("e3", "b1", 0)],
            in_flight: false,
        };
        let coalesced = q.coalesced_view();
        assert_eq!(coalesced.len(), 1);
        assert_eq!(coalesced[0].event.event_id, "e3");
    }

    #[test]
    fn coalesce_is_idempotent() {
        let items = vec![item("e1", "b1", 0), item("e2", "b2", 0), item("e3", "b1", 0)];
        let once = coalesce(&items);
        let twice = coalesce(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn coalesce_keeps_empty_bookmark_id_items_always() {
        let items = vec![item("e1", "", 0), item("e2", "", 0)];
        assert_eq!(coalesce(&items).len(), 2);
    }

    #[test]
    fn mark_failures_quarantines_at_three() {
        let mut q = ReverseQueue {
            items: vec![item("e1", "b1", 2)],
            in_flight: false,
        };
        let mut failed = HashSet::new();
        failed.insert("e1".to_string());
        let quarantined = q.mark_failures(&failed, "http_503");
        assert!(q.is_empty());
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].retry_count, 3);
        assert_eq!(quarantined[0].reason, "http_503");
    }

    #[test]
    fn mark_failures_never_leaves_item_at_or_above_threshold() {
        let mut q = ReverseQueue {
            items: vec![item("e1", "b1", 0), item("e2", "b2", 1)],
            in_flight: false,
        };
        let failed: HashSet<String> = ["e1".to_string(), "e2".to_string()].into_iter().collect();
        q.mark_failures(&failed, "r");
        for it in q.items() {
            assert!(it.retry_count < MAX_RETRIES);
        }
    }

    #[test]
    fn in_flight_guard_is_exclusive() {
        let mut q = ReverseQueue::new();
        assert!(q.try_begin_flush());
        assert!(!q.try_begin_flush());
        q.end_flush();
        assert!(q.try_begin_flush());
    }

    #[test]
    fn sweep_removes_superseded_predecessors() {
        let mut q = ReverseQueue {
            items: vec![item("e1", "b1", 0), item("e2", "b1", 0)],
            in_flight: false,
        };
        let coalesced = vec![item("e2", "b1", 0)];
        q.sweep_superseded(&coalesced);
        assert_eq!(q.len(), 1);
        assert_eq!(q.items()[0].event.event_id, "e2");
    }
}
