/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Capture handlers (§4.J): one per local bookmark event kind, gating on
//! import-in-progress and the suppression engine before deriving a key and
//! enqueueing a [`crate::queue::ReverseEvent`].

use uuid::Uuid;

use crate::bookmarks::BookmarkEvent;
use crate::node_index::{derive_managed_key, KeyDerivationInput, ManagedNodeIndex, NodeKind};
use crate::queue::{EnqueueOutcome, ReverseEvent, ReverseEventType, ReverseQueue};
use crate::state::SyncState;

/// Why a capture handler did not enqueue anything. Callers log this at the
/// call site the way §4.J's `capture_skip` entries are described.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSkipReason {
    ImportInProgress,
    Suppressed,
    DuplicateEventId,
    ManagedFolderRemovalIgnored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Enqueued,
    Skipped(CaptureSkipReason),
}

struct Gate<'a> {
    state: &'a mut SyncState,
}

impl<'a> Gate<'a> {
    fn check(state: &'a mut SyncState, now_ms: i64) -> Result<Self, CaptureSkipReason> {
        if state.import_in_progress {
            return Err(CaptureSkipReason::ImportInProgress);
        }
        if state.suppression.is_suppressed(now_ms) {
            return Err(CaptureSkipReason::Suppressed);
        }
        Ok(Self { state })
    }
}

fn enqueue(
    queue: &mut ReverseQueue,
    dedupe: &mut crate::dedupe::DedupeLedger,
    event: ReverseEvent,
    now_ms: i64,
    now_iso: &str,
) -> CaptureOutcome {
    match queue.enqueue(dedupe, event, now_ms, now_iso) {
        EnqueueOutcome::Enqueued => CaptureOutcome::Enqueued,
        EnqueueOutcome::DuplicateDropped => CaptureOutcome::Skipped(CaptureSkipReason::DuplicateEventId),
    }
}

fn new_ids() -> (String, String) {
    (Uuid::new_v4().to_string(), Uuid::new_v4().to_string())
}

/// A bookmark was created locally. `parent_folder_key` and `parent_title`
/// are gathered by the caller from the bookmark store before calling this,
/// since key derivation (§4.B) needs the parent's managed key or title.
#[allow(clippy::too_many_arguments)]
pub fn on_created(
    state: &mut SyncState,
    bookmark_id: &str,
    parent_id: &str,
    parent_folder_key: Option<&str>,
    parent_title: Option<&str>,
    index_among_children: u32,
    title: Option<String>,
    url: Option<String>,
    now_ms: i64,
    now_iso: &str,
) -> CaptureOutcome {
    let gate = match Gate::check(state, now_ms) {
        Ok(g) => g,
        Err(reason) => return CaptureOutcome::Skipped(reason),
    };
    let managed_key = derive_managed_key(
        &gate.state.node_index,
        &KeyDerivationInput {
            bookmark_id,
            parent_folder_key,
            parent_title,
            index_among_children,
        },
    );
    gate.state
        .node_index
        .record_mapping(bookmark_id, &managed_key, NodeKind::Bookmark);
    let (batch_id, event_id) = new_ids();
    let event = ReverseEvent {
        schema_version: "1".to_string(),
        batch_id,
        event_id,
        event_type: ReverseEventType::BookmarkCreated,
        bookmark_id: bookmark_id.to_string(),
        managed_key,
        title,
        url,
        parent_id: Some(parent_id.to_string()),
        move_index: None,
        occurred_at: now_iso.to_string(),
    };
    enqueue(&mut gate.state.queue, &mut gate.state.dedupe, event, now_ms, now_iso)
}

/// A bookmark or folder's title/url changed locally. A change on a
/// managed *folder* id is reported as `folder_renamed` with no `url`,
/// per §4.J's special case.
pub fn on_changed(
    state: &mut SyncState,
    bookmark_id: &str,
    title: Option<String>,
    url: Option<String>,
    now_ms: i64,
    now_iso: &str,
) -> CaptureOutcome {
    let gate = match Gate::check(state, now_ms) {
        Ok(g) => g,
        Err(reason) => return CaptureOutcome::Skipped(reason),
    };
    let is_folder = gate.state.node_index.is_managed_folder(bookmark_id);
    let managed_key = gate
        .state
        .node_index
        .key_for_id(bookmark_id)
        .unwrap_or_else(|| format!("bookmark:{bookmark_id}"));
    let (batch_id, event_id) = new_ids();
    let event = ReverseEvent {
        schema_version: "1".to_string(),
        batch_id,
        event_id,
        event_type: if is_folder {
            ReverseEventType::FolderRenamed
        } else {
            ReverseEventType::BookmarkUpdated
        },
        bookmark_id: bookmark_id.to_string(),
        managed_key,
        title,
        url: if is_folder { None } else { url },
        parent_id: None,
        move_index: None,
        occurred_at: now_iso.to_string(),
    };
    enqueue(&mut gate.state.queue, &mut gate.state.dedupe, event, now_ms, now_iso)
}

/// A bookmark or folder was removed locally. Removal of a managed *folder*
/// is ignored in V1, per §4.J.
pub fn on_removed(state: &mut SyncState, bookmark_id: &str, now_ms: i64, now_iso: &str) -> CaptureOutcome {
    let gate = match Gate::check(state, now_ms) {
        Ok(g) => g,
        Err(reason) => return CaptureOutcome::Skipped(reason),
    };
    if gate.state.node_index.is_managed_folder(bookmark_id) {
        return CaptureOutcome::Skipped(CaptureSkipReason::ManagedFolderRemovalIgnored);
    }
    let managed_key = gate
        .state
        .node_index
        .key_for_id(bookmark_id)
        .unwrap_or_else(|| format!("bookmark:{bookmark_id}"));
    let (batch_id, event_id) = new_ids();
    let event = ReverseEvent {
        schema_version: "1".to_string(),
        batch_id,
        event_id,
        event_type: ReverseEventType::BookmarkDeleted,
        bookmark_id: bookmark_id.to_string(),
        managed_key,
        title: None,
        url: None,
        parent_id: None,
        move_index: None,
        occurred_at: now_iso.to_string(),
    };
    enqueue(&mut gate.state.queue, &mut gate.state.dedupe, event, now_ms, now_iso)
}

/// A bookmark was moved locally. When the parent is unchanged,
/// `move_index` is the link-only position among that parent's children
/// (folders don't count toward the index), per §4.J.
#[allow(clippy::too_many_arguments)]
pub fn on_moved(
    state: &mut SyncState,
    bookmark_id: &str,
    old_parent_id: &str,
    new_parent_id: &str,
    link_only_index: Option<u32>,
    now_ms: i64,
    now_iso: &str,
) -> CaptureOutcome {
    let gate = match Gate::check(state, now_ms) {
        Ok(g) => g,
        Err(reason) => return CaptureOutcome::Skipped(reason),
    };
    let managed_key = gate
        .state
        .node_index
        .key_for_id(bookmark_id)
        .unwrap_or_else(|| format!("bookmark:{bookmark_id}"));
    let move_index = if old_parent_id == new_parent_id {
        link_only_index
    } else {
        None
    };
    let (batch_id, event_id) = new_ids();
    let event = ReverseEvent {
        schema_version: "1".to_string(),
        batch_id,
        event_id,
        event_type: ReverseEventType::BookmarkUpdated,
        bookmark_id: bookmark_id.to_string(),
        managed_key,
        title: None,
        url: None,
        parent_id: Some(new_parent_id.to_string()),
        move_index,
        occurred_at: now_iso.to_string(),
    };
    enqueue(&mut gate.state.queue, &mut gate.state.dedupe, event, now_ms, now_iso)
}

/// `importBegan`/`importEnded` only flip `importInProgress`; neither is
/// gated, and neither ever enqueues an event.
pub fn on_import_began(state: &mut SyncState) {
    state.import_in_progress = true;
}

pub fn on_import_ended(state: &mut SyncState) {
    state.import_in_progress = false;
}

/// Routes a raw [`BookmarkEvent`] from the store's subscription to the
/// matching handler above. Callers that need the richer per-kind
/// arguments (parent folder key, link-only index, …) should call the
/// specific `on_*` functions directly instead; this exists for the common
/// case where the event alone carries enough information.
pub fn route(state: &mut SyncState, event: BookmarkEvent, now_ms: i64, now_iso: &str) -> Option<CaptureOutcome> {
    match event {
        BookmarkEvent::Created(node) => Some(on_created(
            state,
            &node.id,
            node.parent_id.as_deref().unwrap_or(""),
            None,
            None,
            node.index,
            node.title,
            node.url,
            now_ms,
            now_iso,
        )),
        BookmarkEvent::Changed { id, title, url } => Some(on_changed(state, &id, title, url, now_ms, now_iso)),
        BookmarkEvent::Removed { id, .. } => Some(on_removed(state, &id, now_ms, now_iso)),
        BookmarkEvent::Moved {
            id,
            old_parent_id,
            parent_id,
            index,
        } => Some(on_moved(
            state,
            &id,
            old_parent_id.as_deref().unwrap_or(""),
            &parent_id,
            Some(index),
            now_ms,
            now_iso,
        )),
        BookmarkEvent::ImportBegan => {
            on_import_began(state);
            None
        }
        BookmarkEvent::ImportEnded => {
            on_import_ended(state);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> SyncState {
        let mut state = SyncState::default();
        state
            .node_index
            .folders
            .insert("__root__".to_string(), "100".to_string());
        state
            .node_index
            .folders
            .insert("note:Projects/Alpha.md".to_string(), "201".to_string());
        state
    }

    #[test]
    fn created_under_note_folder_derives_indexed_key() {
        let mut state = fresh_state();
        let outcome = on_created(
            &mut state,
            "300",
            "201",
            Some("note:Projects/Alpha.md"),
            None,
            0,
            Some("New".to_string()),
            Some("https://ex/new".to_string()),
            0,
            "2026-07-27T00:00:00Z",
        );
        assert_eq!(outcome, CaptureOutcome::Enqueued);
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.queue.items()[0].event.managed_key, "Projects/Alpha.md|0");
        assert_eq!(
            state.node_index.id_to_key.get("300").map(String::as_str),
            Some("Projects/Alpha.md|0")
        );
    }

    #[test]
    fn suppressed_epoch_blocks_capture() {
        let mut state = fresh_state();
        state.suppression.set_apply_epoch(true, "t");
        let outcome = on_created(
            &mut state, "300", "201", None, None, 0, None, None, 0, "t",
        );
        assert_eq!(
            outcome,
            CaptureOutcome::Skipped(CaptureSkipReason::Suppressed)
        );
        assert!(state.queue.is_empty());
    }

    #[test]
    fn import_in_progress_blocks_capture() {
        let mut state = fresh_state();
        on_import_began(&mut state);
        let outcome = on_changed(&mut state, "300", Some("x".to_string()), None, 0, "t");
        assert_eq!(
            outcome,
            CaptureOutcome::Skipped(CaptureSkipReason::ImportInProgress)
        );
    }

    #[test]
    fn changed_on_managed_folder_becomes_folder_renamed_without_url() {
        let mut state = fresh_state();
        let outcome = on_changed(
            &mut state,
            "100",
            Some("Renamed".to_string()),
            Some("https://ignored".to_string()),
            0,
            "t",
        );
        assert_eq!(outcome, CaptureOutcome::Enqueued);
        let item = &state.queue.items()[0];
        assert_eq!(item.event.event_type, ReverseEventType::FolderRenamed);
        assert_eq!(item.event.url, None);
    }

    #[test]
    fn removed_on_managed_folder_is_ignored() {
        let mut state = fresh_state();
        let outcome = on_removed(&mut state, "100", 0, "t");
        assert_eq!(
            outcome,
            CaptureOutcome::Skipped(CaptureSkipReason::ManagedFolderRemovalIgnored)
        );
    }

    #[test]
    fn moved_within_same_parent_keeps_move_index() {
        let mut state = fresh_state();
        let outcome = on_moved(&mut state, "300", "201", "201", Some(2), 0, "t");
        assert_eq!(outcome, CaptureOutcome::Enqueued);
        assert_eq!(state.queue.items()[0].event.move_index, Some(2));
    }

    #[test]
    fn moved_across_parents_drops_move_index() {
        let mut state = fresh_state();
        let outcome = on_moved(&mut state, "300", "201", "999", Some(2), 0, "t");
        assert_eq!(outcome, CaptureOutcome::Enqueued);
        assert_eq!(state.queue.items()[0].event.move_index, None);
    }

    #[test]
    fn import_flags_never_enqueue() {
        let mut state = fresh_state();
        on_import_began(&mut state);
        assert!(state.import_in_progress);
        on_import_ended(&mut state);
        assert!(!state.import_in_progress);
        assert!(state.queue.is_empty());
    }
}
