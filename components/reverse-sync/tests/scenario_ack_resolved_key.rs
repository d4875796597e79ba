/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! A bridge ack carrying `applied` with a `resolvedKey` records that key
//! against the local bookmark id and drains the queued event; an ack with
//! no `resolvedKey` still drains the queue but leaves the index untouched.

use reverse_sync::ack::{self, AckResult, AckResultStatus, BatchAckResponse};
use reverse_sync::capture;
use reverse_sync::state::SyncState;

#[test]
fn applied_ack_with_resolved_key_updates_the_index_and_drains_the_queue() {
    let mut state = SyncState::default();
    capture::on_created(
        &mut state,
        "300",
        "root",
        None,
        None,
        0,
        Some("New".to_string()),
        Some("https://ex/new".to_string()),
        0,
        "t",
    );
    let event_id = state.queue.items()[0].event.event_id.clone();
    assert_eq!(state.node_index.folders.len(), 0);

    let batch = BatchAckResponse {
        batch_id: "b1".to_string(),
        results: vec![AckResult {
            event_id,
            status: AckResultStatus::Applied,
            reason: None,
            resolved_key: Some("note:Projects/New.md".to_string()),
            resolved_path: None,
        }],
    };
    let outcome = ack::reconcile(&mut state.queue, &mut state.node_index, &batch);

    assert!(state.queue.is_empty());
    assert_eq!(outcome.recorded_mappings, vec![("300".to_string(), "note:Projects/New.md".to_string())]);
    assert_eq!(
        state.node_index.key_for_id("300").as_deref(),
        Some("note:Projects/New.md")
    );
}

#[test]
fn applied_ack_without_resolved_key_drains_without_remapping() {
    let mut state = SyncState::default();
    capture::on_created(&mut state, "300", "root", None, None, 0, None, None, 0, "t");
    let event_id = state.queue.items()[0].event.event_id.clone();
    let original_key = state.node_index.key_for_id("300");

    let batch = BatchAckResponse {
        batch_id: "b1".to_string(),
        results: vec![AckResult {
            event_id,
            status: AckResultStatus::Applied,
            reason: None,
            resolved_key: None,
            resolved_path: None,
        }],
    };
    ack::reconcile(&mut state.queue, &mut state.node_index, &batch);

    assert!(state.queue.is_empty());
    assert_eq!(state.node_index.key_for_id("300"), original_key);
}
