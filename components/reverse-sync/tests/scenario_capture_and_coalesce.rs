/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! A bookmark created under a managed note folder is captured with an
//! indexed key, and repeated local edits to the same bookmark coalesce
//! down to a single outbound event before flush.

use reverse_sync::capture::{self, CaptureOutcome};
use reverse_sync::state::SyncState;

fn state_with_note_folder() -> SyncState {
    let mut state = SyncState::default();
    state
        .node_index
        .folders
        .insert("note:Projects/Alpha.md".to_string(), "201".to_string());
    state
}

#[test]
fn create_under_note_folder_then_two_edits_coalesce_to_one() {
    let mut state = state_with_note_folder();

    let created = capture::on_created(
        &mut state,
        "300",
        "201",
        Some("note:Projects/Alpha.md"),
        None,
        0,
        Some("Draft".to_string()),
        Some("https://example/draft".to_string()),
        0,
        "2026-07-27T00:00:00Z",
    );
    assert_eq!(created, CaptureOutcome::Enqueued);
    assert_eq!(
        state.node_index.id_to_key.get("300").map(String::as_str),
        Some("Projects/Alpha.md|0")
    );

    for (title, at) in [
        ("Draft v2", "2026-07-27T00:00:01Z"),
        ("Final", "2026-07-27T00:00:02Z"),
    ] {
        let outcome = capture::on_changed(&mut state, "300", Some(title.to_string()), None, 1, at);
        assert_eq!(outcome, CaptureOutcome::Enqueued);
    }

    assert_eq!(state.queue.len(), 3, "nothing is dropped before a flush coalesces");
    let coalesced = state.queue.coalesced_view();
    assert_eq!(coalesced.len(), 1);
    assert_eq!(coalesced[0].event.title.as_deref(), Some("Final"));
    assert_eq!(coalesced[0].event.managed_key, "Projects/Alpha.md|0");
}
