/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! An inbound apply suppresses the local edits it causes: the apply epoch
//! blocks capture outright, and the cooldown tail that follows still blocks
//! it even once the epoch itself has closed.

use reverse_sync::capture::{self, CaptureOutcome, CaptureSkipReason};
use reverse_sync::state::SyncState;
use reverse_sync::suppression::APPLY_COOLDOWN_MS;

#[test]
fn echo_during_apply_epoch_is_skipped() {
    let mut state = SyncState::default();
    state.suppression.begin_apply("2026-07-27T00:00:00Z");

    let outcome = capture::on_changed(&mut state, "300", Some("echoed".to_string()), None, 0, "t");
    assert_eq!(outcome, CaptureOutcome::Skipped(CaptureSkipReason::Suppressed));
    assert!(state.queue.is_empty());
}

#[test]
fn echo_inside_cooldown_tail_is_still_skipped_but_edit_after_is_captured() {
    let mut state = SyncState::default();
    state.suppression.begin_apply("2026-07-27T00:00:00Z");
    state.suppression.end_apply(10_000);
    assert!(!state.suppression.apply_epoch);

    let during_cooldown = capture::on_changed(
        &mut state,
        "300",
        Some("still an echo".to_string()),
        None,
        10_000 + APPLY_COOLDOWN_MS - 1,
        "t",
    );
    assert_eq!(
        during_cooldown,
        CaptureOutcome::Skipped(CaptureSkipReason::Suppressed)
    );

    let after_cooldown = capture::on_changed(
        &mut state,
        "300",
        Some("genuinely local".to_string()),
        None,
        10_000 + APPLY_COOLDOWN_MS + 1,
        "t",
    );
    assert_eq!(after_cooldown, CaptureOutcome::Enqueued);
    assert_eq!(state.queue.len(), 1);
}
