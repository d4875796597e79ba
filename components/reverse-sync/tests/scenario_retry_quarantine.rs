/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Repeated transport failures against the same queued event exhaust its
//! retry budget and quarantine it, without touching unrelated items.

use std::collections::HashSet;

use reverse_sync::capture::{self};
use reverse_sync::queue::MAX_RETRIES;
use reverse_sync::state::SyncState;

#[test]
fn three_consecutive_failures_quarantine_the_event() {
    let mut state = SyncState::default();
    capture::on_created(&mut state, "300", "root", None, None, 0, Some("A".to_string()), None, 0, "t");
    capture::on_created(&mut state, "301", "root", None, None, 1, Some("B".to_string()), None, 0, "t");
    assert_eq!(state.queue.len(), 2);

    let failing_event_id = state.queue.items()[0].event.event_id.clone();
    let surviving_event_id = state.queue.items()[1].event.event_id.clone();

    let mut failed = HashSet::new();
    failed.insert(failing_event_id.clone());

    let mut quarantined = Vec::new();
    for _ in 0..MAX_RETRIES {
        quarantined = state.queue.mark_failures(&failed, "transport_unreachable");
    }

    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].event_id, failing_event_id);
    assert_eq!(quarantined[0].retry_count, MAX_RETRIES);
    assert_eq!(quarantined[0].reason, "transport_unreachable");

    assert_eq!(state.queue.len(), 1);
    assert_eq!(state.queue.items()[0].event.event_id, surviving_event_id);
    assert_eq!(state.queue.items()[0].retry_count, 0, "the untouched item never retried");
}
