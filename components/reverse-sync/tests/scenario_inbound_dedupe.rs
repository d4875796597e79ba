/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! A bridge-originated `action` frame replayed with the same idempotency
//! key is accepted once and suppressed on every later delivery, per client.
//! The session manager (§4.I) only routes frames; dedupe against the
//! durable ledger `D` (§4.D) happens where `SyncState` lives, so the same
//! ledger instance is what a reconnect would still see.

use reverse_sync::dedupe::DedupeLedger;

#[test]
fn replayed_action_is_accepted_once_then_suppressed() {
    let mut dedupe = DedupeLedger::new();

    assert!(dedupe.record_and_check("bridge-1", "idem-a", 0));
    assert!(!dedupe.record_and_check("bridge-1", "idem-a", 1));
}

#[test]
fn the_same_idempotency_key_from_a_different_client_is_independent() {
    let mut dedupe = DedupeLedger::new();

    assert!(dedupe.record_and_check("bridge-1", "idem-a", 0));
    assert!(dedupe.record_and_check("bridge-2", "idem-a", 0));
}

#[test]
fn dedupe_survives_a_reconnect_because_the_ledger_is_not_per_connection() {
    // In production this ledger lives in `SyncState`, loaded once at
    // startup and mutated only by the engine. A reconnect tears down and
    // rebuilds the WebSocket session, but never touches `state.dedupe`, so
    // a replay delivered after reopening the socket is still caught.
    let mut dedupe = DedupeLedger::new();

    assert!(dedupe.record_and_check("bridge-1", "idem-a", 0));
    assert!(!dedupe.record_and_check("bridge-1", "idem-a", 60_000));
}
