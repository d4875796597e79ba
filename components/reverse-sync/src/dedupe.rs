/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Per-direction, per-client TTL set of idempotency keys.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Entries older than this are evicted from a client's bucket on access.
pub const DEDUPE_TTL_MS: i64 = 5 * 60 * 1000;

/// Synthetic client id bucketing outbound eventIds, so a duplicate
/// locally-generated eventId is rejected before it is ever enqueued.
pub const OUTBOUND_CLIENT_ID: &str = "outbound";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DedupeLedger {
    buckets: HashMap<String, HashMap<String, i64>>,
}

impl DedupeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evicts stale entries in `client_id`'s bucket, then records `key` if
    /// it isn't already present. Returns `true` iff this call is the one
    /// that accepted the key (i.e. it was not a duplicate).
    pub fn record_and_check(&mut self, client_id: &str, key: &str, now_ms: i64) -> bool {
        let bucket = self.buckets.entry(client_id.to_string()).or_default();
        bucket.retain(|_, seen_at| now_ms - *seen_at < DEDUPE_TTL_MS);
        if bucket.contains_key(key) {
            false
        } else {
            bucket.insert(key.to_string(), now_ms);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_once_then_rejects_duplicate() {
        let mut ledger = DedupeLedger::new();
        assert!(ledger.record_and_check("c1", "k1", 0));
        assert!(!ledger.record_and_check("c1", "k1", 1));
    }

    #[test]
    fn ttl_eviction_allows_reacceptance() {
        let mut ledger = DedupeLedger::new();
        assert!(ledger.record_and_check("c1", "k1", 0));
        assert!(!ledger.record_and_check("c1", "k1", DEDUPE_TTL_MS - 1));
        assert!(ledger.record_and_check("c1", "k1", DEDUPE_TTL_MS + 1));
    }

    #[test]
    fn buckets_are_independent_per_client() {
        let mut ledger = DedupeLedger::new();
        assert!(ledger.record_and_check("outbound", "k1", 0));
        assert!(ledger.record_and_check("peer-a", "k1", 0));
    }
}
