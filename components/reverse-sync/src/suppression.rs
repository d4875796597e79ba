/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! apply-epoch + cooldown gating of outbound capture.

use serde::{Deserialize, Serialize};

/// Tail window after an apply cycle during which newly observed local
/// mutations are assumed to be echoes of that apply.
pub const APPLY_COOLDOWN_MS: i64 = 3000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuppressionState {
    pub apply_epoch: bool,
    pub epoch_started_at: Option<String>,
    pub cooldown_until: Option<i64>,
}

impl SuppressionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbound capture is suppressed while an apply is in flight, or
    /// during its cooldown tail.
    pub fn is_suppressed(&self, now_ms: i64) -> bool {
        self.apply_epoch || self.cooldown_until.is_some_and(|c| c > now_ms)
    }

    pub fn set_apply_epoch(&mut self, active: bool, now_iso: impl Into<String>) {
        if active {
            self.apply_epoch = true;
            self.epoch_started_at = Some(now_iso.into());
        } else {
            self.apply_epoch = false;
            self.epoch_started_at = None;
            self.cooldown_until = None;
        }
    }

    pub fn set_cooldown(&mut self, ms: i64, now_ms: i64) {
        self.cooldown_until = Some(now_ms + ms);
    }

    /// Call before running an inbound apply cycle.
    pub fn begin_apply(&mut self, now_iso: impl Into<String>) {
        self.set_apply_epoch(true, now_iso);
    }

    /// Call after an apply cycle exits, success or failure: clears the
    /// epoch and opens the standard cooldown tail.
    pub fn end_apply(&mut self, now_ms: i64) {
        self.set_apply_epoch(false, "");
        self.set_cooldown(APPLY_COOLDOWN_MS, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_epoch_clears_both_fields() {
        let mut s = SuppressionState::new();
        s.set_apply_epoch(true, "2026-07-27T00:00:00Z");
        s.set_cooldown(1000, 0);
        s.set_apply_epoch(false, "");
        assert!(s.epoch_started_at.is_none());
        assert!(s.cooldown_until.is_none());
    }

    #[test]
    fn suppressed_during_epoch_and_cooldown() {
        let mut s = SuppressionState::new();
        assert!(!s.is_suppressed(0));
        s.set_apply_epoch(true, "t");
        assert!(s.is_suppressed(0));
        s.set_apply_epoch(false, "");
        assert!(!s.is_suppressed(0));
        s.set_cooldown(3000, 1_000);
        assert!(s.is_suppressed(1_500));
        assert!(!s.is_suppressed(4_000));
    }

    #[test]
    fn end_apply_opens_three_second_cooldown() {
        let mut s = SuppressionState::new();
        s.begin_apply("t");
        s.end_apply(10_000);
        assert!(!s.apply_epoch);
        assert_eq!(s.cooldown_until, Some(13_000));
    }
}
