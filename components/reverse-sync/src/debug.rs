/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The debug timeline: a bounded ring buffer of the last 200 events,
//! readable through the message surface. Shaped after
//! `error_support::breadcrumbs::Timeline`, but each entry carries its own
//! timestamp and level rather than relying on emission order alone.

use serde::{Deserialize, Serialize};

use error_support::redact_url;

/// Capacity named in §7: "debug timeline retains the last 200 events".
pub const DEBUG_TIMELINE_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    pub at: i64,
    pub level: Level,
    pub summary: String,
}

/// A fixed-capacity, overwrite-oldest ring buffer of [`DebugEvent`]s. The
/// engine owns exactly one instance; nothing here is global.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugTimeline {
    items: Vec<DebugEvent>,
    capacity: usize,
    pos: usize,
}

impl DebugTimeline {
    pub const fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
            pos: 0,
        }
    }

    /// `summary` must already have tokens/URLs redacted by the caller if it
    /// quotes either; see [`redact_summary`] for the one approved helper.
    pub fn push(&mut self, now_ms: i64, level: Level, summary: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let event = DebugEvent {
            at: now_ms,
            level,
            summary: summary.into(),
        };
        if self.items.len() < self.capacity {
            self.items.push(event);
        } else {
            self.items[self.pos] = event;
            self.pos = (self.pos + 1) % self.capacity;
        }
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<DebugEvent> {
        if self.items.len() < self.capacity {
            return self.items.clone();
        }
        let (tail, head) = self.items.split_at(self.pos);
        head.iter().chain(tail.iter()).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.pos = 0;
    }
}

impl Default for DebugTimeline {
    fn default() -> Self {
        Self::new(DEBUG_TIMELINE_CAPACITY)
    }
}

/// Strips userinfo and query string from any URL substring before it is
/// folded into a debug summary, per §7: "Token values and full URLs are
/// never logged."
pub fn redact_summary_url(url: &str) -> String {
    redact_url(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_capacity_keeping_most_recent() {
        let mut timeline = DebugTimeline::new(2);
        timeline.push(1, Level::Info, "a");
        timeline.push(2, Level::Info, "b");
        timeline.push(3, Level::Info, "c");
        let entries = timeline.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].summary, "b");
        assert_eq!(entries[1].summary, "c");
    }

    #[test]
    fn clear_empties_and_resets_cursor() {
        let mut timeline = DebugTimeline::new(2);
        timeline.push(1, Level::Warn, "a");
        timeline.clear();
        assert!(timeline.entries().is_empty());
        timeline.push(2, Level::Warn, "b");
        assert_eq!(timeline.entries()[0].summary, "b");
    }

    #[test]
    fn zero_capacity_is_a_noop() {
        let mut timeline = DebugTimeline::new(0);
        timeline.push(1, Level::Error, "x");
        assert!(timeline.entries().is_empty());
    }
}
