/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! A bounded ring buffer of recent events ("breadcrumbs"), used both as a
//! process-wide fallback sink for [`crate::handling::convert_log_report_error`]
//! and, instantiated directly, as a component's own debug timeline.

use parking_lot::Mutex;
use serde::Serialize;

static GLOBAL: Mutex<Timeline> = Mutex::new(Timeline::new(20));

/// One entry in a [`Timeline`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Breadcrumb {
    pub class: String,
    pub message: String,
}

/// A fixed-capacity ring buffer of [`Breadcrumb`]s. Once full, the oldest
/// entry is overwritten.
#[derive(Debug)]
pub struct Timeline {
    items: Vec<Breadcrumb>,
    capacity: usize,
    pos: usize,
}

impl Timeline {
    pub const fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
            pos: 0,
        }
    }

    pub fn push(&mut self, class: impl Into<String>, message: impl Into<String>) {
        let crumb = Breadcrumb {
            class: class.into(),
            message: message.into(),
        };
        if self.items.len() < self.capacity {
            self.items.push(crumb);
        } else if self.capacity > 0 {
            self.items[self.pos] = crumb;
            self.pos = (self.pos + 1) % self.capacity;
        }
    }

    /// Returns all entries, oldest first.
    pub fn entries(&self) -> Vec<Breadcrumb> {
        let mut out = Vec::from(&self.items[self.pos..]);
        out.extend(self.items[..self.pos].iter().cloned());
        out
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.pos = 0;
    }
}

/// Push a breadcrumb to the process-wide fallback timeline. Components that
/// own their own [`Timeline`] (e.g. the engine's debug timeline) should push
/// to their instance directly instead of relying on this.
pub(crate) fn push_global(class: impl Into<String>, message: impl Into<String>) {
    GLOBAL.lock().push(class, message);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wraps_at_capacity() {
        let mut buf = Timeline::new(3);
        buf.push("a", "0");
        buf.push("a", "1");
        buf.push("a", "2");
        assert_eq!(buf.entries().len(), 3);
        buf.push("a", "3");
        let entries: Vec<_> = buf.entries().into_iter().map(|b| b.message).collect();
        assert_eq!(entries, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_zero_capacity_is_a_noop() {
        let mut buf = Timeline::new(0);
        buf.push("a", "0");
        assert!(buf.entries().is_empty());
    }
}
