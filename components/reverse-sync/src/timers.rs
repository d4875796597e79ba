/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Capability: timers and periodic alarms. Two distinct mechanisms are
//! modeled per §5's design notes: an in-process one-shot/interval for
//! responsiveness, cancelled via its handle, and the same trait doubles as
//! the "platform alarm" a host can back with something that survives
//! process suspension (a real browser extension would implement this over
//! `alarms.create`; the in-process `TokioScheduler` below only provides the
//! responsiveness half).

use std::time::Duration;

/// A handle to a scheduled timer or interval. Dropping it does not cancel
/// the underlying task; call [`cancel`](TimerHandle::cancel) explicitly.
pub trait TimerHandle: Send {
    fn cancel(self: Box<Self>);
}

pub trait Scheduler: Send + Sync {
    /// Runs `f` once, after `delay`.
    fn after(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle>;

    /// Runs `f` repeatedly, every `period`, starting after the first
    /// `period` elapses.
    fn every(&self, period: Duration, f: Box<dyn Fn() + Send + Sync>) -> Box<dyn TimerHandle>;
}

/// The in-process [`Scheduler`] backing production use, implemented over
/// `tokio::task::spawn` + `tokio::time`. Handles returned by `after`/`every`
/// cancel by aborting the spawned task.
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

struct AbortHandle(tokio::task::JoinHandle<()>);

impl TimerHandle for AbortHandle {
    fn cancel(self: Box<Self>) {
        self.0.abort();
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle> {
        let handle = tokio::task::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        Box::new(AbortHandle(handle))
    }

    fn every(&self, period: Duration, f: Box<dyn Fn() + Send + Sync>) -> Box<dyn TimerHandle> {
        let handle = tokio::task::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                f();
            }
        });
        Box::new(AbortHandle(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn after_fires_once_past_the_delay() {
        let scheduler = TokioScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _handle = scheduler.after(Duration::from_millis(50), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_interval_ticks() {
        let scheduler = TokioScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = scheduler.every(Duration::from_millis(10), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::advance(Duration::from_millis(35)).await;
        tokio::task::yield_now().await;
        handle.cancel();
        let seen_before_cancel = count.load(Ordering::SeqCst);
        assert!(seen_before_cancel >= 1);
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), seen_before_cancel);
    }
}
