/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Bidirectional bookmark reverse-sync: captures local bookmark mutations,
//! queues and coalesces them, ships them to a bridge over a WebSocket (with
//! an HTTP fallback), reconciles acks, and applies bridge-originated actions
//! back to the local bookmark tree without retriggering the capture path.
//!
//! The crate is organized as one module per capability or pipeline stage;
//! [`engine`] is the only place that owns mutable state, and every other
//! module is either a pure function library or an injected capability trait.

pub mod ack;
pub mod bookmarks;
pub mod capture;
pub mod config;
pub mod debug;
pub mod dedupe;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod http_fallback;
pub mod inbound;
pub mod kv;
pub mod node_index;
pub mod queue;
pub mod session;
pub mod state;
pub mod suppression;
pub mod timers;

pub use engine::{Engine, EngineHandle, SessionSummary};
pub use error::Error;
