/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The single durable state record: load/migrate/persist.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dedupe::DedupeLedger;
use crate::kv::KeyValueStore;
use crate::node_index::ManagedNodeIndex;
use crate::queue::ReverseQueue;
use crate::suppression::SuppressionState;

/// The KV key the whole durable state record is persisted under.
pub const STATE_KEY: &str = "reverse_sync_state";

/// A heartbeat interval is used before the bridge's `handshake_ack`
/// establishes one. Within the documented clamp range.
pub const DEFAULT_HEARTBEAT_MS: u32 = 30_000;
pub const MIN_HEARTBEAT_MS: u32 = 1_000;
pub const MAX_HEARTBEAT_MS: u32 = 120_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub active_client_id: Option<String>,
    pub ws_url: Option<String>,
    pub reconnect_attempt: u32,
    pub heartbeat_ms: u32,
    pub last_connected_at: Option<String>,
    pub last_error: Option<String>,
    /// Inbound actions currently being processed by the engine (§4.I).
    pub queued_inbound: u32,
    /// Outbound sends handed to the connection task but not yet written
    /// to the socket (§4.I "Send").
    pub queued_outbound: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::default(),
            active_client_id: None,
            ws_url: None,
            reconnect_attempt: 0,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            last_connected_at: None,
            last_error: None,
            queued_inbound: 0,
            queued_outbound: 0,
        }
    }
}

impl SessionState {
    pub fn clamp_heartbeat(&mut self, ms: u32) {
        self.heartbeat_ms = ms.clamp(MIN_HEARTBEAT_MS, MAX_HEARTBEAT_MS);
    }
}

/// The full durable record. Created on first run with all defaults,
/// mutated only through component APIs, persisted atomically after each
/// mutation. Never destroyed; migrations only add fields with safe
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    pub node_index: ManagedNodeIndex,
    pub queue: ReverseQueue,
    pub dedupe: DedupeLedger,
    pub suppression: SuppressionState,
    pub session: SessionState,
    pub import_in_progress: bool,
}

fn field<T: for<'de> Deserialize<'de> + Default>(obj: &serde_json::Map<String, Value>, key: &str) -> T {
    obj.get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn migrate_suppression(obj: &serde_json::Map<String, Value>) -> SuppressionState {
    let mut state: SuppressionState = field(obj, "suppression");
    // Legacy records may have stored `cooldown_until` as an ISO-8601 string
    // rather than epoch milliseconds; coerce it forward.
    if let Some(Value::Object(sup)) = obj.get("suppression") {
        if let Some(Value::String(s)) = sup.get("cooldown_until") {
            if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(s) {
                state.cooldown_until = Some(parsed.timestamp_millis());
            }
        }
    }
    state
}

fn migrate_queue(obj: &serde_json::Map<String, Value>) -> ReverseQueue {
    let raw_items = match obj.get("queue").and_then(|q| q.get("items")) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let mut items = Vec::new();
    for (idx, raw) in raw_items.into_iter().enumerate() {
        match serde_json::from_value(raw) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "state_migration_dropped_queue_item");
            }
        }
    }
    ReverseQueue::from_items(items)
}

/// Runs on whatever was read from storage, including `null`, a bare
/// string, an array, or a well-formed record from a previous version.
/// Always returns a fully-defaulted record; never panics.
pub fn migrate(value: Value) -> SyncState {
    let obj = match value {
        Value::Object(obj) => obj,
        _ => serde_json::Map::new(),
    };
    SyncState {
        node_index: field(&obj, "node_index"),
        queue: migrate_queue(&obj),
        dedupe: field(&obj, "dedupe"),
        suppression: migrate_suppression(&obj),
        session: field(&obj, "session"),
        import_in_progress: field(&obj, "import_in_progress"),
    }
}

/// Durable persistence of [`SyncState`] over an injected [`KeyValueStore`].
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> SyncState;
    async fn save(&self, state: &SyncState);
}

pub struct KvStateStore<K: KeyValueStore> {
    kv: K,
}

impl<K: KeyValueStore> KvStateStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl<K: KeyValueStore + Send + Sync> StateStore for KvStateStore<K> {
    async fn load(&self) -> SyncState {
        let raw = self.kv.get(STATE_KEY).await.unwrap_or(Value::Null);
        migrate(raw)
    }

    async fn save(&self, state: &SyncState) {
        let value = serde_json::to_value(state).expect("SyncState always serializes");
        self.kv.set(STATE_KEY, value).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn migrate_never_panics_on_any_shape() {
        for input in [
            Value::Null,
            json!("x"),
            json!([]),
            json!({}),
            json!(1),
            json!(true),
        ] {
            let state = migrate(input);
            assert_eq!(state.session.status, SessionStatus::Disconnected);
            assert!(!state.import_in_progress);
        }
    }

    #[test]
    fn migrate_preserves_recognized_fields() {
        let input = json!({
            "import_in_progress": true,
            "session": { "reconnect_attempt": 4, "heartbeat_ms": 5000, "status": "connected",
                         "active_client_id": null, "ws_url": null, "last_connected_at": null,
                         "last_error": null, "queued_inbound": 0, "queued_outbound": 0 },
        });
        let state = migrate(input);
        assert!(state.import_in_progress);
        assert_eq!(state.session.reconnect_attempt, 4);
        assert_eq!(state.session.status, SessionStatus::Connected);
    }

    #[test]
    fn migrate_coerces_legacy_cooldown_string() {
        let input = json!({
            "suppression": {
                "apply_epoch": false,
                "epoch_started_at": null,
                "cooldown_until": "2026-07-27T00:00:03Z",
            }
        });
        let state = migrate(input);
        assert!(state.suppression.cooldown_until.is_some());
    }
}
