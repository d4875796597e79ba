/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The engine: a single Tokio task that owns [`SyncState`] exclusively
//! (§4.O, §5). Every other component — capture callbacks, the message
//! surface, the WebSocket session — talks to it only through
//! [`EngineHandle`], never by touching state directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use error_support::redact_token;

use crate::ack::{self, BatchAckResponse};
use crate::bookmarks::{BookmarkEvent, BookmarkStore};
use crate::capture;
use crate::config::{self, BridgeConfig, Profile};
use crate::debug::{redact_summary_url, DebugEvent, DebugTimeline, Level as DebugLevel};
use crate::envelope::{ActionBody, Envelope};
use crate::http_fallback::HttpFallbackClient;
use crate::inbound;
use crate::kv::KeyValueStore;
use crate::queue::QuarantinedItem;
use crate::session::{self, SessionCommand, SessionEvent};
use crate::state::{KvStateStore, SessionStatus, StateStore, SyncState};
use crate::timers::{Scheduler, TimerHandle};

/// A debounce window before a flush runs after enqueueing, per §4.F.
pub const FLUSH_DEBOUNCE_MS: u64 = 2_000;
/// The durability alarm: fires regardless of in-process timers so a
/// restarted process still makes progress, per §4.F.
pub const DURABLE_FLUSH_ALARM_MS: u64 = 3_000;

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub reconnect_attempt: u32,
    pub queued_inbound: u32,
    pub queued_outbound: u32,
}

enum EngineCommand {
    Capture(BookmarkEvent),
    InboundAction { client_id: String, action: ActionBody },
    AckBatch(BatchAckResponse),
    SessionOpened,
    SessionClosed { code: u16, reason: String },
    HandshakeAccepted { heartbeat_ms: u32 },
    OutboundSent,
    ManualSync,
    GetBridgeConfig(oneshot::Sender<BridgeConfig>),
    SetBridgeConfig(BridgeConfig, oneshot::Sender<()>),
    GetDebugEvents(oneshot::Sender<Vec<DebugEvent>>),
    ClearDebugEvents,
    GetSessionSummary(oneshot::Sender<SessionSummary>),
    Flush,
}

/// A cheap, cloneable handle to a running [`Engine`]. Every public
/// operation named in §6's CLI/message surface is a method here.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn submit_capture(&self, event: BookmarkEvent) {
        let _ = self.commands.send(EngineCommand::Capture(event));
    }

    pub fn submit_inbound_action(&self, client_id: String, action: ActionBody) {
        let _ = self
            .commands
            .send(EngineCommand::InboundAction { client_id, action });
    }

    pub fn submit_ack_batch(&self, batch: BatchAckResponse) {
        let _ = self.commands.send(EngineCommand::AckBatch(batch));
    }

    pub fn notify_session_opened(&self) {
        let _ = self.commands.send(EngineCommand::SessionOpened);
    }

    pub fn notify_session_closed(&self, code: u16, reason: String) {
        let _ = self.commands.send(EngineCommand::SessionClosed { code, reason });
    }

    pub fn notify_handshake_accepted(&self, heartbeat_ms: u32) {
        let _ = self
            .commands
            .send(EngineCommand::HandshakeAccepted { heartbeat_ms });
    }

    pub fn notify_outbound_sent(&self) {
        let _ = self.commands.send(EngineCommand::OutboundSent);
    }

    pub fn manual_sync(&self) {
        let _ = self.commands.send(EngineCommand::ManualSync);
    }

    pub fn trigger_flush(&self) {
        let _ = self.commands.send(EngineCommand::Flush);
    }

    pub async fn get_bridge_config(&self) -> Option<BridgeConfig> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(EngineCommand::GetBridgeConfig(tx)).ok()?;
        rx.await.ok()
    }

    pub async fn set_bridge_config(&self, config: BridgeConfig) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(EngineCommand::SetBridgeConfig(config, tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn get_debug_events(&self) -> Vec<DebugEvent> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(EngineCommand::GetDebugEvents(tx)).is_ok() {
            rx.await.unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub fn clear_debug_events(&self) {
        let _ = self.commands.send(EngineCommand::ClearDebugEvents);
    }

    pub async fn get_session_summary(&self) -> Option<SessionSummary> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(EngineCommand::GetSessionSummary(tx)).ok()?;
        rx.await.ok()
    }
}

/// Owns [`SyncState`] exclusively. Constructed once per process, driven by
/// [`Engine::run`] on its own task.
pub struct Engine<K: KeyValueStore, B: BookmarkStore> {
    state: SyncState,
    config: BridgeConfig,
    debug: DebugTimeline,
    state_store: KvStateStore<Arc<K>>,
    kv: Arc<K>,
    bookmarks: Arc<B>,
    http: HttpFallbackClient,
    scheduler: Arc<dyn Scheduler>,
    session_commands: Option<mpsc::UnboundedSender<SessionCommand>>,
    own_client_id: String,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    self_handle: EngineHandle,
    flush_debounce: Option<Box<dyn TimerHandle>>,
}

impl<K: KeyValueStore + 'static, B: BookmarkStore + 'static> Engine<K, B> {
    pub async fn new(kv: Arc<K>, bookmarks: Arc<B>, scheduler: Arc<dyn Scheduler>) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let self_handle = EngineHandle { commands: tx.clone() };
        let state_store = KvStateStore::new(Arc::clone(&kv));
        let state = state_store.load().await;
        let config = config::get_bridge_config(kv.as_ref()).await;
        let own_client_id = config.active_client_id.clone();
        let engine = Self {
            state,
            config,
            debug: DebugTimeline::default(),
            state_store,
            kv,
            bookmarks,
            http: HttpFallbackClient::new(),
            scheduler,
            session_commands: None,
            own_client_id,
            commands: rx,
            self_handle,
            flush_debounce: None,
        };
        (engine, EngineHandle { commands: tx })
    }

    fn push_debug(&mut self, now_ms: i64, level: DebugLevel, summary: impl Into<String>) {
        self.debug.push(now_ms, level, summary);
    }

    async fn persist(&mut self) {
        self.state_store.save(&self.state).await;
    }

    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn now_iso(&self) -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// The capture path: J → E (gate) → B (derive key) → F (enqueue) → persist.
    /// A successful enqueue (re)schedules the debounced flush alarm; the
    /// previous timer is cancelled so back-to-back edits collapse onto one
    /// flush FLUSH_DEBOUNCE_MS after the last of them, per §4.F.
    async fn handle_capture(&mut self, event: BookmarkEvent) {
        let now_ms = self.now_ms();
        let now_iso = self.now_iso();
        if let Some(outcome) = capture::route(&mut self.state, event, now_ms, &now_iso) {
            match outcome {
                capture::CaptureOutcome::Skipped(_) => {
                    self.push_debug(now_ms, DebugLevel::Debug, format!("capture_skip {outcome:?}"));
                }
                capture::CaptureOutcome::Enqueued => self.schedule_flush_debounce(),
            }
        }
        self.persist().await;
    }

    fn schedule_flush_debounce(&mut self) {
        if let Some(prev) = self.flush_debounce.take() {
            prev.cancel();
        }
        let handle = self.self_handle.clone();
        self.flush_debounce = Some(self.scheduler.after(
            Duration::from_millis(FLUSH_DEBOUNCE_MS),
            Box::new(move || handle.trigger_flush()),
        ));
    }

    /// The inbound path: transport → validate (done by the caller) →
    /// dedupe against the durable ledger `D`, keyed by peer `clientId` →
    /// apply (with E active) → ack. Routing the dedupe check here, rather
    /// than in the session manager, means it survives a reconnect: `D` is
    /// part of `SyncState`, not rebuilt per connection.
    async fn handle_inbound_action(&mut self, client_id: String, action: ActionBody) {
        let now_ms = self.now_ms();
        self.state.session.queued_inbound += 1;
        if !self
            .state
            .dedupe
            .record_and_check(&client_id, &action.idempotency_key, now_ms)
        {
            self.push_debug(
                now_ms,
                DebugLevel::Info,
                format!("ws_action_skip client={client_id} reason=duplicate_inbound"),
            );
            self.state.session.queued_inbound = self.state.session.queued_inbound.saturating_sub(1);
            self.persist().await;
            return;
        }

        let now_iso = self.now_iso();
        self.state.suppression.begin_apply(now_iso.clone());
        let outcome = inbound::apply_action(self.bookmarks.as_ref(), &mut self.state.node_index, &action).await;
        self.state.suppression.end_apply(now_ms);

        let status = crate::envelope::legacy_to_status(outcome.legacy_status);
        let ack = Envelope::Ack(
            crate::envelope::Common {
                event_id: uuid::Uuid::new_v4().to_string(),
                client_id: self.own_client_id.clone(),
                occurred_at: now_iso,
                schema_version: "1".to_string(),
                idempotency_key: None,
                correlation_id: Some(action.idempotency_key.clone()),
            },
            crate::envelope::AckBody {
                correlation_id: action.idempotency_key,
                status,
                reason: outcome.reason.clone(),
                resolved_path: outcome.resolved_path.clone(),
                resolved_key: outcome.resolved_key.clone(),
                legacy_status: Some(outcome.legacy_status),
            },
        );
        self.send_envelope(ack);

        if outcome.legacy_status == crate::envelope::LegacyStatus::SkippedAmbiguous {
            self.push_debug(
                now_ms,
                DebugLevel::Warn,
                format!("ws_action_skip client={client_id} reason={:?}", outcome.reason),
            );
        }
        self.state.session.queued_inbound = self.state.session.queued_inbound.saturating_sub(1);
        self.persist().await;
    }

    async fn handle_ack_batch(&mut self, batch: BatchAckResponse) {
        let outcome = ack::reconcile(&mut self.state.queue, &mut self.state.node_index, &batch);
        let now_ms = self.now_ms();
        for event_id in &outcome.unknown_status_events {
            self.push_debug(now_ms, DebugLevel::Warn, format!("ack_unknown_status event_id={event_id}"));
        }
        self.persist().await;
    }

    /// Hands an envelope to the live connection's outbound channel.
    /// `queuedOutbound` tracks how many sends are sitting there, waiting
    /// for the connection task to write them to the socket; it is retired
    /// when that task reports [`SessionEvent::Sent`] (§3, §4.I "Send").
    fn send_envelope(&mut self, envelope: Envelope) {
        if let Some(commands) = &self.session_commands {
            if commands.send(SessionCommand::Send(envelope)).is_ok() {
                self.state.session.queued_outbound += 1;
            }
        }
    }

    /// Flush: produce the coalesced view and send each item as an
    /// `action`, via the WebSocket if connected, else the legacy HTTP
    /// fallback (SPEC_FULL §4.N). The queue itself is never mutated here;
    /// drainage happens exclusively through ack reconciliation.
    async fn flush(&mut self) {
        if !self.state.queue.try_begin_flush() {
            return;
        }
        let coalesced = self.state.queue.coalesced_view();
        if coalesced.is_empty() {
            self.state.queue.end_flush();
            return;
        }

        if self.state.session.status == SessionStatus::Connected {
            for item in &coalesced {
                let envelope = Envelope::Action(
                    crate::envelope::Common {
                        event_id: uuid::Uuid::new_v4().to_string(),
                        client_id: self.own_client_id.clone(),
                        occurred_at: self.now_iso(),
                        schema_version: "1".to_string(),
                        idempotency_key: Some(item.event.batch_id.clone()),
                        correlation_id: None,
                    },
                    ActionBody {
                        op: serde_json::to_value(item.event.event_type)
                            .ok()
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default(),
                        target: if item.event.managed_key.is_empty() {
                            item.event.bookmark_id.clone()
                        } else {
                            item.event.managed_key.clone()
                        },
                        payload: serde_json::json!({
                            "bookmarkId": item.event.bookmark_id,
                            "managedKey": item.event.managed_key,
                            "parentId": item.event.parent_id,
                            "moveIndex": item.event.move_index,
                            "title": item.event.title,
                            "url": item.event.url,
                        }),
                        idempotency_key: item.event.batch_id.clone(),
                    },
                );
                self.send_envelope(envelope);
            }
        } else if let Ok(profile) = config::resolve_active_profile(&self.config).map(Profile::clone) {
            let batch_id = uuid::Uuid::new_v4().to_string();
            let events: Vec<_> = coalesced.iter().map(|i| i.event.clone()).collect();
            let sent_at = self.now_iso();
            match self
                .http
                .post_reverse_sync(&profile, &batch_id, &events, &sent_at)
                .await
            {
                Ok(batch) => {
                    self.state.queue.end_flush();
                    self.handle_ack_batch(batch).await;
                    self.state.queue.sweep_superseded(&coalesced);
                    self.persist().await;
                    return;
                }
                Err(e) => {
                    let failed_ids: std::collections::HashSet<String> =
                        coalesced.iter().map(|i| i.event.event_id.clone()).collect();
                    let reason = redact_summary_url(&e.to_string());
                    let quarantined: Vec<QuarantinedItem> =
                        self.state.queue.mark_failures(&failed_ids, &reason);
                    let now_ms = self.now_ms();
                    for q in quarantined {
                        self.push_debug(
                            now_ms,
                            DebugLevel::Warn,
                            format!(
                                "quarantine event_id={} bookmark_id={} retry_count={} reason={}",
                                q.event_id, q.bookmark_id, q.retry_count, q.reason
                            ),
                        );
                    }
                }
            }
        }

        self.state.queue.sweep_superseded(&coalesced);
        self.state.queue.end_flush();
        self.persist().await;
    }

    async fn handle_config_get(&self) -> BridgeConfig {
        self.config.clone()
    }

    async fn handle_config_set(&mut self, config: BridgeConfig) {
        config::set_bridge_config(self.kv.as_ref(), &config).await;
        self.config = config;
    }

    fn session_summary(&self) -> SessionSummary {
        SessionSummary {
            status: self.state.session.status,
            last_error: self.state.session.last_error.clone(),
            reconnect_attempt: self.state.session.reconnect_attempt,
            queued_inbound: self.state.session.queued_inbound,
            queued_outbound: self.state.session.queued_outbound,
        }
    }

    /// `ensure(reason)` (§4.I): resolves the active profile, and unless
    /// disabled, arranges for a connection attempt. Actual socket I/O is
    /// driven by [`session::run_connection`] on a task spawned by the
    /// caller that owns the runtime handle; this only updates state and
    /// returns the parameters that task needs.
    async fn ensure(&mut self) {
        let profile = match config::resolve_active_profile(&self.config).map(Profile::clone) {
            Err(_) => {
                self.state.session.status = SessionStatus::Disconnected;
                self.state.session.last_error = Some("active_profile_disabled".to_string());
                self.persist().await;
                return;
            }
            Ok(profile) => profile,
        };
        if self.state.session.status == SessionStatus::Connected
            || self.state.session.status == SessionStatus::Connecting
        {
            return;
        }
        self.state.session.status = if self.state.session.reconnect_attempt > 0 {
            SessionStatus::Reconnecting
        } else {
            SessionStatus::Connecting
        };
        self.state.session.ws_url = Some(profile.ws_url.clone());
        self.state.session.active_client_id = Some(profile.client_id.clone());
        let now_ms = self.now_ms();
        self.push_debug(
            now_ms,
            DebugLevel::Info,
            format!(
                "ws_connect url={} token={}",
                redact_summary_url(&profile.ws_url),
                redact_token(&profile.token),
            ),
        );
        self.persist().await;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        self.session_commands = Some(cmd_tx);

        let ws_url = profile.ws_url.clone();
        let token = profile.token.clone();
        let client_id = self.own_client_id.clone();
        let session_id = uuid::Uuid::new_v4().to_string();
        let heartbeat_ms = self.state.session.heartbeat_ms;
        tokio::spawn(async move {
            let _ = session::run_connection(&ws_url, &session_id, &token, &client_id, heartbeat_ms, cmd_rx, evt_tx).await;
        });

        let handle = self.self_handle.clone();
        tokio::spawn(async move {
            while let Some(event) = evt_rx.recv().await {
                match event {
                    SessionEvent::Opened => handle.notify_session_opened(),
                    SessionEvent::HandshakeAccepted { heartbeat_ms } => handle.notify_handshake_accepted(heartbeat_ms),
                    SessionEvent::Ack(batch) => handle.submit_ack_batch(batch),
                    SessionEvent::InboundAction { client_id, action } => {
                        handle.submit_inbound_action(client_id, action)
                    }
                    SessionEvent::Sent => handle.notify_outbound_sent(),
                    SessionEvent::Closed { code, reason } => {
                        handle.notify_session_closed(code, reason);
                        break;
                    }
                    SessionEvent::PeerError { .. } => {}
                }
            }
        });
    }

    pub async fn run(mut self) {
        // The durability alarm: unlike the debounce in `schedule_flush_debounce`,
        // this one is never cancelled, so a restarted process still makes
        // progress even if nothing re-enqueues.
        let flush_alarm_handle = self.self_handle.clone();
        let _flush_alarm = self.scheduler.every(
            Duration::from_millis(DURABLE_FLUSH_ALARM_MS),
            Box::new(move || flush_alarm_handle.trigger_flush()),
        );
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(EngineCommand::Capture(event)) => self.handle_capture(event).await,
                        Some(EngineCommand::InboundAction { client_id, action }) => {
                            self.handle_inbound_action(client_id, action).await
                        }
                        Some(EngineCommand::AckBatch(batch)) => self.handle_ack_batch(batch).await,
                        Some(EngineCommand::SessionOpened) => {
                            self.state.session.status = SessionStatus::Connected;
                            self.state.session.reconnect_attempt = 0;
                            self.state.session.last_connected_at = Some(self.now_iso());
                            self.persist().await;
                        }
                        Some(EngineCommand::SessionClosed { code, reason }) => {
                            self.state.session.reconnect_attempt += 1;
                            self.state.session.status = SessionStatus::Disconnected;
                            self.state.session.last_error =
                                Some(format!("close_{code}:{}", redact_summary_url(&reason)));
                            self.session_commands = None;
                            let backoff = session::reconnect_backoff_ms(self.state.session.reconnect_attempt);
                            let handle = self.self_handle.clone();
                            self.scheduler.after(
                                Duration::from_millis(backoff),
                                Box::new(move || handle.manual_sync()),
                            );
                            self.persist().await;
                        }
                        // On open (§4.I) the status/reconnectAttempt/lastConnectedAt
                        // transition already happened via `SessionOpened`; a
                        // `handshake_ack` only clamps and stores `heartbeatMs`.
                        Some(EngineCommand::HandshakeAccepted { heartbeat_ms }) => {
                            self.state.session.clamp_heartbeat(heartbeat_ms);
                            self.persist().await;
                        }
                        Some(EngineCommand::OutboundSent) => {
                            self.state.session.queued_outbound =
                                self.state.session.queued_outbound.saturating_sub(1);
                            self.persist().await;
                        }
                        Some(EngineCommand::ManualSync) => self.ensure().await,
                        Some(EngineCommand::GetBridgeConfig(reply)) => {
                            let _ = reply.send(self.handle_config_get().await);
                        }
                        Some(EngineCommand::SetBridgeConfig(config, reply)) => {
                            self.handle_config_set(config).await;
                            let _ = reply.send(());
                        }
                        Some(EngineCommand::GetDebugEvents(reply)) => {
                            let _ = reply.send(self.debug.entries());
                        }
                        Some(EngineCommand::ClearDebugEvents) => self.debug.clear(),
                        Some(EngineCommand::GetSessionSummary(reply)) => {
                            let _ = reply.send(self.session_summary());
                        }
                        Some(EngineCommand::Flush) => self.flush().await,
                        None => return,
                    }
                }
            }
        }
    }
}
