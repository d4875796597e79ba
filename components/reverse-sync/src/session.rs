/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The WebSocket transport/session manager (§4.I): connect, handshake,
//! heartbeat, dispatch of inbound frames, and the backoff schedule used by
//! the owning engine to decide when to reconnect. The actual socket loop
//! is a narrow actor (`run_connection`) that knows nothing about
//! `SyncState`; it only speaks [`SessionCommand`]/[`SessionEvent`] to
//! whoever owns that state (§4.O).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::ack::{AckResult, AckResultStatus, BatchAckResponse};
use crate::envelope::{
    try_parse_envelope, ActionBody, AckStatus, Common, Envelope, LegacyStatus,
};

/// Heartbeat pings are sent at `min(heartbeatMs, 25000)`, per §4.I.
pub const MAX_HEARTBEAT_INTERVAL_MS: u32 = 25_000;

/// A socket idle for longer than `2 × heartbeatMs` since the last ping is
/// presumed dead; the local watchdog closes it (SPEC_FULL §4.I), rather
/// than waiting solely on the peer's `close(4000, …)`.
pub const HEARTBEAT_WATCHDOG_MULTIPLIER: u32 = 2;

/// Backoff ceiling and base for reconnect attempts: `min(30s, 500ms *
/// 2^min(attempt, 6))`.
pub const MAX_BACKOFF_MS: u64 = 30_000;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_EXPONENT_CAP: u32 = 6;

pub fn heartbeat_interval_ms(heartbeat_ms: u32) -> u32 {
    heartbeat_ms.min(MAX_HEARTBEAT_INTERVAL_MS)
}

pub fn heartbeat_watchdog_ms(heartbeat_ms: u32) -> u64 {
    u64::from(heartbeat_ms) * u64::from(HEARTBEAT_WATCHDOG_MULTIPLIER)
}

pub fn reconnect_backoff_ms(attempt: u32) -> u64 {
    let exp = attempt.min(BACKOFF_EXPONENT_CAP);
    let backoff = BACKOFF_BASE_MS.saturating_mul(1u64 << exp);
    backoff.min(MAX_BACKOFF_MS)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("socket constructor failed: {0}")]
    ConstructorError(String),
    #[error("heartbeat timed out waiting for a pong")]
    HandshakeTimeout,
}

/// Commands the owning engine sends to a live connection actor.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Send(Envelope),
    Close,
}

/// Events a connection actor reports back to the owning engine. The
/// engine is solely responsible for mutating `SyncState` in response.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Opened,
    HandshakeAccepted { heartbeat_ms: u32 },
    Ack(BatchAckResponse),
    InboundAction { client_id: String, action: ActionBody },
    PeerError { code: String, message: String },
    /// A queued `Send` command has left the socket (successfully or not);
    /// the owning engine uses this to retire its `queuedOutbound` count.
    Sent,
    Closed { code: u16, reason: String },
}

/// Turns one inbound ack-shaped envelope into the batch-of-one shape
/// `G.reconcile` expects, per §4.I's "bridge to G" rule:
/// `correlationId` becomes the `eventId`, and the batchId is
/// `idempotencyKey` if present, else `correlationId`, else the literal
/// `"ws"`.
pub fn ack_envelope_to_batch(common: &Common, correlation_id: &str, status: AckStatus, legacy_status: Option<LegacyStatus>, reason: Option<String>, resolved_key: Option<String>, resolved_path: Option<String>) -> BatchAckResponse {
    let batch_id = common
        .idempotency_key
        .clone()
        .or_else(|| common.correlation_id.clone())
        .unwrap_or_else(|| "ws".to_string());
    let effective_status = match legacy_status {
        Some(legacy) => AckResultStatus::from_wire(legacy.as_wire()),
        None => match status {
            AckStatus::Applied => AckResultStatus::Applied,
            AckStatus::Duplicate => AckResultStatus::Duplicate,
            AckStatus::Skipped => AckResultStatus::SkippedAmbiguous,
            AckStatus::Rejected => AckResultStatus::RejectedInvalid,
            AckStatus::Received => AckResultStatus::Unknown("received".to_string()),
        },
    };
    BatchAckResponse {
        batch_id,
        results: vec![AckResult {
            event_id: correlation_id.to_string(),
            status: effective_status,
            reason,
            resolved_key,
            resolved_path,
        }],
    }
}

/// The result of dispatching one inbound, already-validated envelope,
/// independent of any socket I/O. `ReplyPong` and `Forward*` tell the
/// caller what, if anything, to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundDispatch {
    HandshakeAccepted { heartbeat_ms: u32 },
    ReplyPong { correlation_id: String },
    Noop,
    Ack(BatchAckResponse),
    PeerError { code: String, message: String },
    AcceptAction { client_id: String, action: ActionBody },
}

/// The pure routing table behind "On message" in §4.I, decoupled from the
/// socket so it can be unit-tested without a live connection. Dedupe of
/// `action` envelopes against the durable ledger `D` is the owning engine's
/// job (§4.D), not this module's: it happens once the action reaches
/// `SyncState`, so it survives reconnects instead of resetting with every
/// new connection.
pub fn dispatch_inbound(envelope: Envelope) -> InboundDispatch {
    match envelope {
        Envelope::HandshakeAck(_, body) => InboundDispatch::HandshakeAccepted {
            heartbeat_ms: body.heartbeat_ms.clamp(1000, 120_000),
        },
        Envelope::HeartbeatPing(common) => InboundDispatch::ReplyPong {
            correlation_id: common.event_id,
        },
        Envelope::HeartbeatPong(..) => InboundDispatch::Noop,
        Envelope::Ack(common, body) => InboundDispatch::Ack(ack_envelope_to_batch(
            &common,
            &body.correlation_id,
            body.status,
            body.legacy_status,
            body.reason,
            body.resolved_key,
            body.resolved_path,
        )),
        Envelope::Error(_, body) => InboundDispatch::PeerError {
            code: body.code,
            message: body.message,
        },
        Envelope::Action(common, body) => InboundDispatch::AcceptAction {
            client_id: common.client_id,
            action: body,
        },
        Envelope::Handshake(..) => InboundDispatch::Noop,
    }
}

/// Parses a raw text frame and dispatches it, logging and dropping
/// anything that doesn't pass envelope validation (`ws_invalid_message`).
pub fn handle_raw_frame(raw: &str) -> Option<InboundDispatch> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let envelope = try_parse_envelope(&value)?;
    Some(dispatch_inbound(envelope))
}

/// Runs one connection attempt end to end: connect, handshake, heartbeat,
/// frame dispatch, until the peer or the local watchdog closes it. Returns
/// once the connection has ended; the caller (the engine) decides whether
/// and when to call this again, applying [`reconnect_backoff_ms`].
pub async fn run_connection(
    ws_url: &str,
    session_id: &str,
    token: &str,
    own_client_id: &str,
    initial_heartbeat_ms: u32,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Result<(), SessionError> {
    let (stream, _response) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| SessionError::ConstructorError(e.to_string()))?;
    let (mut write, mut read) = stream.split();

    let _ = events.send(SessionEvent::Opened);

    let handshake = Envelope::Handshake(
        Common {
            event_id: uuid::Uuid::new_v4().to_string(),
            client_id: own_client_id.to_string(),
            occurred_at: chrono::Utc::now().to_rfc3339(),
            schema_version: "1".to_string(),
            idempotency_key: None,
            correlation_id: None,
        },
        crate::envelope::HandshakeBody {
            session_id: session_id.to_string(),
            token: token.to_string(),
            capabilities: vec!["action".to_string(), "ack".to_string(), "heartbeat".to_string()],
        },
    );
    if write
        .send(Message::text(encode_handshake(&handshake)))
        .await
        .is_err()
    {
        return Ok(());
    }

    let mut heartbeat_ms = initial_heartbeat_ms;
    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_millis(u64::from(heartbeat_interval_ms(heartbeat_ms))));
    let mut watchdog_deadline =
        tokio::time::Instant::now() + Duration::from_millis(heartbeat_watchdog_ms(heartbeat_ms));

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        watchdog_deadline = tokio::time::Instant::now()
                            + Duration::from_millis(heartbeat_watchdog_ms(heartbeat_ms));
                        if let Some(dispatch) = handle_raw_frame(&text) {
                            match dispatch {
                                InboundDispatch::HandshakeAccepted { heartbeat_ms: hb } => {
                                    heartbeat_ms = hb;
                                    heartbeat_interval = tokio::time::interval(
                                        Duration::from_millis(u64::from(heartbeat_interval_ms(heartbeat_ms))),
                                    );
                                    let _ = events.send(SessionEvent::HandshakeAccepted { heartbeat_ms });
                                }
                                InboundDispatch::ReplyPong { correlation_id } => {
                                    let pong = Envelope::HeartbeatPong(
                                        Common {
                                            event_id: uuid::Uuid::new_v4().to_string(),
                                            client_id: own_client_id.to_string(),
                                            occurred_at: chrono::Utc::now().to_rfc3339(),
                                            schema_version: "1".to_string(),
                                            idempotency_key: None,
                                            correlation_id: Some(correlation_id.clone()),
                                        },
                                        correlation_id,
                                    );
                                    let _ = write.send(Message::text(encode_pong(&pong))).await;
                                }
                                InboundDispatch::Noop => {}
                                InboundDispatch::Ack(batch) => {
                                    let _ = events.send(SessionEvent::Ack(batch));
                                }
                                InboundDispatch::PeerError { code, message } => {
                                    let _ = events.send(SessionEvent::PeerError { code, message });
                                }
                                InboundDispatch::AcceptAction { client_id, action } => {
                                    let _ = events.send(SessionEvent::InboundAction { client_id, action });
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1000, String::new()));
                        let _ = events.send(SessionEvent::Closed { code, reason });
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = events.send(SessionEvent::Closed { code: 1006, reason: e.to_string() });
                        return Ok(());
                    }
                    None => {
                        let _ = events.send(SessionEvent::Closed { code: 1006, reason: "stream_ended".to_string() });
                        return Ok(());
                    }
                }
            }
            _ = heartbeat_interval.tick() => {
                let ping = Envelope::HeartbeatPing(Common {
                    event_id: uuid::Uuid::new_v4().to_string(),
                    client_id: own_client_id.to_string(),
                    occurred_at: chrono::Utc::now().to_rfc3339(),
                    schema_version: "1".to_string(),
                    idempotency_key: None,
                    correlation_id: None,
                });
                let _ = write.send(Message::text(encode_ping(&ping))).await;
            }
            _ = tokio::time::sleep_until(watchdog_deadline) => {
                let _ = write.send(Message::Close(None)).await;
                let _ = events.send(SessionEvent::Closed {
                    code: 4000,
                    reason: "heartbeat_timeout".to_string(),
                });
                return Ok(());
            }
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Send(envelope)) => {
                        let _ = write.send(Message::text(encode_generic(&envelope))).await;
                        let _ = events.send(SessionEvent::Sent);
                    }
                    Some(SessionCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn encode_handshake(envelope: &Envelope) -> String {
    encode_generic(envelope)
}

fn encode_ping(envelope: &Envelope) -> String {
    encode_generic(envelope)
}

fn encode_pong(envelope: &Envelope) -> String {
    encode_generic(envelope)
}

/// Serializes an [`Envelope`] back to its wire shape. The inverse of
/// [`crate::envelope::parse_envelope`]; kept in this module since only the
/// session manager ever needs to emit frames.
fn encode_generic(envelope: &Envelope) -> String {
    let common = envelope.common();
    let mut map = serde_json::Map::new();
    map.insert("type".to_string(), Value::String(envelope.type_name().to_string()));
    map.insert("eventId".to_string(), Value::String(common.event_id.clone()));
    map.insert("clientId".to_string(), Value::String(common.client_id.clone()));
    map.insert("occurredAt".to_string(), Value::String(common.occurred_at.clone()));
    map.insert("schemaVersion".to_string(), Value::String(common.schema_version.clone()));
    if let Some(k) = &common.idempotency_key {
        map.insert("idempotencyKey".to_string(), Value::String(k.clone()));
    }
    if let Some(c) = &common.correlation_id {
        map.insert("correlationId".to_string(), Value::String(c.clone()));
    }
    match envelope {
        Envelope::Handshake(_, body) => {
            map.insert("sessionId".to_string(), Value::String(body.session_id.clone()));
            map.insert("token".to_string(), Value::String(body.token.clone()));
            map.insert(
                "capabilities".to_string(),
                Value::Array(body.capabilities.iter().cloned().map(Value::String).collect()),
            );
        }
        Envelope::Action(_, body) => {
            map.insert("op".to_string(), Value::String(body.op.clone()));
            map.insert("target".to_string(), Value::String(body.target.clone()));
            map.insert("payload".to_string(), body.payload.clone());
            map.insert("idempotencyKey".to_string(), Value::String(body.idempotency_key.clone()));
        }
        Envelope::Ack(_, body) => {
            map.insert("correlationId".to_string(), Value::String(body.correlation_id.clone()));
            map.insert("status".to_string(), Value::String(body.status.as_wire().to_string()));
            if let Some(r) = &body.reason {
                map.insert("reason".to_string(), Value::String(r.clone()));
            }
            if let Some(l) = body.legacy_status {
                map.insert("legacyStatus".to_string(), Value::String(l.as_wire().to_string()));
            }
        }
        Envelope::HeartbeatPong(_, correlation_id) => {
            map.insert("correlationId".to_string(), Value::String(correlation_id.clone()));
        }
        Envelope::HandshakeAck(..) | Envelope::Error(..) | Envelope::HeartbeatPing(..) => {}
    }
    Value::Object(map).to_string()
}
