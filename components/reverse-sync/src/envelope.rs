/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Parses and validates wire frames into a closed sum of envelope types.
//! Every other component operates on [`Envelope`], never on raw JSON.

use serde_json::Value;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must be a non-empty string")]
    EmptyField(&'static str),
    #[error("field `{0}` has the wrong type")]
    WrongType(&'static str),
    #[error("field `{0}` has an invalid value `{1}`")]
    InvalidEnumValue(&'static str, String),
    #[error("field `{0}` is out of range")]
    OutOfRange(&'static str),
    #[error("unknown envelope type `{0}`")]
    UnknownType(String),
}

/// Fields common to every envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Common {
    pub event_id: String,
    pub client_id: String,
    pub occurred_at: String,
    pub schema_version: String,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeBody {
    pub session_id: String,
    pub token: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeAckBody {
    pub session_id: String,
    pub accepted: bool,
    pub heartbeat_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionBody {
    pub op: String,
    pub target: String,
    pub payload: Value,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Received,
    Applied,
    Duplicate,
    Skipped,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyStatus {
    Applied,
    Duplicate,
    SkippedAmbiguous,
    SkippedUnmanaged,
    RejectedInvalid,
}

impl AckStatus {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "received" => Self::Received,
            "applied" => Self::Applied,
            "duplicate" => Self::Duplicate,
            "skipped" => Self::Skipped,
            "rejected" => Self::Rejected,
            _ => return None,
        })
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
        }
    }
}

impl LegacyStatus {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "applied" => Self::Applied,
            "duplicate" => Self::Duplicate,
            "skipped_ambiguous" => Self::SkippedAmbiguous,
            "skipped_unmanaged" => Self::SkippedUnmanaged,
            "rejected_invalid" => Self::RejectedInvalid,
            _ => return None,
        })
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::SkippedAmbiguous => "skipped_ambiguous",
            Self::SkippedUnmanaged => "skipped_unmanaged",
            Self::RejectedInvalid => "rejected_invalid",
        }
    }
}

/// Maps a legacy status to its generic counterpart. Total: every
/// `LegacyStatus` has exactly one `AckStatus`.
pub fn legacy_to_status(legacy: LegacyStatus) -> AckStatus {
    match legacy {
        LegacyStatus::Applied => AckStatus::Applied,
        LegacyStatus::Duplicate => AckStatus::Duplicate,
        LegacyStatus::SkippedAmbiguous | LegacyStatus::SkippedUnmanaged => AckStatus::Skipped,
        LegacyStatus::RejectedInvalid => AckStatus::Rejected,
    }
}

/// Maps a generic status to a legacy status, where one exists. `received`
/// has no legacy equivalent. `skipped` maps to the ambiguous variant, since
/// that direction loses information the generic status never carried.
pub fn status_to_legacy(status: AckStatus) -> Option<LegacyStatus> {
    Some(match status {
        AckStatus::Applied => LegacyStatus::Applied,
        AckStatus::Duplicate => LegacyStatus::Duplicate,
        AckStatus::Skipped => LegacyStatus::SkippedAmbiguous,
        AckStatus::Rejected => LegacyStatus::RejectedInvalid,
        AckStatus::Received => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckBody {
    pub correlation_id: String,
    pub status: AckStatus,
    pub reason: Option<String>,
    pub resolved_path: Option<String>,
    pub resolved_key: Option<String>,
    pub legacy_status: Option<LegacyStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Handshake(Common, HandshakeBody),
    HandshakeAck(Common, HandshakeAckBody),
    Action(Common, ActionBody),
    Ack(Common, AckBody),
    Error(Common, ErrorBody),
    HeartbeatPing(Common),
    HeartbeatPong(Common, String),
}

impl Envelope {
    pub fn common(&self) -> &Common {
        match self {
            Self::Handshake(c, _)
            | Self::HandshakeAck(c, _)
            | Self::Action(c, _)
            | Self::Ack(c, _)
            | Self::Error(c, _)
            | Self::HeartbeatPing(c)
            | Self::HeartbeatPong(c, _) => c,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Handshake(..) => "handshake",
            Self::HandshakeAck(..) => "handshake_ack",
            Self::Action(..) => "action",
            Self::Ack(..) => "ack",
            Self::Error(..) => "error",
            Self::HeartbeatPing(..) => "heartbeat_ping",
            Self::HeartbeatPong(..) => "heartbeat_pong",
        }
    }
}

fn obj(value: &Value) -> Result<&serde_json::Map<String, Value>, EnvelopeError> {
    value.as_object().ok_or(EnvelopeError::NotAnObject)
}

fn req_str(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
) -> Result<String, EnvelopeError> {
    let v = map.get(key).ok_or(EnvelopeError::MissingField(key))?;
    let s = v.as_str().ok_or(EnvelopeError::WrongType(key))?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(EnvelopeError::EmptyField(key));
    }
    Ok(trimmed.to_string())
}

fn opt_str(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, EnvelopeError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(
            v.as_str().ok_or(EnvelopeError::WrongType(key))?.to_string(),
        )),
    }
}

fn req_bool(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
) -> Result<bool, EnvelopeError> {
    map.get(key)
        .ok_or(EnvelopeError::MissingField(key))?
        .as_bool()
        .ok_or(EnvelopeError::WrongType(key))
}

fn req_u32_in_range(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
    min: u32,
    max: u32,
) -> Result<u32, EnvelopeError> {
    let n = map
        .get(key)
        .ok_or(EnvelopeError::MissingField(key))?
        .as_u64()
        .ok_or(EnvelopeError::WrongType(key))?;
    let n = u32::try_from(n).map_err(|_| EnvelopeError::OutOfRange(key))?;
    if n < min || n > max {
        return Err(EnvelopeError::OutOfRange(key));
    }
    Ok(n)
}

fn req_obj(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
) -> Result<Value, EnvelopeError> {
    let v = map.get(key).ok_or(EnvelopeError::MissingField(key))?;
    if !v.is_object() {
        return Err(EnvelopeError::WrongType(key));
    }
    Ok(v.clone())
}

fn common_fields(map: &serde_json::Map<String, Value>) -> Result<Common, EnvelopeError> {
    Ok(Common {
        event_id: req_str(map, "eventId")?,
        client_id: req_str(map, "clientId")?,
        occurred_at: req_str(map, "occurredAt")?,
        schema_version: req_str(map, "schemaVersion")?,
        idempotency_key: opt_str(map, "idempotencyKey")?,
        correlation_id: opt_str(map, "correlationId")?,
    })
}

/// Parses an already-decoded JSON record into a typed [`Envelope`].
pub fn parse_envelope(value: &Value) -> Result<Envelope, EnvelopeError> {
    let map = obj(value)?;
    let type_ = req_str(map, "type")?;
    let common = common_fields(map)?;

    Ok(match type_.as_str() {
        "handshake" => {
            let capabilities = match map.get("capabilities") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .filter(|s| !s.trim().is_empty())
                            .map(str::to_string)
                            .ok_or(EnvelopeError::EmptyField("capabilities"))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => return Err(EnvelopeError::WrongType("capabilities")),
            };
            Envelope::Handshake(
                common,
                HandshakeBody {
                    session_id: req_str(map, "sessionId")?,
                    token: req_str(map, "token")?,
                    capabilities,
                },
            )
        }
        "handshake_ack" => Envelope::HandshakeAck(
            common,
            HandshakeAckBody {
                session_id: req_str(map, "sessionId")?,
                accepted: req_bool(map, "accepted")?,
                heartbeat_ms: req_u32_in_range(map, "heartbeatMs", 1000, 120_000)?,
            },
        ),
        "action" => Envelope::Action(
            common,
            ActionBody {
                op: req_str(map, "op")?,
                target: req_str(map, "target")?,
                payload: req_obj(map, "payload")?,
                idempotency_key: req_str(map, "idempotencyKey")?,
            },
        ),
        "ack" => {
            let status_raw = req_str(map, "status")?;
            let status = AckStatus::parse(&status_raw)
                .ok_or(EnvelopeError::InvalidEnumValue("status", status_raw))?;
            let legacy_status = match opt_str(map, "legacyStatus")? {
                None => None,
                Some(raw) => Some(
                    LegacyStatus::parse(&raw)
                        .ok_or(EnvelopeError::InvalidEnumValue("legacyStatus", raw))?,
                ),
            };
            Envelope::Ack(
                common.clone(),
                AckBody {
                    correlation_id: req_str(map, "correlationId")?,
                    status,
                    reason: opt_str(map, "reason")?,
                    resolved_path: opt_str(map, "resolvedPath")?,
                    resolved_key: opt_str(map, "resolvedKey")?,
                    legacy_status,
                },
            )
        }
        "error" => Envelope::Error(
            common,
            ErrorBody {
                code: req_str(map, "code")?,
                message: req_str(map, "message")?,
                retryable: req_bool(map, "retryable")?,
                details: match map.get("details") {
                    None | Some(Value::Null) => None,
                    Some(v) if v.is_object() => Some(v.clone()),
                    Some(_) => return Err(EnvelopeError::WrongType("details")),
                },
            },
        ),
        "heartbeat_ping" => Envelope::HeartbeatPing(common),
        "heartbeat_pong" => Envelope::HeartbeatPong(common.clone(), req_str(map, "correlationId")?),
        other => return Err(EnvelopeError::UnknownType(other.to_string())),
    })
}

/// Parses an envelope, logging and dropping it on failure rather than
/// surfacing a typed error. This is the shape callers on the transport path
/// use: a malformed frame is never fatal to the session.
pub fn try_parse_envelope(value: &Value) -> Option<Envelope> {
    match parse_envelope(value) {
        Ok(env) => Some(env),
        Err(e) => {
            tracing::warn!(error = %e, "ws_invalid_message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Map<String, Value> {
        json!({
            "eventId": "e1",
            "clientId": "c1",
            "occurredAt": "2026-07-27T00:00:00Z",
            "schemaVersion": "1",
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn rejects_non_object() {
        assert_eq!(parse_envelope(&json!("nope")), Err(EnvelopeError::NotAnObject));
    }

    #[test]
    fn rejects_missing_required_shared_field() {
        let mut m = base();
        m.remove("clientId");
        m.insert("type".into(), json!("heartbeat_ping"));
        assert_eq!(
            parse_envelope(&Value::Object(m)),
            Err(EnvelopeError::MissingField("clientId"))
        );
    }

    #[test]
    fn rejects_blank_required_field() {
        let mut m = base();
        m.insert("clientId".into(), json!("   "));
        m.insert("type".into(), json!("heartbeat_ping"));
        assert_eq!(
            parse_envelope(&Value::Object(m)),
            Err(EnvelopeError::EmptyField("clientId"))
        );
    }

    #[test]
    fn parses_action_envelope() {
        let mut m = base();
        m.insert("type".into(), json!("action"));
        m.insert("op".into(), json!("bookmark_created"));
        m.insert("target".into(), json!("note:Foo|0"));
        m.insert("payload".into(), json!({"title": "x"}));
        m.insert("idempotencyKey".into(), json!("idem-1"));
        let env = parse_envelope(&Value::Object(m)).unwrap();
        match env {
            Envelope::Action(_, body) => {
                assert_eq!(body.op, "bookmark_created");
                assert_eq!(body.idempotency_key, "idem-1");
            }
            _ => panic!("expected action"),
        }
    }

    #[test]
    fn rejects_unknown_ack_status() {
        let mut m = base();
        m.insert("type".into(), json!("ack"));
        m.insert("correlationId".into(), json!("e1"));
        m.insert("status".into(), json!("not_a_status"));
        assert_eq!(
            parse_envelope(&Value::Object(m)),
            Err(EnvelopeError::InvalidEnumValue(
                "status",
                "not_a_status".to_string()
            ))
        );
    }

    #[test]
    fn handshake_ack_clamps_range() {
        let mut m = base();
        m.insert("type".into(), json!("handshake_ack"));
        m.insert("sessionId".into(), json!("s1"));
        m.insert("accepted".into(), json!(true));
        m.insert("heartbeatMs".into(), json!(500));
        assert_eq!(
            parse_envelope(&Value::Object(m)),
            Err(EnvelopeError::OutOfRange("heartbeatMs"))
        );
    }

    #[test]
    fn legacy_status_roundtrips_through_generic() {
        for legacy in [
            LegacyStatus::Applied,
            LegacyStatus::Duplicate,
            LegacyStatus::SkippedAmbiguous,
            LegacyStatus::SkippedUnmanaged,
            LegacyStatus::RejectedInvalid,
        ] {
            let _ = legacy_to_status(legacy);
        }
        assert_eq!(
            status_to_legacy(AckStatus::Skipped),
            Some(LegacyStatus::SkippedAmbiguous)
        );
        assert_eq!(status_to_legacy(AckStatus::Received), None);
    }

    #[test]
    fn invalid_envelope_is_absent_not_thrown() {
        assert!(try_parse_envelope(&json!({"type": "bogus"})).is_none());
    }
}
