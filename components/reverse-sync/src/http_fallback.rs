/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The legacy HTTP fallback transport: `POST <bridge>/reverse-sync`. Used
//! by the flush path (§4.F) when no WebSocket session is `connected`, kept
//! for interoperability with bridges that haven't adopted the WS protocol.
//! Shaped after a thin, owned HTTP client wrapping one base URL and one
//! token, the way this corpus's sync storage clients are built.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ack::{AckResult, AckResultStatus, BatchAckResponse};
use crate::config::Profile;
use crate::queue::ReverseEvent;

const TOKEN_HEADER: &str = "X-Project2Chrome-Token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("response body did not match the expected shape: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Serialize)]
struct ReverseSyncRequest<'a> {
    #[serde(rename = "batchId")]
    batch_id: &'a str,
    events: &'a [ReverseEvent],
    #[serde(rename = "sentAt")]
    sent_at: &'a str,
}

#[derive(Debug, Deserialize)]
struct AckResultWire {
    #[serde(rename = "eventId")]
    event_id: String,
    status: String,
    reason: Option<String>,
    #[serde(rename = "resolvedKey")]
    resolved_key: Option<String>,
    #[serde(rename = "resolvedPath")]
    resolved_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseSyncResponseWire {
    #[serde(rename = "batchId")]
    batch_id: String,
    results: Vec<AckResultWire>,
}

/// A thin client over one bridge base URL and one bearer-style token,
/// mirroring the shape of this corpus's storage clients: owned config, no
/// retry logic of its own (retry lives in the reverse queue, §4.F).
pub struct HttpFallbackClient {
    http: reqwest::Client,
}

impl HttpFallbackClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFallbackClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFallbackClient {
    pub async fn post_reverse_sync(
        &self,
        profile: &Profile,
        batch_id: &str,
        events: &[ReverseEvent],
        sent_at: &str,
    ) -> Result<BatchAckResponse, TransportFailure> {
        let url = format!("{}/reverse-sync", profile.url.trim_end_matches('/'));
        let body = ReverseSyncRequest {
            batch_id,
            events,
            sent_at,
        };
        let response = self
            .http
            .post(&url)
            .header(TOKEN_HEADER, &profile.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportFailure::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportFailure::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let wire: ReverseSyncResponseWire = response
            .json()
            .await
            .map_err(|e| TransportFailure::MalformedResponse(e.to_string()))?;

        Ok(BatchAckResponse {
            batch_id: wire.batch_id,
            results: wire
                .results
                .into_iter()
                .map(|r| AckResult {
                    event_id: r.event_id,
                    status: AckResultStatus::from_wire(&r.status),
                    reason: r.reason,
                    resolved_key: r.resolved_key,
                    resolved_path: r.resolved_path,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_header_name_matches_wire_contract() {
        assert_eq!(TOKEN_HEADER, "X-Project2Chrome-Token");
    }

    #[test]
    fn request_serializes_with_camel_case_wire_fields() {
        let events: Vec<ReverseEvent> = Vec::new();
        let req = ReverseSyncRequest {
            batch_id: "b1",
            events: &events,
            sent_at: "2026-07-27T00:00:00Z",
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["batchId"], "b1");
        assert_eq!(value["sentAt"], "2026-07-27T00:00:00Z");
    }

    #[test]
    fn wire_result_maps_unknown_status_through() {
        let wire = AckResultWire {
            event_id: "e1".to_string(),
            status: "mystery".to_string(),
            reason: None,
            resolved_key: None,
            resolved_path: None,
        };
        assert_eq!(
            AckResultStatus::from_wire(&wire.status),
            AckResultStatus::Unknown("mystery".to_string())
        );
    }
}
