/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Bridge configuration: profiles, persistence, and active-profile
//! resolution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::kv::KeyValueStore;

/// The KV key the bridge configuration is persisted under, distinct from
/// [`crate::state::STATE_KEY`].
pub const CONFIG_KEY: &str = "reverse_sync_bridge_config";

const PRIORITY_MIN: i32 = -1000;
const PRIORITY_MAX: i32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub url: String,
    #[serde(rename = "wsUrl")]
    pub ws_url: String,
    pub token: String,
    pub enabled: bool,
    pub priority: i32,
}

impl Profile {
    pub fn new(
        client_id: impl Into<String>,
        url: impl Into<String>,
        ws_url: impl Into<String>,
        token: impl Into<String>,
        enabled: bool,
        priority: i32,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            url: url.into(),
            ws_url: ws_url.into(),
            token: token.into(),
            enabled,
            priority: priority.clamp(PRIORITY_MIN, PRIORITY_MAX),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    #[serde(rename = "autoSync")]
    pub auto_sync: bool,
    #[serde(rename = "activeClientId")]
    pub active_client_id: String,
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no usable bridge profile is configured or enabled")]
pub struct ProfileDisabled;

/// Resolution order: the enabled profile whose `clientId` matches
/// `activeClientId`; else the highest-priority enabled profile (ties
/// broken by declaration order); else the first profile regardless of
/// `enabled`. Returns [`ProfileDisabled`] when there are no profiles at
/// all, or the resolved profile is disabled.
pub fn resolve_active_profile(config: &BridgeConfig) -> Result<&Profile, ProfileDisabled> {
    if config.profiles.is_empty() {
        return Err(ProfileDisabled);
    }
    if let Some(active) = config
        .profiles
        .iter()
        .find(|p| p.enabled && p.client_id == config.active_client_id)
    {
        return Ok(active);
    }
    // `Iterator::max_by_key` keeps the *last* of equal maxima, but ties here
    // are documented to resolve to the earliest-declared profile, so the
    // comparison is written out rather than reaching for that adapter.
    let mut best: Option<&Profile> = None;
    for p in config.profiles.iter().filter(|p| p.enabled) {
        if best.map(|b| p.priority > b.priority).unwrap_or(true) {
            best = Some(p);
        }
    }
    if let Some(best) = best {
        return Ok(best);
    }
    let first = &config.profiles[0];
    if first.enabled {
        Ok(first)
    } else {
        Err(ProfileDisabled)
    }
}

pub async fn get_bridge_config(kv: &impl KeyValueStore) -> BridgeConfig {
    match kv.get(CONFIG_KEY).await {
        Some(raw) => serde_json::from_value(raw).unwrap_or_default(),
        None => BridgeConfig::default(),
    }
}

pub async fn set_bridge_config(kv: &impl KeyValueStore, config: &BridgeConfig) {
    let value: Value = serde_json::to_value(config).expect("BridgeConfig always serializes");
    kv.set(CONFIG_KEY, value).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(client_id: &str, enabled: bool, priority: i32) -> Profile {
        Profile::new(client_id, "http://x", "ws://x", "tok", enabled, priority)
    }

    #[test]
    fn no_profiles_is_disabled() {
        let config = BridgeConfig::default();
        assert_eq!(resolve_active_profile(&config), Err(ProfileDisabled));
    }

    #[test]
    fn active_client_id_wins_when_enabled() {
        let config = BridgeConfig {
            auto_sync: true,
            active_client_id: "b".to_string(),
            profiles: vec![profile("a", true, 100), profile("b", true, 1)],
        };
        assert_eq!(resolve_active_profile(&config).unwrap().client_id, "b");
    }

    #[test]
    fn falls_back_to_highest_priority_enabled() {
        let config = BridgeConfig {
            auto_sync: true,
            active_client_id: "missing".to_string(),
            profiles: vec![profile("a", true, 5), profile("b", true, 50)],
        };
        assert_eq!(resolve_active_profile(&config).unwrap().client_id, "b");
    }

    #[test]
    fn falls_back_to_first_profile_even_if_disabled_then_reports_disabled() {
        let config = BridgeConfig {
            auto_sync: false,
            active_client_id: "missing".to_string(),
            profiles: vec![profile("a", false, 0), profile("b", false, 0)],
        };
        assert_eq!(resolve_active_profile(&config), Err(ProfileDisabled));
    }

    #[test]
    fn equal_priority_ties_favor_the_earlier_declared_profile() {
        let config = BridgeConfig {
            auto_sync: true,
            active_client_id: "missing".to_string(),
            profiles: vec![profile("a", true, 10), profile("b", true, 10)],
        };
        assert_eq!(resolve_active_profile(&config).unwrap().client_id, "a");
    }

    #[test]
    fn priority_is_clamped_on_construction() {
        let over = Profile::new("a", "u", "w", "t", true, 5000);
        let under = Profile::new("a", "u", "w", "t", true, -5000);
        assert_eq!(over.priority, 1000);
        assert_eq!(under.priority, -1000);
    }
}
