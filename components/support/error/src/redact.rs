/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Functions to redact strings before they reach a log line or the debug
//! timeline. Token values and full URLs must never appear verbatim.

/// Redact a URL, replacing all characters other than [`:`, `/`] with `x`.
pub fn redact_url(url: &str) -> String {
    url.replace(|ch| ch != ':' && ch != '/', "x")
}

/// Redact a bearer-style token, keeping only its length observable.
pub fn redact_token(token: &str) -> String {
    format!("<redacted:{}>", token.len())
}
