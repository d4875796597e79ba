/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The crate-level error aggregate and its disposition table (§7),
//! shaped after this corpus's top-level `SyncManagerError`: every
//! component's narrow error enum folds in here via `#[from]`, and the
//! disposition (log level, whether it's worth a report) is decided once,
//! centrally, through [`error_support::GetErrorHandling`].

use error_support::{ErrorHandling, GetErrorHandling};
use thiserror::Error;

use crate::bookmarks::BookmarkStoreError;
use crate::config::ProfileDisabled;
use crate::envelope::EnvelopeError;
use crate::http_fallback::TransportFailure;
use crate::inbound::ApplyError;
use crate::session::SessionError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("envelope: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("apply: {0}")]
    Apply(#[from] ApplyError),
    #[error("session: {0}")]
    Session(#[from] SessionError),
    #[error("bookmark store: {0}")]
    BookmarkStore(#[from] BookmarkStoreError),
    #[error("transport: {0}")]
    Transport(#[from] TransportFailure),
    #[error("bridge profile: {0}")]
    Profile(#[from] ProfileDisabled),
}

impl GetErrorHandling for Error {
    type ExternalError = String;

    fn get_error_handling(&self) -> ErrorHandling<Self::ExternalError> {
        use tracing::Level;
        let msg = self.to_string();
        match self {
            Self::Envelope(_) => ErrorHandling::report(msg, Level::WARN, "envelope_invalid"),
            Self::Apply(ApplyError::MissingField(_)) => {
                ErrorHandling::report(msg, Level::WARN, "apply_missing_field")
            }
            Self::Apply(ApplyError::StoreFailure(_)) => {
                ErrorHandling::report(msg, Level::ERROR, "apply_store_failure")
            }
            Self::Apply(ApplyError::UnsupportedOp(_)) => {
                ErrorHandling::report(msg, Level::WARN, "apply_unsupported_op")
            }
            Self::Session(SessionError::HandshakeTimeout) => {
                ErrorHandling::report(msg, Level::WARN, "handshake_timeout")
            }
            Self::Session(SessionError::ConstructorError(_)) => {
                ErrorHandling::report(msg, Level::ERROR, "session_constructor_error")
            }
            Self::BookmarkStore(_) => {
                ErrorHandling::report(msg, Level::ERROR, "bookmark_store_failure")
            }
            Self::Transport(_) => ErrorHandling::report(msg, Level::WARN, "transport_failure"),
            Self::Profile(_) => ErrorHandling::report(msg, Level::WARN, "profile_disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failure_reports_at_error_level() {
        let err = Error::Apply(ApplyError::StoreFailure("boom".to_string()));
        let handling = err.get_error_handling();
        assert_eq!(handling.reporting.log_level, Some(tracing::Level::ERROR));
        assert_eq!(
            handling.reporting.report_class.as_deref(),
            Some("apply_store_failure")
        );
    }

    #[test]
    fn envelope_invalid_reports_at_warn_level() {
        let err = Error::Envelope(EnvelopeError::NotAnObject);
        let handling = err.get_error_handling();
        assert_eq!(handling.reporting.log_level, Some(tracing::Level::WARN));
    }
}
