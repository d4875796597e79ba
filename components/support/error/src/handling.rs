/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Helpers for components to "handle" errors: decide how an internal
//! error should be logged, whether it should be pushed to the debug
//! timeline, and what it converts to at the public boundary.

use tracing::Level;

/// Describes what error reporting action should be taken.
#[derive(Debug, Default)]
pub struct ErrorReporting {
    /// If Some(level), emit a tracing event at that level.
    pub log_level: Option<Level>,
    /// If Some(report_class), the error is also pushed to the debug timeline
    /// under that class name.
    pub report_class: Option<String>,
}

/// Specifies how an "internal" error converts to an external, wire-visible
/// outcome, plus any logging/reporting that should happen alongside it.
pub struct ErrorHandling<E> {
    pub err: E,
    pub reporting: ErrorReporting,
}

impl<E> ErrorHandling<E> {
    pub fn passthrough(err: E) -> Self {
        Self {
            err,
            reporting: ErrorReporting::default(),
        }
    }

    pub fn log(err: E, level: Level) -> Self {
        Self {
            err,
            reporting: ErrorReporting {
                log_level: Some(level),
                ..Default::default()
            },
        }
    }

    pub fn report(err: E, level: Level, report_class: impl Into<String>) -> Self {
        Self {
            err,
            reporting: ErrorReporting {
                log_level: Some(level),
                report_class: Some(report_class.into()),
            },
        }
    }

    pub fn unexpected(err: E, report_class: Option<&str>) -> Self {
        Self::report(err, Level::ERROR, report_class.unwrap_or("unexpected"))
    }
}

/// A trait to define how errors are converted and reported.
pub trait GetErrorHandling {
    type ExternalError;

    fn get_error_handling(&self) -> ErrorHandling<Self::ExternalError>;
}

/// Handle the specified "internal" error: take any logging/reporting
/// action, push a breadcrumb if a report class is set, and return the
/// external error it converts to.
pub fn convert_log_report_error<IE, EE>(e: IE) -> EE
where
    IE: GetErrorHandling<ExternalError = EE> + std::error::Error,
    EE: std::error::Error,
{
    let handling = e.get_error_handling();
    let reporting = handling.reporting;
    if let Some(level) = reporting.log_level {
        match level {
            Level::ERROR => tracing::error!("{}", e),
            Level::WARN => tracing::warn!("{}", e),
            Level::INFO => tracing::info!("{}", e),
            Level::DEBUG => tracing::debug!("{}", e),
            Level::TRACE => tracing::trace!("{}", e),
        }
    }
    if let Some(report_class) = reporting.report_class {
        crate::breadcrumbs::push_global(report_class, e.to_string());
    }
    handling.err
}
