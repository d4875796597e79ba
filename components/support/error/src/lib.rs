/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Shared error-handling conventions: converting internal errors to public
//! ones with a documented logging/reporting disposition, a bounded
//! breadcrumb timeline, and PII redaction helpers.

pub mod breadcrumbs;
pub mod handling;
pub mod redact;

pub use breadcrumbs::{Breadcrumb, Timeline};
pub use handling::{convert_log_report_error, ErrorHandling, ErrorReporting, GetErrorHandling};
pub use redact::{redact_token, redact_url};
