//! Request-bound logging for validation outcomes.

use std::fmt;

use crate::validation::{EditableViolation, IntegrityViolation};

/// A request-bound logging interface.
///
/// `GuardLog` carries the session id and request URL of the request being
/// validated and attaches both as structured fields to every event. It
/// borrows from the request, so it cannot outlive it.
///
/// Integrity violations are logged with full detail at `warn`; only the
/// generic [`public_message`](IntegrityViolation::public_message) ever
/// reaches the client.
#[derive(Debug, Clone, Copy)]
pub struct GuardLog<'a> {
    session_id: &'a str,
    url: &'a str,
}

impl<'a> GuardLog<'a> {
    /// Creates a logger bound to one request.
    pub(crate) fn new(session_id: &'a str, url: &'a str) -> Self {
        Self { session_id, url }
    }

    /// Returns the session id attached to every event.
    pub fn session_id(&self) -> &str {
        self.session_id
    }

    /// Returns the request URL attached to every event.
    pub fn url(&self) -> &str {
        self.url
    }

    /// Logs a detected integrity violation.
    pub fn integrity_violation(&self, violation: &IntegrityViolation) {
        tracing::warn!(
            session_id = %self.session_id,
            url = %self.url,
            parameter = violation.parameter().unwrap_or(""),
            "integrity violation: {}",
            violation
        );
    }

    /// Logs an editable value rejected by a rule.
    pub fn editable_rejected(&self, violation: &EditableViolation) {
        tracing::info!(
            session_id = %self.session_id,
            url = %self.url,
            parameter = violation.parameter(),
            rule = violation.rule(),
            value = violation.value(),
            "editable value rejected"
        );
    }

    /// Logs a debug-level message with the request fields.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(session_id = %self.session_id, url = %self.url, "{}", args);
    }
}
