//! The request filter placed in front of application handlers.

use crate::guard::Guard;
use crate::session::Session;
use crate::validation::{IntegrityViolation, ValidatedRequest, ValidationResult};

use super::ExtractRequest;

/// What the integration should do with a request.
#[derive(Debug, Clone)]
pub enum FilterDecision {
    /// Run the handler with the restored parameters
    Proceed(ValidatedRequest),
    /// Show the form again with the field errors attached
    Rerender(ValidatedRequest),
    /// Abort and show the generic error page
    Reject(IntegrityViolation),
}

impl FilterDecision {
    /// Returns the message to show the client on rejection.
    ///
    /// Never reveals which check failed.
    pub fn public_message(&self) -> Option<&'static str> {
        match self {
            Self::Reject(violation) => Some(violation.public_message()),
            Self::Proceed(_) | Self::Rerender(_) => None,
        }
    }
}

impl From<ValidationResult> for FilterDecision {
    fn from(result: ValidationResult) -> Self {
        match result {
            ValidationResult::Tampered(violation) => Self::Reject(violation),
            ValidationResult::Passed(request) if request.field_errors().is_empty() => {
                Self::Proceed(request)
            }
            ValidationResult::Passed(request) => Self::Rerender(request),
        }
    }
}

/// Validates every request before it reaches a handler.
///
/// # Examples
///
/// ```
/// use tamper_guard::web::{FilterDecision, RequestAdapter, ValidationFilter};
/// use tamper_guard::{Guard, GuardConfig, HttpMethod};
///
/// let guard = Guard::new(GuardConfig::default());
/// let session = guard.new_session("s-1");
/// let filter = ValidationFilter::new(&guard);
///
/// // No token and not a start page.
/// let adapter = RequestAdapter::from_uri(HttpMethod::Get, "/account.do?id=7").unwrap();
/// let decision = filter.filter(&session, &adapter);
///
/// assert!(matches!(decision, FilterDecision::Reject(_)));
/// assert!(decision.public_message().is_some());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ValidationFilter<'g> {
    guard: &'g Guard,
}

impl<'g> ValidationFilter<'g> {
    /// Creates a filter backed by `guard`.
    pub fn new(guard: &'g Guard) -> Self {
        Self { guard }
    }

    /// Validates one request of `session`.
    pub fn filter(&self, session: &Session, request: &impl ExtractRequest) -> FilterDecision {
        let request = request.extract_request();
        self.guard.validate(session, &request).into()
    }
}
