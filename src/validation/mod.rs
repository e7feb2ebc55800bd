//! The validation engine.
//!
//! Validation has two independent parts:
//!
//! 1. **Integrity.** The token names the [`State`] the response emitted.
//!    Every non-editable parameter of the request must carry only values
//!    recorded in that state. Any mismatch is an attack and rejects the
//!    request with an [`IntegrityViolation`].
//! 2. **Editable whitelisting.** Free-text parameters are checked against
//!    the configured [`RuleSet`](rules::RuleSet). Failures are collected
//!    per field as [`EditableViolation`]s and the request may be re-rendered.
//!
//! Neither part returns `Err`: a tampered request is an expected input, so
//! the outcome is data in a [`ValidationResult`].

mod editable;
mod integrity;
pub mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use editable::EditableViolation;
pub use integrity::{IntegrityViolation, PUBLIC_MESSAGE};

use crate::cache::PageCache;
use crate::cipher::CipherKey;
use crate::config::GuardConfig;
use crate::http::HttpMethod;
use crate::logging::GuardLog;
use crate::scope::Scope;
use crate::session::Session;
use crate::state::State;
use crate::token::{self, StateToken, TokenBody};

/// A request as seen by the validation engine.
///
/// # Examples
///
/// ```
/// use tamper_guard::{HttpMethod, InboundRequest};
///
/// let request = InboundRequest::new(HttpMethod::Get, "/test.do")
///     .param("p1", "2")
///     .param("tag", "a")
///     .param("tag", "b");
///
/// assert_eq!(request.values("tag"), &["a".to_string(), "b".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    method: HttpMethod,
    path: String,
    parameters: BTreeMap<String, Vec<String>>,
}

impl InboundRequest {
    /// Creates a request without parameters.
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    /// Appends one value of a parameter.
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.push_param(name, value);
        self
    }

    pub(crate) fn push_param(&mut self, name: &str, value: &str) {
        self.parameters
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Returns the request method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the request path, without query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns every submitted value of a parameter.
    pub fn values(&self, name: &str) -> &[String] {
        self.parameters.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns all parameters.
    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }
}

/// A request that passed the integrity check.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    state: Option<Arc<State>>,
    parameters: BTreeMap<String, Vec<String>>,
    field_errors: Vec<EditableViolation>,
}

impl ValidatedRequest {
    /// Returns the state the request was checked against.
    ///
    /// `None` for a start page requested without a token.
    pub fn state(&self) -> Option<&State> {
        self.state.as_deref()
    }

    /// Returns the first value of a parameter, with placeholders restored.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Returns every value of a parameter, with placeholders restored.
    pub fn values(&self, name: &str) -> &[String] {
        self.parameters.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns all parameters, with placeholders restored.
    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }

    /// Returns the editable values rejected by a rule.
    pub fn field_errors(&self) -> &[EditableViolation] {
        &self.field_errors
    }
}

/// Outcome of validating one request.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// Integrity holds; editable field errors may still be present
    Passed(ValidatedRequest),
    /// The request was tampered with or carries an unknown state
    Tampered(IntegrityViolation),
}

impl ValidationResult {
    /// Returns true if integrity holds and no editable value was rejected.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Passed(request) if request.field_errors.is_empty())
    }

    /// Returns the integrity violation, if any.
    pub fn violation(&self) -> Option<&IntegrityViolation> {
        match self {
            Self::Tampered(violation) => Some(violation),
            Self::Passed(_) => None,
        }
    }

    /// Returns the validated request, if integrity holds.
    pub fn request(&self) -> Option<&ValidatedRequest> {
        match self {
            Self::Passed(request) => Some(request),
            Self::Tampered(_) => None,
        }
    }

    /// Returns the editable field errors, empty if tampered.
    pub fn field_errors(&self) -> &[EditableViolation] {
        self.request().map_or(&[], ValidatedRequest::field_errors)
    }
}

/// Validates inbound requests against their states.
///
/// Constructed explicitly from the configuration, the application cache and
/// the application key. Session-owned caches and keys come from the
/// [`Session`] passed to each call.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'g> {
    config: &'g GuardConfig,
    application_pages: &'g PageCache,
    application_key: &'g CipherKey,
}

impl<'g> Validator<'g> {
    /// Creates a validator.
    pub fn new(
        config: &'g GuardConfig,
        application_pages: &'g PageCache,
        application_key: &'g CipherKey,
    ) -> Self {
        Self {
            config,
            application_pages,
            application_key,
        }
    }

    /// Validates one request of `session`.
    ///
    /// Integrity failures short-circuit. Editable failures accumulate across
    /// every field.
    pub fn validate(&self, session: &Session, request: &InboundRequest) -> ValidationResult {
        let log = GuardLog::new(session.id(), request.path());
        let token_name = session.state_parameter_name();

        let mut parameters = request.parameters().clone();
        let token = parameters.remove(token_name);

        let outcome = match token.as_deref() {
            Some([token]) => self
                .resolve(session, token)
                .and_then(|state| {
                    integrity::check(self.config, &state, request.path(), &parameters)
                        .map(|restored| (Some(state), restored))
                }),
            Some(values) => Err(IntegrityViolation::MalformedToken {
                token: values.join(","),
            }),
            None if self.config.is_start_page(request.path()) => Ok((None, parameters)),
            None => Err(IntegrityViolation::MissingState),
        };

        let (state, parameters) = match outcome {
            Ok(pair) => pair,
            Err(violation) => {
                log.integrity_violation(&violation);
                return ValidationResult::Tampered(violation);
            }
        };

        let field_errors = self.check_editable(&log, state.as_deref(), request.path(), &parameters);
        log.debug(format_args!(
            "validated {} parameters, {} field errors",
            parameters.len(),
            field_errors.len()
        ));

        ValidationResult::Passed(ValidatedRequest {
            state,
            parameters,
            field_errors,
        })
    }

    /// Finds the state a token names.
    fn resolve(&self, session: &Session, raw: &str) -> Result<Arc<State>, IntegrityViolation> {
        let token = StateToken::parse(raw).map_err(|_| IntegrityViolation::MalformedToken {
            token: raw.to_string(),
        })?;
        let expired = || IntegrityViolation::ExpiredOrTamperedState {
            token: raw.to_string(),
        };

        let scope = token.scope();
        let state = match token.body() {
            TokenBody::Memory {
                page_id,
                state_index,
                nonce,
            } => {
                let cache = session.cache(scope).unwrap_or(self.application_pages);
                let page = cache.page(*page_id).ok_or_else(expired)?;
                if page.nonce() != nonce.as_str() {
                    return Err(expired());
                }
                page.state(*state_index).cloned().ok_or_else(expired)?
            }
            TokenBody::Cipher { payload } => {
                let key = match scope {
                    Scope::Application => self.application_key,
                    Scope::Page | Scope::UserSession => session.key(),
                };
                let sealed = token::open(payload, key).map_err(|_| expired())?;
                if sealed.scope != scope {
                    return Err(expired());
                }
                Arc::new(sealed.state)
            }
        };

        // A page is stored in every scope cache its states use, so the
        // prefix must match the state's own scope.
        if state.scope() != scope {
            return Err(expired());
        }
        Ok(state)
    }

    fn check_editable(
        &self,
        log: &GuardLog<'_>,
        state: Option<&State>,
        url: &str,
        parameters: &BTreeMap<String, Vec<String>>,
    ) -> Vec<EditableViolation> {
        if !self.config.editable_validation() {
            return Vec::new();
        }

        let mut errors = Vec::new();
        for (name, values) in parameters {
            if self.config.is_exempt_parameter(url, name) {
                continue;
            }
            // Without a state, or without a declaration in it, a parameter
            // is treated as editable.
            let data_type = match state.and_then(|s| s.parameter(name)) {
                None => None,
                Some(param) if param.is_editable() => param.data_type(),
                Some(_) => continue,
            };
            if let Some(violation) =
                editable::check(self.config.rules(), url, name, values, data_type)
            {
                log.editable_rejected(&violation);
                errors.push(violation);
            }
        }
        errors
    }
}
