//! Integrity checks for non-editable parameters.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::GuardConfig;
use crate::state::State;

/// Message shown to clients for every integrity violation.
///
/// Violations are never distinguished to the end user, so an expired session
/// and a forged token look the same from outside.
pub const PUBLIC_MESSAGE: &str = "The request could not be validated.";

/// A request that does not match what the server emitted.
///
/// Every variant is treated as an attack: the request is rejected and the
/// detail is only logged server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// The request carried no token and does not target a start page
    MissingState,
    /// The token could not be parsed
    MalformedToken {
        /// The submitted token
        token: String,
    },
    /// The token names a page or state that is not known, or failed to decrypt
    ExpiredOrTamperedState {
        /// The submitted token
        token: String,
    },
    /// The request targets a different action than the state was composed for
    ActionMismatch {
        /// Recorded action
        expected: String,
        /// Requested path
        actual: String,
    },
    /// A non-editable parameter carried a value that was never emitted
    ParameterTampered {
        /// Parameter name
        parameter: String,
        /// Offending submitted value
        submitted: String,
        /// Values recorded for the parameter
        expected: Vec<String>,
    },
    /// A non-editable parameter carried more values than were emitted
    TooManyValues {
        /// Parameter name
        parameter: String,
        /// Number of submitted values
        submitted: usize,
        /// Number of recorded values
        recorded: usize,
    },
    /// A parameter from a link query string was dropped
    RequiredParameterMissing {
        /// Parameter name
        parameter: String,
    },
    /// A parameter the state never declared was submitted
    UndeclaredParameter {
        /// Parameter name
        parameter: String,
    },
}

impl IntegrityViolation {
    /// Returns the generic message safe to show to the client.
    pub fn public_message(&self) -> &'static str {
        PUBLIC_MESSAGE
    }

    /// Returns the parameter the violation concerns, if any.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::ParameterTampered { parameter, .. }
            | Self::TooManyValues { parameter, .. }
            | Self::RequiredParameterMissing { parameter }
            | Self::UndeclaredParameter { parameter } => Some(parameter),
            Self::MissingState
            | Self::MalformedToken { .. }
            | Self::ExpiredOrTamperedState { .. }
            | Self::ActionMismatch { .. } => None,
        }
    }
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingState => write!(f, "missing state token"),
            Self::MalformedToken { token } => write!(f, "malformed state token '{}'", token),
            Self::ExpiredOrTamperedState { token } => {
                write!(f, "expired or tampered state '{}'", token)
            }
            Self::ActionMismatch { expected, actual } => {
                write!(f, "action mismatch: expected '{}', got '{}'", expected, actual)
            }
            Self::ParameterTampered {
                parameter,
                submitted,
                expected,
            } => write!(
                f,
                "parameter '{}' tampered: submitted '{}', expected one of {:?}",
                parameter, submitted, expected
            ),
            Self::TooManyValues {
                parameter,
                submitted,
                recorded,
            } => write!(
                f,
                "parameter '{}' has {} values, {} recorded",
                parameter, submitted, recorded
            ),
            Self::RequiredParameterMissing { parameter } => {
                write!(f, "required parameter '{}' missing", parameter)
            }
            Self::UndeclaredParameter { parameter } => {
                write!(f, "undeclared parameter '{}'", parameter)
            }
        }
    }
}

/// Checks a request's parameters against the state it carries.
///
/// Returns the parameters with every confidential placeholder replaced by
/// the value it stands for. Placeholders are only decoded when the guard runs
/// with confidentiality on. The token parameter is not part of the input.
pub(crate) fn check(
    config: &GuardConfig,
    state: &State,
    path: &str,
    parameters: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Vec<String>>, IntegrityViolation> {
    if state.action() != path {
        return Err(IntegrityViolation::ActionMismatch {
            expected: state.action().to_string(),
            actual: path.to_string(),
        });
    }

    let confidential = config.confidentiality();
    let mut restored = BTreeMap::new();
    for (name, submitted) in parameters {
        if config.is_exempt_parameter(path, name) {
            restored.insert(name.clone(), submitted.clone());
            continue;
        }

        let Some(param) = state.parameter(name) else {
            if config.reject_undeclared_parameters() {
                return Err(IntegrityViolation::UndeclaredParameter {
                    parameter: name.clone(),
                });
            }
            restored.insert(name.clone(), submitted.clone());
            continue;
        };

        if param.is_editable() {
            restored.insert(name.clone(), submitted.clone());
            continue;
        }

        if submitted.len() > param.values().len() {
            return Err(IntegrityViolation::TooManyValues {
                parameter: name.clone(),
                submitted: submitted.len(),
                recorded: param.values().len(),
            });
        }

        let mut values = Vec::with_capacity(submitted.len());
        for value in submitted {
            match param.resolve(value, confidential) {
                Some(original) => values.push(original.to_string()),
                None => {
                    return Err(IntegrityViolation::ParameterTampered {
                        parameter: name.clone(),
                        submitted: value.clone(),
                        expected: param.values().to_vec(),
                    })
                }
            }
        }
        restored.insert(name.clone(), values);
    }

    for param in state.parameters().filter(|p| p.is_required()) {
        if !parameters.contains_key(param.name()) && !config.is_exempt_parameter(path, param.name()) {
            return Err(IntegrityViolation::RequiredParameterMissing {
                parameter: param.name().to_string(),
            });
        }
    }

    Ok(restored)
}
