//! Whitelist checks for editable parameters.

use std::fmt;

use crate::state::DataType;
use crate::validation::rules::RuleSet;

/// An editable value rejected by a rule.
///
/// Recoverable: the caller may re-render the form with the error attached
/// to the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableViolation {
    url: String,
    parameter: String,
    value: String,
    rule: String,
}

impl EditableViolation {
    /// Returns the request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the rejected parameter.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// Returns the rejected value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the name of the rule that rejected the value.
    pub fn rule(&self) -> &str {
        &self.rule
    }
}

impl fmt::Display for EditableViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value of '{}' rejected by rule '{}'",
            self.parameter, self.rule
        )
    }
}

/// Checks every value of one editable parameter.
///
/// Stops at the first value failing any selected rule. No selected rule
/// means the parameter is unrestricted.
pub(crate) fn check(
    rules: &RuleSet,
    url: &str,
    parameter: &str,
    values: &[String],
    data_type: Option<DataType>,
) -> Option<EditableViolation> {
    let selected = rules.select(url, parameter, data_type);
    if selected.is_empty() {
        return None;
    }

    for value in values {
        if let Some(rule) = selected.iter().find(|rule| !rule.accepts(value)) {
            return Some(EditableViolation {
                url: url.to_string(),
                parameter: parameter.to_string(),
                value: value.clone(),
                rule: rule.name().to_string(),
            });
        }
    }
    None
}
