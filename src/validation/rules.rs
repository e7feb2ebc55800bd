//! Whitelist rules for editable parameters.
//!
//! Rules are grouped into buckets by URL pattern. Buckets with a URL pattern
//! are tried in declaration order before the pattern-less default bucket, and
//! the first bucket holding a rule that applies to the parameter wins.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::Error;
use crate::pattern::Pattern;
use crate::state::DataType;

/// Uncompiled form of a [`ValidationRule`], as written in configuration.
///
/// # Examples
///
/// ```
/// use tamper_guard::RuleSpec;
///
/// let spec = RuleSpec::accept("digits", "[0-9]{1,9}")
///     .url("/orders/.*")
///     .parameter("qty|count");
/// assert_eq!(spec.name, "digits");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Name reported when the rule rejects a value
    pub name: String,
    /// URL pattern, or `None` for the default bucket
    #[serde(default)]
    pub url: Option<String>,
    /// Parameter-name pattern, or `None` for every parameter
    #[serde(default)]
    pub parameter: Option<String>,
    /// Form control kinds the rule applies to; empty means all
    #[serde(default)]
    pub data_types: Vec<DataType>,
    /// Values must match this pattern
    #[serde(default)]
    pub accepted: Option<String>,
    /// Values must not match this pattern
    #[serde(default)]
    pub rejected: Option<String>,
}

impl RuleSpec {
    /// A rule that accepts only values matching `pattern`.
    pub fn accept(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            url: None,
            parameter: None,
            data_types: Vec::new(),
            accepted: Some(pattern.to_string()),
            rejected: None,
        }
    }

    /// A rule that rejects values matching `pattern`.
    pub fn reject(name: &str, pattern: &str) -> Self {
        Self {
            accepted: None,
            rejected: Some(pattern.to_string()),
            ..Self::accept(name, "")
        }
    }

    /// Restricts the rule to URLs matching `pattern`.
    pub fn url(mut self, pattern: &str) -> Self {
        self.url = Some(pattern.to_string());
        self
    }

    /// Restricts the rule to parameter names matching `pattern`.
    pub fn parameter(mut self, pattern: &str) -> Self {
        self.parameter = Some(pattern.to_string());
        self
    }

    /// Restricts the rule to the given control kinds.
    pub fn data_types(mut self, data_types: &[DataType]) -> Self {
        self.data_types = data_types.to_vec();
        self
    }
}

/// A compiled editable-value rule.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    name: String,
    url: Option<Pattern>,
    parameter: Option<Pattern>,
    data_types: Vec<DataType>,
    accepted: Option<Pattern>,
    rejected: Option<Pattern>,
}

impl ValidationRule {
    /// Compiles a rule.
    ///
    /// # Errors
    ///
    /// Returns `Error::Pattern` if any pattern is malformed, or
    /// `Error::Config` if the rule has neither an accepted nor a rejected
    /// pattern.
    pub fn compile(spec: &RuleSpec) -> Result<Self, Error> {
        if spec.accepted.is_none() && spec.rejected.is_none() {
            return Err(ConfigError::new(format!(
                "rule '{}' needs an accepted or rejected pattern",
                spec.name
            ))
            .into());
        }

        let compile = |source: &Option<String>| source.as_deref().map(Pattern::compile).transpose();

        Ok(Self {
            name: spec.name.clone(),
            url: compile(&spec.url)?,
            parameter: compile(&spec.parameter)?,
            data_types: spec.data_types.clone(),
            accepted: compile(&spec.accepted)?,
            rejected: compile(&spec.rejected)?,
        })
    }

    /// Returns the rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the URL pattern, if any.
    pub fn url(&self) -> Option<&Pattern> {
        self.url.as_ref()
    }

    /// Returns true if the rule governs this parameter and control kind.
    pub fn applies_to(&self, parameter: &str, data_type: Option<DataType>) -> bool {
        if let Some(pattern) = &self.parameter {
            if !pattern.matches(parameter) {
                return false;
            }
        }
        if self.data_types.is_empty() {
            return true;
        }
        data_type.is_some_and(|dt| self.data_types.contains(&dt))
    }

    /// Returns true if the value passes this rule.
    pub fn accepts(&self, value: &str) -> bool {
        if let Some(accepted) = &self.accepted {
            if !accepted.matches(value) {
                return false;
            }
        }
        if let Some(rejected) = &self.rejected {
            if rejected.matches(value) {
                return false;
            }
        }
        true
    }
}

/// Built-in default rules rejecting common script-injection markers.
pub fn builtin_default_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::reject("script-tag", r"(?is).*<\s*/?\s*script.*"),
        RuleSpec::reject("javascript-uri", r"(?is).*(javascript|vbscript)\s*:.*"),
        RuleSpec::reject(
            "event-handler",
            r"(?is).*\bon(load|error|click|dblclick|mouseover|mouseout|focus|blur|submit|change|keyup|keydown)\s*=.*",
        ),
    ]
}

/// Editable rules ordered for lookup.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    scoped: Vec<(Pattern, Vec<ValidationRule>)>,
    default: Vec<ValidationRule>,
}

impl RuleSet {
    /// Groups rules into URL buckets, keeping declaration order.
    pub fn new(rules: Vec<ValidationRule>) -> Self {
        let mut set = Self::default();
        for rule in rules {
            set.push(rule);
        }
        set
    }

    fn push(&mut self, rule: ValidationRule) {
        let Some(url) = rule.url.clone() else {
            self.default.push(rule);
            return;
        };
        match self.scoped.iter_mut().find(|(pattern, _)| *pattern == url) {
            Some((_, bucket)) => bucket.push(rule),
            None => self.scoped.push((url, vec![rule])),
        }
    }

    /// Returns the rules governing one parameter of one URL.
    ///
    /// The first URL bucket that matches `url` and holds at least one
    /// applicable rule wins; otherwise the default bucket is used. An empty
    /// result means the value is unrestricted.
    pub fn select(
        &self,
        url: &str,
        parameter: &str,
        data_type: Option<DataType>,
    ) -> Vec<&ValidationRule> {
        for (pattern, bucket) in &self.scoped {
            if !pattern.matches(url) {
                continue;
            }
            let hits: Vec<&ValidationRule> = bucket
                .iter()
                .filter(|rule| rule.applies_to(parameter, data_type))
                .collect();
            if !hits.is_empty() {
                return hits;
            }
        }

        self.default
            .iter()
            .filter(|rule| rule.applies_to(parameter, data_type))
            .collect()
    }

    /// Returns the total number of rules.
    pub fn len(&self) -> usize {
        self.default.len() + self.scoped.iter().map(|(_, b)| b.len()).sum::<usize>()
    }

    /// Returns true if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
