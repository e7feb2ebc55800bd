//! Guard configuration.
//!
//! Settings are collected in a [`GuardSettings`] value, either through the
//! chained [`GuardConfigBuilder`] or deserialized from JSON, and compiled
//! into an immutable [`GuardConfig`]. Every pattern is compiled at build
//! time, so a bad pattern fails at startup and never at request time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::pattern::{any_matches, Pattern};
use crate::validation::rules::{builtin_default_rules, RuleSet, RuleSpec, ValidationRule};

/// Default name of the request parameter carrying the state token.
pub const DEFAULT_STATE_PARAMETER: &str = "_STATE_";

/// Default number of pages retained per session.
pub const DEFAULT_MAX_PAGES_PER_SESSION: usize = 5;

/// Error returned when settings are inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigError {}

/// How states travel between response and request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// States stay in server-side caches; tokens only name them
    #[default]
    Memory,
    /// States are sealed into the token itself
    Cipher,
}

/// Parameters exempt from integrity checks on matching URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptionSpec {
    /// URL pattern
    pub url: String,
    /// Parameter-name patterns exempt on that URL
    pub parameters: Vec<String>,
}

/// Raw, uncompiled settings.
///
/// Every field has a default, so a JSON document only needs to name the
/// settings it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Pages retained in each session's default cache
    pub max_pages_per_session: usize,
    /// Replace non-editable values with placeholders in responses
    pub confidentiality: bool,
    /// Memory or cipher tokens
    pub strategy: Strategy,
    /// Name of the request parameter carrying the token
    pub state_parameter_name: String,
    /// Give every session its own random token parameter name
    pub random_state_parameter_name: bool,
    /// URL patterns that may be requested without a token
    pub start_pages: Vec<String>,
    /// Parameter-name patterns never checked for integrity
    pub start_parameters: Vec<String>,
    /// Per-URL parameter exemptions
    pub parameters_without_validation: Vec<ExemptionSpec>,
    /// Treat parameters absent from the state as tampering
    pub reject_undeclared_parameters: bool,
    /// Run whitelist rules against editable parameters
    pub editable_validation: bool,
    /// Append the built-in script-injection rejections to the default bucket
    pub builtin_default_rules: bool,
    /// Ordered editable rules
    pub rules: Vec<RuleSpec>,
    /// Rules of the pattern-less default bucket
    pub default_rules: Vec<RuleSpec>,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            max_pages_per_session: DEFAULT_MAX_PAGES_PER_SESSION,
            confidentiality: true,
            strategy: Strategy::Memory,
            state_parameter_name: DEFAULT_STATE_PARAMETER.to_string(),
            random_state_parameter_name: false,
            start_pages: Vec::new(),
            start_parameters: Vec::new(),
            parameters_without_validation: Vec::new(),
            reject_undeclared_parameters: true,
            editable_validation: true,
            builtin_default_rules: false,
            rules: Vec::new(),
            default_rules: Vec::new(),
        }
    }
}

/// Compiled, immutable configuration consumed by the guard.
///
/// # Examples
///
/// ```
/// use tamper_guard::{GuardConfig, RuleSpec, Strategy};
///
/// let config = GuardConfig::builder()
///     .max_pages_per_session(10)
///     .strategy(Strategy::Cipher)
///     .start_page("/login.do")
///     .rule(RuleSpec::accept("digits", "[0-9]*").parameter("qty"))
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(config.max_pages_per_session(), 10);
/// assert!(config.is_start_page("/login.do"));
/// ```
#[derive(Debug, Clone)]
pub struct GuardConfig {
    max_pages_per_session: usize,
    confidentiality: bool,
    strategy: Strategy,
    state_parameter_name: String,
    random_state_parameter_name: bool,
    start_pages: Vec<Pattern>,
    start_parameters: Vec<Pattern>,
    parameters_without_validation: Vec<(Pattern, Vec<Pattern>)>,
    reject_undeclared_parameters: bool,
    editable_validation: bool,
    rules: RuleSet,
}

impl GuardConfig {
    /// Starts a builder from default settings.
    pub fn builder() -> GuardConfigBuilder {
        GuardConfigBuilder {
            settings: GuardSettings::default(),
        }
    }

    /// Compiles settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for inconsistent settings and
    /// `Error::Pattern` for a pattern that does not compile.
    pub fn from_settings(settings: GuardSettings) -> Result<Self, Error> {
        if settings.max_pages_per_session == 0 {
            return Err(ConfigError::new("max_pages_per_session must be at least 1").into());
        }
        let name = &settings.state_parameter_name;
        if name.is_empty() || name.contains(['&', '=', '?', '#']) {
            return Err(ConfigError::new(format!("invalid state parameter name '{}'", name)).into());
        }

        let mut compiled = Vec::with_capacity(settings.rules.len() + settings.default_rules.len());
        for spec in &settings.rules {
            compiled.push(ValidationRule::compile(spec)?);
        }
        for spec in &settings.default_rules {
            if spec.url.is_some() {
                return Err(ConfigError::new(format!(
                    "default rule '{}' must not carry a URL pattern",
                    spec.name
                ))
                .into());
            }
            compiled.push(ValidationRule::compile(spec)?);
        }
        if settings.builtin_default_rules {
            for spec in builtin_default_rules() {
                compiled.push(ValidationRule::compile(&spec)?);
            }
        }

        let mut exemptions = Vec::with_capacity(settings.parameters_without_validation.len());
        for spec in &settings.parameters_without_validation {
            exemptions.push((
                Pattern::compile(&spec.url)?,
                Pattern::compile_all(&spec.parameters)?,
            ));
        }

        Ok(Self {
            start_pages: Pattern::compile_all(&settings.start_pages)?,
            start_parameters: Pattern::compile_all(&settings.start_parameters)?,
            parameters_without_validation: exemptions,
            rules: RuleSet::new(compiled),
            ..Self::without_patterns(&settings)
        })
    }

    /// Copies the flag-like settings and leaves every pattern list empty.
    fn without_patterns(settings: &GuardSettings) -> Self {
        Self {
            max_pages_per_session: settings.max_pages_per_session,
            confidentiality: settings.confidentiality,
            strategy: settings.strategy,
            state_parameter_name: settings.state_parameter_name.clone(),
            random_state_parameter_name: settings.random_state_parameter_name,
            start_pages: Vec::new(),
            start_parameters: Vec::new(),
            parameters_without_validation: Vec::new(),
            reject_undeclared_parameters: settings.reject_undeclared_parameters,
            editable_validation: settings.editable_validation,
            rules: RuleSet::default(),
        }
    }

    /// Parses and compiles a JSON settings document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the document is not valid settings JSON,
    /// plus every error [`from_settings`](Self::from_settings) can return.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let settings: GuardSettings = serde_json::from_str(json)
            .map_err(|e| ConfigError::new(format!("invalid settings document: {}", e)))?;
        Self::from_settings(settings)
    }

    /// Returns the per-session page bound.
    pub fn max_pages_per_session(&self) -> usize {
        self.max_pages_per_session
    }

    /// Returns true if non-editable values are hidden behind placeholders.
    pub fn confidentiality(&self) -> bool {
        self.confidentiality
    }

    /// Returns the token strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Returns the configured token parameter name.
    pub fn state_parameter_name(&self) -> &str {
        &self.state_parameter_name
    }

    /// Returns true if sessions pick a random token parameter name.
    pub fn random_state_parameter_name(&self) -> bool {
        self.random_state_parameter_name
    }

    /// Returns true if requests to `url` need no token.
    pub fn is_start_page(&self, url: &str) -> bool {
        any_matches(&self.start_pages, url)
    }

    /// Returns true if `parameter` on `url` skips the integrity check.
    pub fn is_exempt_parameter(&self, url: &str, parameter: &str) -> bool {
        if any_matches(&self.start_parameters, parameter) {
            return true;
        }
        self.parameters_without_validation
            .iter()
            .any(|(url_pattern, params)| url_pattern.matches(url) && any_matches(params, parameter))
    }

    /// Returns true if undeclared parameters are treated as tampering.
    pub fn reject_undeclared_parameters(&self) -> bool {
        self.reject_undeclared_parameters
    }

    /// Returns true if editable whitelist validation is enabled.
    pub fn editable_validation(&self) -> bool {
        self.editable_validation
    }

    /// Returns the compiled editable rules.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

impl Default for GuardConfig {
    /// Equivalent to compiling [`GuardSettings::default`], which carries no
    /// patterns.
    fn default() -> Self {
        Self::without_patterns(&GuardSettings::default())
    }
}

/// Chained builder for [`GuardConfig`].
#[derive(Debug, Clone)]
pub struct GuardConfigBuilder {
    settings: GuardSettings,
}

impl GuardConfigBuilder {
    /// Sets how many pages each session retains.
    pub fn max_pages_per_session(mut self, max: usize) -> Self {
        self.settings.max_pages_per_session = max;
        self
    }

    /// Enables or disables confidential placeholders.
    pub fn confidentiality(mut self, enabled: bool) -> Self {
        self.settings.confidentiality = enabled;
        self
    }

    /// Selects the token strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.settings.strategy = strategy;
        self
    }

    /// Sets the token parameter name.
    pub fn state_parameter_name(mut self, name: &str) -> Self {
        self.settings.state_parameter_name = name.to_string();
        self
    }

    /// Gives every session a random token parameter name.
    pub fn random_state_parameter_name(mut self, enabled: bool) -> Self {
        self.settings.random_state_parameter_name = enabled;
        self
    }

    /// Adds a URL pattern that may be requested without a token.
    pub fn start_page(mut self, pattern: &str) -> Self {
        self.settings.start_pages.push(pattern.to_string());
        self
    }

    /// Adds a parameter-name pattern exempt from integrity checks everywhere.
    pub fn start_parameter(mut self, pattern: &str) -> Self {
        self.settings.start_parameters.push(pattern.to_string());
        self
    }

    /// Exempts parameters matching `parameters` on URLs matching `url`.
    pub fn parameters_without_validation(mut self, url: &str, parameters: &[&str]) -> Self {
        self.settings.parameters_without_validation.push(ExemptionSpec {
            url: url.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    /// Chooses whether undeclared parameters are tampering.
    pub fn reject_undeclared_parameters(mut self, reject: bool) -> Self {
        self.settings.reject_undeclared_parameters = reject;
        self
    }

    /// Enables or disables editable whitelist validation.
    pub fn editable_validation(mut self, enabled: bool) -> Self {
        self.settings.editable_validation = enabled;
        self
    }

    /// Appends the built-in script-injection rejections to the default bucket.
    pub fn builtin_default_rules(mut self, enabled: bool) -> Self {
        self.settings.builtin_default_rules = enabled;
        self
    }

    /// Appends an editable rule.
    pub fn rule(mut self, spec: RuleSpec) -> Self {
        self.settings.rules.push(spec);
        self
    }

    /// Appends a rule to the pattern-less default bucket.
    pub fn default_rule(mut self, spec: RuleSpec) -> Self {
        self.settings.default_rules.push(spec);
        self
    }

    /// Compiles the configuration.
    ///
    /// # Errors
    ///
    /// See [`GuardConfig::from_settings`].
    pub fn build(self) -> Result<GuardConfig, Error> {
        GuardConfig::from_settings(self.settings)
    }
}
