//! Compiled URL and parameter patterns.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;

/// Error returned when a pattern fails to compile.
///
/// # Examples
///
/// ```
/// use tamper_guard::Pattern;
///
/// let err = Pattern::compile("/orders/(").unwrap_err();
/// assert_eq!(err.pattern(), "/orders/(");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pattern: String,
    message: String,
}

impl PatternError {
    /// Creates a new pattern error.
    pub fn new(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Returns the pattern source that failed to compile.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the compiler message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid pattern '{}': {}", self.pattern, self.message)
    }
}

impl std::error::Error for PatternError {}

/// A regular expression with whole-input match semantics.
///
/// `Pattern` anchors its source at both ends, so `/app/.*` matches
/// `/app/list` but `/app` does not match `/app/list`. Equality, ordering
/// and hashing use the source string only, which lets patterns key ordered
/// maps.
///
/// # Examples
///
/// ```
/// use tamper_guard::Pattern;
///
/// let pattern = Pattern::compile("/secure/.*").unwrap();
/// assert!(pattern.matches("/secure/account.do"));
/// assert!(!pattern.matches("/public/secure/account.do"));
/// ```
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns `PatternError` if the source is not a valid regular expression.
    pub fn compile(source: &str) -> Result<Self, PatternError> {
        let anchored = format!("^(?:{})$", source);
        let regex = Regex::new(&anchored).map_err(|e| PatternError::new(source, e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Compiles every source in order, stopping at the first failure.
    pub fn compile_all<I, S>(sources: I) -> Result<Vec<Self>, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        sources
            .into_iter()
            .map(|s| Self::compile(s.as_ref()))
            .collect()
    }

    /// Returns true if the whole input matches.
    pub fn matches(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    /// Returns the source the pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl PartialOrd for Pattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source.cmp(&other.source)
    }
}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

/// Returns true if any pattern in the slice matches the input.
pub(crate) fn any_matches(patterns: &[Pattern], input: &str) -> bool {
    patterns.iter().any(|p| p.matches(input))
}
