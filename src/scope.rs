use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifetime and visibility class of a composed state.
///
/// The default `Page` scope lives in the session's bounded page cache. The
/// other two scopes are written to caches that are never evicted
/// automatically and are named by a short token prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Session-wide page cache, bounded by `max_pages_per_session`
    #[default]
    Page,
    /// Retained for the life of the session
    UserSession,
    /// Shared by every session of the application
    Application,
}

impl Scope {
    /// Returns the token prefix for this scope, or `None` for the default scope.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Scope::Page => None,
            Scope::UserSession => Some("U"),
            Scope::Application => Some("A"),
        }
    }

    /// Resolves a token prefix back to its scope.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "U" => Some(Scope::UserSession),
            "A" => Some(Scope::Application),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Page => write!(f, "page"),
            Scope::UserSession => write!(f, "user-session"),
            Scope::Application => write!(f, "application"),
        }
    }
}
