//! Per-session state owned by the integration.
//!
//! A [`Session`] is created when the user's HTTP session starts and dropped
//! when it ends. It owns the session's bounded page cache, its unbounded
//! user-session cache and the key sealing its cipher tokens. Dropping the
//! session makes every default- and user-session-scoped token unresolvable.

use std::fmt;

use crate::cache::PageCache;
use crate::cipher::CipherKey;
use crate::config::GuardConfig;
use crate::id::new_opaque_id;
use crate::scope::Scope;

/// State attached to one user session.
///
/// Obtain one from [`Guard::new_session`](crate::Guard::new_session). The
/// session is shared by every concurrent request of that user, so it is
/// `Send + Sync` and all mutation goes through interior locks.
pub struct Session {
    id: String,
    state_parameter_name: String,
    pages: PageCache,
    user_pages: PageCache,
    key: CipherKey,
}

impl Session {
    pub(crate) fn new(id: &str, config: &GuardConfig) -> Self {
        let state_parameter_name = if config.random_state_parameter_name() {
            // Opaque ids are hex only, so the name is always URL safe.
            format!("_{}", &new_opaque_id()[..12])
        } else {
            config.state_parameter_name().to_string()
        };

        Self {
            id: id.to_string(),
            state_parameter_name,
            pages: PageCache::bounded(config.max_pages_per_session()),
            user_pages: PageCache::unbounded(),
            key: CipherKey::generate(),
        }
    }

    /// Returns the session id supplied by the integration.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the request parameter name carrying the token in this session.
    pub fn state_parameter_name(&self) -> &str {
        &self.state_parameter_name
    }

    /// Returns the bounded default page cache.
    pub fn pages(&self) -> &PageCache {
        &self.pages
    }

    /// Returns the user-session scoped cache.
    pub fn user_pages(&self) -> &PageCache {
        &self.user_pages
    }

    /// Returns the session cache for `scope`, or `None` for the application scope.
    pub(crate) fn cache(&self, scope: Scope) -> Option<&PageCache> {
        match scope {
            Scope::Page => Some(&self.pages),
            Scope::UserSession => Some(&self.user_pages),
            Scope::Application => None,
        }
    }

    pub(crate) fn key(&self) -> &CipherKey {
        &self.key
    }

    /// Drops every page of the session's default and user-session caches.
    pub fn invalidate(&self) {
        self.pages.clear();
        self.user_pages.clear();
        tracing::debug!(session_id = %self.id, "session pages invalidated");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state_parameter_name", &self.state_parameter_name)
            .field("pages", &self.pages.len())
            .field("user_pages", &self.user_pages.len())
            .field("key", &self.key)
            .finish()
    }
}
