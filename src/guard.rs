use crate::cache::PageCache;
use crate::cipher::CipherKey;
use crate::composer::DataComposer;
use crate::config::GuardConfig;
use crate::id::IdGenerator;
use crate::session::Session;
use crate::validation::{InboundRequest, ValidationResult, Validator};

/// The application-wide tamper guard.
///
/// `Guard` owns everything shared across sessions: the compiled
/// configuration, the page id generator, the application-scoped page cache
/// and the application key. Per-user state lives in [`Session`]s created
/// through [`new_session`](Self::new_session).
///
/// # Examples
///
/// ```
/// use tamper_guard::{Guard, GuardConfig, HttpMethod, InboundRequest};
///
/// let guard = Guard::new(GuardConfig::default());
/// let session = guard.new_session("session-1");
///
/// let mut composer = guard.composer(&session);
/// composer.start_page().unwrap();
/// composer.begin_request(HttpMethod::Get, "/test.do").unwrap();
/// let shown = composer.compose("p1", "2", false, None).unwrap();
/// let token = composer.end_request().unwrap();
/// composer.end_page().unwrap();
///
/// let request = InboundRequest::new(HttpMethod::Get, "/test.do")
///     .param("p1", &shown)
///     .param(session.state_parameter_name(), &token.to_string());
///
/// let result = guard.validate(&session, &request);
/// assert!(result.is_valid());
/// assert_eq!(result.request().unwrap().parameter("p1"), Some("2"));
/// ```
#[derive(Debug)]
pub struct Guard {
    config: GuardConfig,
    ids: IdGenerator,
    application_pages: PageCache,
    application_key: CipherKey,
}

impl Guard {
    /// Creates a guard from a compiled configuration.
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            ids: IdGenerator::new(),
            application_pages: PageCache::unbounded(),
            application_key: CipherKey::generate(),
        }
    }

    /// Creates a guard whose application-scoped cipher tokens are sealed with `key`.
    ///
    /// Instances sharing a key accept each other's application tokens.
    pub fn with_application_key(config: GuardConfig, key: CipherKey) -> Self {
        Self {
            application_key: key,
            ..Self::new(config)
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Returns the application-scoped page cache.
    pub fn application_pages(&self) -> &PageCache {
        &self.application_pages
    }

    pub(crate) fn application_key(&self) -> &CipherKey {
        &self.application_key
    }

    pub(crate) fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Creates the state of a new user session.
    pub fn new_session(&self, id: &str) -> Session {
        tracing::debug!(session_id = %id, "session created");
        Session::new(id, &self.config)
    }

    /// Returns a composer for one response of `session`.
    pub fn composer<'g>(&'g self, session: &'g Session) -> DataComposer<'g> {
        DataComposer::new(self, session)
    }

    /// Returns the validation engine.
    pub fn validator(&self) -> Validator<'_> {
        Validator::new(&self.config, &self.application_pages, &self.application_key)
    }

    /// Validates one request of `session`.
    pub fn validate(&self, session: &Session, request: &InboundRequest) -> ValidationResult {
        self.validator().validate(session, request)
    }

    /// Removes the pages of a finished flow.
    ///
    /// Pages tagged with `flow_id` are dropped from the session's user-session
    /// cache and from the application cache. Returns how many were removed.
    pub fn end_flow(&self, session: &Session, flow_id: &str) -> usize {
        session.user_pages().remove_flow(flow_id) + self.application_pages.remove_flow(flow_id)
    }
}
