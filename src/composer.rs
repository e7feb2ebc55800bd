//! The request-scoped data composer.
//!
//! While a response is rendered, the integration reports every link and form
//! it emits to a [`DataComposer`]. The composer records the values into
//! [`State`]s, hands back what should actually be written into the markup
//! (the literal value or a confidential placeholder), and mints one token per
//! state. At the end of the page the sealed [`Page`] is written into the
//! caches of every scope its states were composed under.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start_page--> PageStarted --begin_request--> RequestOpen
//!                       ^    |                            |
//!                       |    +-------end_page---> Sealed  |
//!                       +--------------end_request--------+
//! ```
//!
//! Any call out of this order fails with a [`CompositionError`] and leaves the
//! composer unchanged.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::Strategy;
use crate::error::Error;
use crate::guard::Guard;
use crate::http::{decode_component, split_query, HttpMethod};
use crate::id::page_nonce;
use crate::scope::Scope;
use crate::session::Session;
use crate::state::{placeholder, DataType, Page, State};
use crate::token::{self, SealedState, StateToken};

/// Error returned when the composer is driven out of order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionError {
    kind: CompositionErrorKind,
    message: String,
}

impl CompositionError {
    /// Creates a new composition error.
    pub fn new(kind: CompositionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> CompositionErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.message)
    }
}

impl std::error::Error for CompositionError {}

/// Kind of composition error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionErrorKind {
    /// `start_page` was called while a page is being composed
    PageAlreadyStarted,
    /// No page has been started
    NoPage,
    /// A request is already open
    RequestAlreadyOpen,
    /// No request is open
    NoOpenRequest,
    /// `end_scope` without `start_scope`, or a scope left open at `end_page`
    UnbalancedScope,
    /// `compose_for` named a different action than the open request
    ActionMismatch,
    /// An action passed to `begin_request` carried a query string
    QueryInAction,
    /// A query string could not be decoded
    MalformedQuery,
    /// A character encoding other than UTF-8 was requested
    UnsupportedEncoding,
}

impl fmt::Display for CompositionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageAlreadyStarted => write!(f, "page already started"),
            Self::NoPage => write!(f, "no page started"),
            Self::RequestAlreadyOpen => write!(f, "request already open"),
            Self::NoOpenRequest => write!(f, "no open request"),
            Self::UnbalancedScope => write!(f, "unbalanced scope"),
            Self::ActionMismatch => write!(f, "action mismatch"),
            Self::QueryInAction => write!(f, "query string in action"),
            Self::MalformedQuery => write!(f, "malformed query string"),
            Self::UnsupportedEncoding => write!(f, "unsupported encoding"),
        }
    }
}

/// Where the composer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No page yet
    Idle,
    /// A page is open and no request is
    PageStarted,
    /// A request is open inside the page
    RequestOpen,
    /// The last page was stored
    Sealed,
}

#[derive(Debug)]
struct PageDraft {
    id: u64,
    nonce: String,
    states: Vec<Arc<State>>,
    flow_ids: BTreeSet<String>,
}

/// Records the states of one rendered response.
///
/// One composer serves one request-processing cycle and is not shared.
///
/// # Examples
///
/// ```
/// use tamper_guard::{Guard, GuardConfig, HttpMethod};
///
/// let guard = Guard::new(GuardConfig::builder().confidentiality(false).build().unwrap());
/// let session = guard.new_session("session-1");
///
/// let mut composer = guard.composer(&session);
/// composer.start_page().unwrap();
/// composer.begin_request(HttpMethod::Get, "/test.do").unwrap();
/// assert_eq!(composer.compose("p1", "2", false, None).unwrap(), "2");
/// let token = composer.end_request().unwrap();
/// composer.end_page().unwrap();
///
/// assert!(!token.to_string().is_empty());
/// ```
#[derive(Debug)]
pub struct DataComposer<'g> {
    guard: &'g Guard,
    session: &'g Session,
    phase: Phase,
    page: Option<PageDraft>,
    scopes: Vec<Scope>,
    open: Option<State>,
}

impl<'g> DataComposer<'g> {
    pub(crate) fn new(guard: &'g Guard, session: &'g Session) -> Self {
        Self {
            guard,
            session,
            phase: Phase::Idle,
            page: None,
            scopes: Vec::new(),
            open: None,
        }
    }

    /// Returns the current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the id of the page being composed.
    pub fn page_id(&self) -> Option<u64> {
        self.page.as_ref().map(|p| p.id)
    }

    /// Returns the parameter name the token must be submitted under.
    pub fn state_parameter_name(&self) -> &str {
        self.session.state_parameter_name()
    }

    /// Returns the scope new requests are tagged with.
    pub fn current_scope(&self) -> Scope {
        self.scopes.last().copied().unwrap_or_default()
    }

    /// Opens a new page.
    ///
    /// # Errors
    ///
    /// Fails with `PageAlreadyStarted` if the previous page was not ended.
    pub fn start_page(&mut self) -> Result<(), CompositionError> {
        if matches!(self.phase, Phase::PageStarted | Phase::RequestOpen) {
            return Err(CompositionError::new(
                CompositionErrorKind::PageAlreadyStarted,
                "start_page called before end_page",
            ));
        }

        self.page = Some(PageDraft {
            id: self.guard.ids().next_page_id(),
            nonce: page_nonce(),
            states: Vec::new(),
            flow_ids: BTreeSet::new(),
        });
        self.scopes.clear();
        self.phase = Phase::PageStarted;
        Ok(())
    }

    /// Tags every request begun from now on with `scope`, until `end_scope`.
    pub fn start_scope(&mut self, scope: Scope) -> Result<(), CompositionError> {
        self.require_page_without_request("start_scope")?;
        self.scopes.push(scope);
        Ok(())
    }

    /// Closes the innermost scope.
    pub fn end_scope(&mut self) -> Result<Scope, CompositionError> {
        self.require_page_without_request("end_scope")?;
        self.scopes.pop().ok_or_else(|| {
            CompositionError::new(
                CompositionErrorKind::UnbalancedScope,
                "end_scope without start_scope",
            )
        })
    }

    /// Opens a new state targeting `action`.
    ///
    /// The action is a path; query-string parameters are added with
    /// [`compose_params`](Self::compose_params).
    pub fn begin_request(&mut self, method: HttpMethod, action: &str) -> Result<(), CompositionError> {
        self.require_page_without_request("begin_request")?;
        if action.contains('?') {
            return Err(CompositionError::new(
                CompositionErrorKind::QueryInAction,
                "pass query parameters through compose_params",
            ));
        }
        let index = self.page.as_ref().map_or(0, |p| p.states.len());

        self.open = Some(State::new(index, self.current_scope(), method, action));
        self.phase = Phase::RequestOpen;
        Ok(())
    }

    /// Records a value of `parameter` in the open state.
    ///
    /// Returns what the response should contain: a placeholder for a
    /// non-editable value when confidentiality is on, the literal value
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Fails with `NoOpenRequest` outside `begin_request`/`end_request`.
    pub fn compose(
        &mut self,
        parameter: &str,
        value: &str,
        editable: bool,
        data_type: Option<DataType>,
    ) -> Result<String, CompositionError> {
        let confidentiality = self.guard.config().confidentiality();
        let state = self.open.as_mut().ok_or_else(|| {
            CompositionError::new(CompositionErrorKind::NoOpenRequest, "compose")
        })?;

        let param = state.parameter_mut(parameter, editable, data_type);
        let index = param.push_value(value);

        if confidentiality && !param.is_editable() {
            Ok(placeholder(index))
        } else {
            Ok(value.to_string())
        }
    }

    /// Records a value for a named action, opening a request for it if needed.
    ///
    /// Lets several logical actions share one page: with no open request a
    /// `POST` request for `action` is begun; with one open for the same
    /// action the value is appended to it.
    ///
    /// # Errors
    ///
    /// Fails with `ActionMismatch` if a request for another action is open.
    pub fn compose_for(
        &mut self,
        action: &str,
        parameter: &str,
        value: &str,
        editable: bool,
        data_type: Option<DataType>,
    ) -> Result<String, CompositionError> {
        if let Some(state) = &self.open {
            if state.action() != action {
                return Err(CompositionError::new(
                    CompositionErrorKind::ActionMismatch,
                    format!("open request targets '{}'", state.action()),
                ));
            }
        } else {
            self.begin_request(HttpMethod::Post, action)?;
        }
        self.compose(parameter, value, editable, data_type)
    }

    /// Records every pair of a link query string and returns the rewritten query.
    ///
    /// Names and values are percent-decoded before they are recorded. Each
    /// parameter is non-editable and required. Pairs whose value is returned
    /// literally keep their original encoding.
    ///
    /// # Errors
    ///
    /// Fails with `UnsupportedEncoding` for encodings other than UTF-8,
    /// `MalformedQuery` for undecodable input, and `NoOpenRequest` outside
    /// a request.
    pub fn compose_params(
        &mut self,
        query: &str,
        method: HttpMethod,
        encoding: &str,
    ) -> Result<String, CompositionError> {
        if !matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return Err(CompositionError::new(
                CompositionErrorKind::UnsupportedEncoding,
                encoding.to_string(),
            ));
        }
        if self.open.is_none() {
            return Err(CompositionError::new(
                CompositionErrorKind::NoOpenRequest,
                "compose_params",
            ));
        }

        let mut decoded = Vec::new();
        for (raw_name, raw_value) in split_query(query) {
            let (Some(name), Some(value)) = (decode_component(raw_name), decode_component(raw_value))
            else {
                return Err(CompositionError::new(
                    CompositionErrorKind::MalformedQuery,
                    format!("cannot decode '{}={}'", raw_name, raw_value),
                ));
            };
            decoded.push((raw_name, raw_value, name, value));
        }

        let mut rewritten = Vec::with_capacity(decoded.len());
        for (raw_name, raw_value, name, value) in decoded {
            let shown = self.compose(&name, &value, false, None)?;
            if let Some(state) = self.open.as_mut() {
                state.parameter_mut(&name, false, None).mark_required();
            }
            if shown == value {
                rewritten.push(format!("{}={}", raw_name, raw_value));
            } else {
                rewritten.push(format!("{}={}", raw_name, shown));
            }
        }

        tracing::trace!(%method, pairs = rewritten.len(), "composed query parameters");
        Ok(rewritten.join("&"))
    }

    /// Seals the open state and returns its token.
    ///
    /// # Errors
    ///
    /// Fails with a `CompositionError` if no request is open, or with a
    /// `CipherError` if the cipher strategy cannot seal the state.
    pub fn end_request(&mut self) -> Result<StateToken, Error> {
        let (Some(state), Some(page)) = (self.open.as_ref(), self.page.as_ref()) else {
            return Err(CompositionError::new(CompositionErrorKind::NoOpenRequest, "end_request").into());
        };

        let scope = state.scope();
        let token = match self.guard.config().strategy() {
            Strategy::Memory => StateToken::memory(scope, page.id, state.index(), &page.nonce),
            Strategy::Cipher => {
                let key = match scope {
                    Scope::Application => self.guard.application_key(),
                    Scope::Page | Scope::UserSession => self.session.key(),
                };
                let sealed = SealedState {
                    scope,
                    page_id: page.id,
                    state: state.clone(),
                };
                token::seal(&sealed, key)?
            }
        };

        if let (Some(state), Some(page)) = (self.open.take(), self.page.as_mut()) {
            page.states.push(Arc::new(state));
        }
        self.phase = Phase::PageStarted;
        Ok(token)
    }

    /// Tags the page with a flow id for later bulk removal.
    pub fn add_flow_id(&mut self, flow_id: &str) -> Result<(), CompositionError> {
        let no_page = || CompositionError::new(CompositionErrorKind::NoPage, "add_flow_id");
        if !matches!(self.phase, Phase::PageStarted | Phase::RequestOpen) {
            return Err(no_page());
        }
        let page = self.page.as_mut().ok_or_else(no_page)?;
        page.flow_ids.insert(flow_id.to_string());
        Ok(())
    }

    /// Seals the page and stores it in the cache of every scope it uses.
    ///
    /// A page without states is legal and stores nothing. Under the cipher
    /// strategy the tokens are self-contained and nothing is cached.
    pub fn end_page(&mut self) -> Result<(), CompositionError> {
        self.require_page_without_request("end_page")?;
        if !self.scopes.is_empty() {
            return Err(CompositionError::new(
                CompositionErrorKind::UnbalancedScope,
                format!("{} scope(s) still open at end_page", self.scopes.len()),
            ));
        }
        let Some(draft) = self.page.take() else {
            return Err(CompositionError::new(CompositionErrorKind::NoPage, "end_page"));
        };
        self.phase = Phase::Sealed;

        if draft.states.is_empty() || self.guard.config().strategy() == Strategy::Cipher {
            return Ok(());
        }

        let page = Arc::new(Page::new(draft.id, draft.nonce, draft.states, draft.flow_ids));
        for scope in [Scope::Page, Scope::UserSession, Scope::Application] {
            if !page.has_scope(scope) {
                continue;
            }
            let cache = match self.session.cache(scope) {
                Some(cache) => cache,
                None => self.guard.application_pages(),
            };
            cache.put(Arc::clone(&page));
        }

        tracing::debug!(
            session_id = %self.session.id(),
            page_id = page.id(),
            states = page.len(),
            "page sealed"
        );
        Ok(())
    }

    fn require_page_without_request(&self, operation: &str) -> Result<(), CompositionError> {
        match self.phase {
            Phase::PageStarted => Ok(()),
            Phase::RequestOpen => Err(CompositionError::new(
                CompositionErrorKind::RequestAlreadyOpen,
                operation.to_string(),
            )),
            Phase::Idle | Phase::Sealed => Err(CompositionError::new(
                CompositionErrorKind::NoPage,
                operation.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::token::TokenBody;

    fn guard(confidentiality: bool) -> Guard {
        Guard::new(
            GuardConfig::builder()
                .confidentiality(confidentiality)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn full_cycle_stores_page() {
        let guard = guard(false);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);

        composer.start_page().unwrap();
        composer.begin_request(HttpMethod::Get, "/test.do").unwrap();
        assert_eq!(composer.compose("p1", "2", false, None).unwrap(), "2");
        let token = composer.end_request().unwrap();
        composer.end_page().unwrap();

        assert_eq!(composer.phase(), Phase::Sealed);
        let TokenBody::Memory {
            page_id,
            state_index,
            ..
        } = token.body().clone()
        else {
            panic!("memory token expected");
        };
        let state = session.pages().get(page_id, state_index).unwrap();
        assert_eq!(state.action(), "/test.do");
        assert_eq!(state.parameter("p1").unwrap().values(), &["2".to_string()]);
    }

    #[test]
    fn confidential_values_become_placeholders() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);

        composer.start_page().unwrap();
        composer.begin_request(HttpMethod::Post, "/save.do").unwrap();
        assert_eq!(composer.compose("id", "alpha", false, None).unwrap(), "~0");
        assert_eq!(composer.compose("id", "beta", false, None).unwrap(), "~1");
        assert_eq!(
            composer.compose("note", "free text", true, Some(DataType::Textarea)).unwrap(),
            "free text"
        );
    }

    #[test]
    fn start_page_twice_fails() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);

        composer.start_page().unwrap();
        let err = composer.start_page().unwrap_err();
        assert_eq!(err.kind(), CompositionErrorKind::PageAlreadyStarted);
    }

    #[test]
    fn compose_without_request_fails() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);

        assert_eq!(
            composer.compose("a", "b", false, None).unwrap_err().kind(),
            CompositionErrorKind::NoOpenRequest
        );
        composer.start_page().unwrap();
        assert_eq!(
            composer.compose("a", "b", false, None).unwrap_err().kind(),
            CompositionErrorKind::NoOpenRequest
        );
    }

    #[test]
    fn only_one_open_request() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);

        composer.start_page().unwrap();
        composer.begin_request(HttpMethod::Get, "/a").unwrap();
        let err = composer.begin_request(HttpMethod::Get, "/b").unwrap_err();
        assert_eq!(err.kind(), CompositionErrorKind::RequestAlreadyOpen);

        let err = composer.end_page().unwrap_err();
        assert_eq!(err.kind(), CompositionErrorKind::RequestAlreadyOpen);
    }

    #[test]
    fn end_request_without_request_fails() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();

        assert!(matches!(
            composer.end_request(),
            Err(Error::Composition(ref e)) if e.kind() == CompositionErrorKind::NoOpenRequest
        ));
    }

    #[test]
    fn scopes_must_balance() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();

        assert_eq!(
            composer.end_scope().unwrap_err().kind(),
            CompositionErrorKind::UnbalancedScope
        );
        composer.start_scope(Scope::Application).unwrap();
        assert_eq!(
            composer.end_page().unwrap_err().kind(),
            CompositionErrorKind::UnbalancedScope
        );
        assert_eq!(composer.end_scope().unwrap(), Scope::Application);
        composer.end_page().unwrap();
    }

    #[test]
    fn nested_scopes_tag_requests() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();

        composer.start_scope(Scope::UserSession).unwrap();
        composer.start_scope(Scope::Application).unwrap();
        composer.begin_request(HttpMethod::Get, "/app").unwrap();
        let app = composer.end_request().unwrap();
        composer.end_scope().unwrap();
        composer.begin_request(HttpMethod::Get, "/user").unwrap();
        let user = composer.end_request().unwrap();
        composer.end_scope().unwrap();
        composer.begin_request(HttpMethod::Get, "/page").unwrap();
        let page = composer.end_request().unwrap();
        composer.end_page().unwrap();

        assert_eq!(app.scope(), Scope::Application);
        assert_eq!(user.scope(), Scope::UserSession);
        assert_eq!(page.scope(), Scope::Page);
        assert_eq!(guard.application_pages().len(), 1);
        assert_eq!(session.user_pages().len(), 1);
        assert_eq!(session.pages().len(), 1);
    }

    #[test]
    fn empty_page_stores_nothing() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);

        composer.start_page().unwrap();
        composer.end_page().unwrap();
        assert!(session.pages().is_empty());

        // A sealed composer can start the next page.
        composer.start_page().unwrap();
        assert_eq!(composer.phase(), Phase::PageStarted);
    }

    #[test]
    fn compose_for_shares_open_request() {
        let guard = guard(false);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();

        composer.compose_for("/form.do", "a", "1", false, None).unwrap();
        composer.compose_for("/form.do", "b", "2", false, None).unwrap();
        let err = composer.compose_for("/other.do", "c", "3", false, None).unwrap_err();
        assert_eq!(err.kind(), CompositionErrorKind::ActionMismatch);

        composer.end_request().unwrap();
        composer.compose_for("/other.do", "c", "3", false, None).unwrap();
        assert_eq!(composer.phase(), Phase::RequestOpen);
    }

    #[test]
    fn compose_params_rewrites_query() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();
        composer.begin_request(HttpMethod::Get, "/list.do").unwrap();

        let query = composer
            .compose_params("id=10&name=J%C3%BCrgen+M&flag", HttpMethod::Get, "UTF-8")
            .unwrap();
        assert_eq!(query, "id=~0&name=~0&flag=~0");

        let token = composer.end_request().unwrap();
        composer.end_page().unwrap();
        let TokenBody::Memory { page_id, .. } = token.body().clone() else {
            panic!("memory token expected");
        };
        let state = session.pages().get(page_id, 0).unwrap();
        let name = state.parameter("name").unwrap();
        assert_eq!(name.values(), &["Jürgen M".to_string()]);
        assert!(name.is_required());
        assert_eq!(state.parameter("flag").unwrap().values(), &[String::new()]);
    }

    #[test]
    fn compose_params_keeps_literal_encoding() {
        let guard = guard(false);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();
        composer.begin_request(HttpMethod::Get, "/list.do").unwrap();

        let query = composer
            .compose_params("q=a%20b&&x=1", HttpMethod::Get, "utf8")
            .unwrap();
        assert_eq!(query, "q=a%20b&x=1");
    }

    #[test]
    fn compose_params_errors() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();

        assert_eq!(
            composer
                .compose_params("a=1", HttpMethod::Get, "UTF-8")
                .unwrap_err()
                .kind(),
            CompositionErrorKind::NoOpenRequest
        );
        composer.begin_request(HttpMethod::Get, "/x").unwrap();
        assert_eq!(
            composer
                .compose_params("a=1", HttpMethod::Get, "ISO-8859-1")
                .unwrap_err()
                .kind(),
            CompositionErrorKind::UnsupportedEncoding
        );
        assert_eq!(
            composer
                .compose_params("a=%ff", HttpMethod::Get, "UTF-8")
                .unwrap_err()
                .kind(),
            CompositionErrorKind::MalformedQuery
        );
    }

    #[test]
    fn query_in_action_is_rejected() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();

        let err = composer.begin_request(HttpMethod::Get, "/a.do?x=1").unwrap_err();
        assert_eq!(err.kind(), CompositionErrorKind::QueryInAction);
    }

    #[test]
    fn flow_ids_tag_stored_pages() {
        let guard = guard(true);
        let session = guard.new_session("s");
        let mut composer = guard.composer(&session);

        assert_eq!(
            composer.add_flow_id("f").unwrap_err().kind(),
            CompositionErrorKind::NoPage
        );
        composer.start_page().unwrap();
        composer.add_flow_id("wizard").unwrap();
        composer.start_scope(Scope::UserSession).unwrap();
        composer.begin_request(HttpMethod::Get, "/step2").unwrap();
        composer.end_request().unwrap();
        composer.end_scope().unwrap();
        composer.end_page().unwrap();

        assert_eq!(session.user_pages().remove_flow("wizard"), 1);
    }
}
