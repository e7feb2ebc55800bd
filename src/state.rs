//! The page/state/parameter model.
//!
//! A [`Page`] is everything one rendered response can send back: an ordered
//! list of [`State`]s, one per link or form. Each state records its target
//! action and the exact values the server emitted for every parameter.
//! States are only built by the [`DataComposer`](crate::DataComposer) and
//! are immutable once their request is closed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::http::HttpMethod;
use crate::scope::Scope;

/// Reserved prefix of confidential placeholders.
pub const PLACEHOLDER_PREFIX: char = '~';

/// Returns the placeholder shown to the client for the value at `index`.
///
/// # Examples
///
/// ```
/// use tamper_guard::state::{parse_placeholder, placeholder};
///
/// assert_eq!(placeholder(3), "~3");
/// assert_eq!(parse_placeholder("~3"), Some(3));
/// assert_eq!(parse_placeholder("3"), None);
/// ```
pub fn placeholder(index: usize) -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, index)
}

/// Parses a confidential placeholder back to its value index.
pub fn parse_placeholder(value: &str) -> Option<usize> {
    let digits = value.strip_prefix(PLACEHOLDER_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Kind of form control an editable value came from.
///
/// Editable validation rules can be restricted to a subset of kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Single-line text input
    Text,
    /// Multi-line text area
    Textarea,
    /// Password input
    Password,
    /// Hidden input
    Hidden,
    /// Select, checkbox or radio value
    Choice,
}

/// One named parameter of a state and every value recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    values: Vec<String>,
    editable: bool,
    required: bool,
    data_type: Option<DataType>,
}

impl Parameter {
    pub(crate) fn new(name: &str, editable: bool, data_type: Option<DataType>) -> Self {
        Self {
            name: name.to_string(),
            values: Vec::new(),
            editable,
            required: false,
            data_type,
        }
    }

    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the recorded values in composition order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Returns true if the parameter holds free-text user input.
    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Returns true if the request must carry this parameter.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns true if more than one value was recorded.
    pub fn is_multi_valued(&self) -> bool {
        self.values.len() > 1
    }

    /// Returns the form control kind, if one was given.
    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    /// Records a value and returns its position.
    pub(crate) fn push_value(&mut self, value: &str) -> usize {
        self.values.push(value.to_string());
        self.values.len() - 1
    }

    pub(crate) fn mark_editable(&mut self, data_type: Option<DataType>) {
        self.editable = true;
        if data_type.is_some() {
            self.data_type = data_type;
        }
    }

    pub(crate) fn mark_required(&mut self) {
        self.required = true;
    }

    /// Maps a submitted value to the recorded value it stands for.
    ///
    /// With `confidential` set, a placeholder with an in-range index
    /// resolves to the value at that index. Any other input resolves to
    /// itself if it is one of the recorded values. Returns `None` if neither
    /// holds.
    pub fn resolve(&self, submitted: &str, confidential: bool) -> Option<&str> {
        if confidential {
            if let Some(value) = parse_placeholder(submitted).and_then(|i| self.values.get(i)) {
                return Some(value.as_str());
            }
        }
        self.values
            .iter()
            .find(|v| v.as_str() == submitted)
            .map(String::as_str)
    }
}

/// One request target a page can originate: a link or a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    index: usize,
    scope: Scope,
    method: HttpMethod,
    action: String,
    parameters: BTreeMap<String, Parameter>,
}

impl State {
    pub(crate) fn new(index: usize, scope: Scope, method: HttpMethod, action: &str) -> Self {
        Self {
            index,
            scope,
            method,
            action: action.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    /// Returns the position of this state within its page.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the scope the state was composed under.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns the recorded HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the target action path.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Looks up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Iterates over every recorded parameter, ordered by name.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    pub(crate) fn parameter_mut(
        &mut self,
        name: &str,
        editable: bool,
        data_type: Option<DataType>,
    ) -> &mut Parameter {
        let param = self
            .parameters
            .entry(name.to_string())
            .or_insert_with(|| Parameter::new(name, editable, data_type));
        // Editable wins: a value the user may change cannot also be pinned.
        if editable && !param.is_editable() {
            param.mark_editable(data_type);
        }
        param
    }
}

/// The sealed set of states produced while rendering one response.
#[derive(Debug, Clone)]
pub struct Page {
    id: u64,
    nonce: String,
    states: Vec<Arc<State>>,
    flow_ids: BTreeSet<String>,
}

impl Page {
    pub(crate) fn new(
        id: u64,
        nonce: String,
        states: Vec<Arc<State>>,
        flow_ids: BTreeSet<String>,
    ) -> Self {
        Self {
            id,
            nonce,
            states,
            flow_ids,
        }
    }

    /// Returns the generator-assigned page id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the random component every token of this page carries.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Returns the state at `index`.
    pub fn state(&self, index: usize) -> Option<&Arc<State>> {
        self.states.get(index)
    }

    /// Returns the number of states on the page.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if the page has no states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns true if any state was composed under `scope`.
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.states.iter().any(|s| s.scope() == scope)
    }

    /// Returns true if the page belongs to the given flow.
    pub fn belongs_to_flow(&self, flow_id: &str) -> bool {
        self.flow_ids.contains(flow_id)
    }
}
