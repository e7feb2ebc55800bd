//! Request adapter for mapping HTTP requests to guard types.

use std::collections::BTreeMap;

use crate::http::{decode_component, split_query, HttpMethod};
use crate::validation::InboundRequest;

use super::ExtractRequest;

/// Adapter for converting framework-specific HTTP requests into guard types.
///
/// `RequestAdapter` holds simple, owned data so that it is not coupled to
/// any framework's request type. Framework-specific code should implement
/// `From<FrameworkRequest>` for `RequestAdapter`, or build one with
/// [`from_uri`](Self::from_uri) and add form fields with
/// [`add_param`](Self::add_param).
///
/// # Examples
///
/// ```
/// use tamper_guard::web::{ExtractRequest, RequestAdapter};
/// use tamper_guard::HttpMethod;
///
/// let mut adapter = RequestAdapter::from_uri(HttpMethod::Post, "/save.do?id=~0").unwrap();
/// adapter.add_param("comment", "hello world");
///
/// let request = adapter.extract_request();
/// assert_eq!(request.path(), "/save.do");
/// assert_eq!(request.values("id"), &["~0".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct RequestAdapter {
    method: HttpMethod,
    path: String,
    /// Query and form parameters, in submission order per name
    params: BTreeMap<String, Vec<String>>,
}

impl RequestAdapter {
    /// Creates an adapter for `path` with no parameters.
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Creates an adapter from a request URI, decoding its query string.
    ///
    /// Returns `None` if a query component does not decode to UTF-8.
    pub fn from_uri(method: HttpMethod, uri: &str) -> Option<Self> {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let mut adapter = Self::new(method, path);
        for (name, value) in split_query(query) {
            adapter.add_param(&decode_component(name)?, &decode_component(value)?);
        }
        Some(adapter)
    }

    /// Adds one decoded parameter value.
    ///
    /// Repeated names keep every value.
    pub fn add_param(&mut self, name: &str, value: &str) {
        self.params
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Returns the request method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the request path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ExtractRequest for RequestAdapter {
    fn extract_request(&self) -> InboundRequest {
        let mut request = InboundRequest::new(self.method, &self.path);
        for (name, values) in &self.params {
            for value in values {
                request.push_param(name, value);
            }
        }
        request
    }
}
