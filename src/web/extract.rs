//! Extraction boundary trait for web integration.

use crate::validation::InboundRequest;

/// Extracts the guard's view of a framework-specific request.
///
/// This trait only maps framework types to [`InboundRequest`]. It does not
/// validate anything; that is the [`ValidationFilter`](super::ValidationFilter)'s
/// job.
///
/// Implementations must hand over parameter values decoded but otherwise
/// untouched, in submission order, with the token parameter included.
///
/// # Examples
///
/// ```
/// use tamper_guard::web::ExtractRequest;
/// use tamper_guard::{HttpMethod, InboundRequest};
///
/// // Example framework-specific implementation
/// struct MyFrameworkRequest {
///     path: String,
///     form: Vec<(String, String)>,
/// }
///
/// impl ExtractRequest for MyFrameworkRequest {
///     fn extract_request(&self) -> InboundRequest {
///         self.form
///             .iter()
///             .fold(InboundRequest::new(HttpMethod::Post, &self.path), |r, (k, v)| {
///                 r.param(k, v)
///             })
///     }
/// }
/// ```
pub trait ExtractRequest {
    /// Returns the method, path and parameters of the request.
    fn extract_request(&self) -> InboundRequest;
}

impl ExtractRequest for InboundRequest {
    fn extract_request(&self) -> InboundRequest {
        self.clone()
    }
}
