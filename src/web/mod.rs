//! Web framework integration surface.
//!
//! This module is the boundary between an HTTP framework and the guard. It
//! contains no framework-specific code; integrations implement
//! [`ExtractRequest`] for their request type, or build a [`RequestAdapter`]
//! from it, and hand the result to a [`ValidationFilter`].
//!
//! # Integration Flow
//!
//! ```text
//! HTTP Request
//!   ↓
//! Framework code builds RequestAdapter (or implements ExtractRequest)
//!   ↓
//! ValidationFilter::filter(session, request)
//!   ↓
//! Proceed  → handler runs with placeholders restored
//! Rerender → form shown again with field errors
//! Reject   → generic error page
//! ```
//!
//! # Example Flow
//!
//! ```
//! use tamper_guard::web::{FilterDecision, RequestAdapter, ValidationFilter};
//! use tamper_guard::{Guard, GuardConfig, HttpMethod};
//!
//! let guard = Guard::new(GuardConfig::builder().start_page("/").build().unwrap());
//! let session = guard.new_session("s-1");
//!
//! let adapter = RequestAdapter::from_uri(HttpMethod::Get, "/").unwrap();
//! let decision = ValidationFilter::new(&guard).filter(&session, &adapter);
//! assert!(matches!(decision, FilterDecision::Proceed(_)));
//! ```

mod adapter;
mod extract;
mod filter;

pub use adapter::RequestAdapter;
pub use extract::ExtractRequest;
pub use filter::{FilterDecision, ValidationFilter};
