//! Parameter-tampering protection for server-rendered web applications.
//!
//! While a response is rendered, every link and form it emits is recorded
//! server-side as a [`State`](state::State). The response carries only an
//! opaque token naming that state. When the next request comes back, the
//! token is resolved and every non-editable parameter must carry a value the
//! server actually emitted. Free-text fields are checked against ordered
//! whitelist rules instead.
//!
//! # Core Types
//!
//! - [`Guard`]: Application-wide entry point owning configuration and shared caches
//! - [`Session`]: Per-user caches and key, created at session start
//! - [`DataComposer`]: Records states while a response is rendered
//! - [`Validator`]: Checks an inbound request against its state
//! - [`GuardConfig`]: Compiled configuration, built or loaded from JSON
//! - [`StateToken`]: The token embedded in responses
//!
//! # Examples
//!
//! ```
//! use tamper_guard::{Guard, GuardConfig, HttpMethod, InboundRequest, IntegrityViolation};
//!
//! let guard = Guard::new(GuardConfig::builder().confidentiality(false).build().unwrap());
//! let session = guard.new_session("session-1");
//!
//! // Rendering: one link to /test.do?p1=2
//! let mut composer = guard.composer(&session);
//! composer.start_page().unwrap();
//! composer.begin_request(HttpMethod::Get, "/test.do").unwrap();
//! composer.compose("p1", "2", false, None).unwrap();
//! let token = composer.end_request().unwrap().to_string();
//! composer.end_page().unwrap();
//!
//! // The link comes back unchanged
//! let request = InboundRequest::new(HttpMethod::Get, "/test.do")
//!     .param("p1", "2")
//!     .param("_STATE_", &token);
//! assert!(guard.validate(&session, &request).is_valid());
//!
//! // The user edited the URL
//! let request = InboundRequest::new(HttpMethod::Get, "/test.do")
//!     .param("p1", "3")
//!     .param("_STATE_", &token);
//! let result = guard.validate(&session, &request);
//! assert!(matches!(
//!     result.violation(),
//!     Some(IntegrityViolation::ParameterTampered { parameter, .. }) if parameter == "p1"
//! ));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
pub mod cipher;
mod composer;
mod config;
mod error;
mod guard;
mod http;
mod id;
mod logging;
mod pattern;
mod scope;
mod session;
pub mod state;
mod token;
pub mod validation;
pub mod web;

pub use cache::PageCache;
pub use cipher::{CipherError, CipherKey};
pub use composer::{CompositionError, CompositionErrorKind, DataComposer, Phase};
pub use config::{
    ConfigError, ExemptionSpec, GuardConfig, GuardConfigBuilder, GuardSettings, Strategy,
    DEFAULT_MAX_PAGES_PER_SESSION, DEFAULT_STATE_PARAMETER,
};
pub use error::Error;
pub use guard::Guard;
pub use http::{HttpMethod, UnknownMethod};
pub use id::{new_opaque_id, IdGenerator};
pub use logging::GuardLog;
pub use pattern::{Pattern, PatternError};
pub use scope::Scope;
pub use session::Session;
pub use state::DataType;
pub use token::{StateToken, TokenBody, TokenError};
pub use validation::rules::{builtin_default_rules, RuleSet, RuleSpec, ValidationRule};
pub use validation::{
    EditableViolation, InboundRequest, IntegrityViolation, ValidatedRequest, ValidationResult,
    Validator,
};
