use std::fmt;

use crate::cipher::CipherError;
use crate::composer::CompositionError;
use crate::config::ConfigError;
use crate::pattern::PatternError;

/// Errors that can occur in the tamper guard crate.
///
/// Every variant is a programmer or configuration error. Tampering detected
/// while validating a request is never reported through this type; it is
/// returned as data in a [`ValidationResult`](crate::ValidationResult).
#[derive(Debug)]
pub enum Error {
    /// The data composer was driven out of order
    Composition(CompositionError),
    /// A rule or exemption pattern failed to compile
    Pattern(PatternError),
    /// The configuration is inconsistent
    Config(ConfigError),
    /// Encrypting a state payload failed
    Cipher(CipherError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Composition(e) => write!(f, "composition error: {}", e),
            Error::Pattern(e) => write!(f, "pattern error: {}", e),
            Error::Config(e) => write!(f, "configuration error: {}", e),
            Error::Cipher(e) => write!(f, "cipher error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Composition(e) => Some(e),
            Error::Pattern(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Cipher(e) => Some(e),
        }
    }
}

impl From<CompositionError> for Error {
    fn from(e: CompositionError) -> Self {
        Error::Composition(e)
    }
}

impl From<PatternError> for Error {
    fn from(e: PatternError) -> Self {
        Error::Pattern(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<CipherError> for Error {
    fn from(e: CipherError) -> Self {
        Error::Cipher(e)
    }
}
