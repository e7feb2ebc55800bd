//! The opaque state token and its text encoding.
//!
//! Memory tokens name a cached state: `[<prefix>-]<pageId>-<stateIndex>-<nonce>`.
//! Cipher tokens carry the state itself, sealed and base64url encoded:
//! `[<prefix>-]C<payload>`. The prefix is present only for the
//! user-session (`U`) and application (`A`) scopes.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::cipher::{self, CipherError, CipherKey};
use crate::scope::Scope;
use crate::state::State;

const CIPHER_MARKER: char = 'C';

/// Error returned when a token string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    message: String,
}

impl TokenError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns what was wrong with the token.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed state token: {}", self.message)
    }
}

impl std::error::Error for TokenError {}

/// What a token identifies, depending on the configured strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenBody {
    /// A state held in a server-side cache
    Memory {
        /// Page id assigned at `start_page`
        page_id: u64,
        /// Position of the state within the page
        state_index: usize,
        /// Random component of the page
        nonce: String,
    },
    /// A sealed, self-contained state
    Cipher {
        /// `nonce || ciphertext` as produced by [`cipher::encrypt`]
        payload: Vec<u8>,
    },
}

/// A parsed state token.
///
/// # Examples
///
/// ```
/// use tamper_guard::{Scope, StateToken};
///
/// let token: StateToken = "A-12-0-00000000deadbeef".parse().unwrap();
/// assert_eq!(token.scope(), Scope::Application);
/// assert_eq!(token.to_string(), "A-12-0-00000000deadbeef");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateToken {
    scope: Scope,
    body: TokenBody,
}

impl StateToken {
    /// Creates a memory-strategy token.
    pub fn memory(scope: Scope, page_id: u64, state_index: usize, nonce: &str) -> Self {
        Self {
            scope,
            body: TokenBody::Memory {
                page_id,
                state_index,
                nonce: nonce.to_string(),
            },
        }
    }

    /// Creates a cipher-strategy token from a sealed payload.
    pub fn cipher(scope: Scope, payload: Vec<u8>) -> Self {
        Self {
            scope,
            body: TokenBody::Cipher { payload },
        }
    }

    /// Returns the scope named by the token prefix.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns the token body.
    pub fn body(&self) -> &TokenBody {
        &self.body
    }

    /// Parses a token string.
    ///
    /// # Errors
    ///
    /// Returns `TokenError` if the string does not follow either token format.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let (scope, rest) = split_scope(raw);

        if let Some(encoded) = rest.strip_prefix(CIPHER_MARKER) {
            let payload = URL_SAFE_NO_PAD
                .decode(encoded)
                .map_err(|_| TokenError::new("payload is not base64url"))?;
            if payload.is_empty() {
                return Err(TokenError::new("empty payload"));
            }
            return Ok(Self::cipher(scope, payload));
        }

        let mut parts = rest.split('-');
        let (Some(page), Some(index), Some(nonce), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::new("expected page, state and nonce segments"));
        };

        let page_id = parse_number(page).ok_or_else(|| TokenError::new("bad page id"))?;
        let state_index = parse_number(index).ok_or_else(|| TokenError::new("bad state index"))?;
        if nonce.is_empty() || !nonce.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TokenError::new("bad nonce"));
        }

        Ok(Self::memory(scope, page_id, state_index, nonce))
    }
}

fn split_scope(raw: &str) -> (Scope, &str) {
    if let Some((prefix, rest)) = raw.split_once('-') {
        if let Some(scope) = Scope::from_prefix(prefix) {
            return (scope, rest);
        }
    }
    (Scope::Page, raw)
}

fn parse_number<T: FromStr>(segment: &str) -> Option<T> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

impl FromStr for StateToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.scope.prefix() {
            write!(f, "{}-", prefix)?;
        }
        match &self.body {
            TokenBody::Memory {
                page_id,
                state_index,
                nonce,
            } => write!(f, "{}-{}-{}", page_id, state_index, nonce),
            TokenBody::Cipher { payload } => {
                write!(f, "{}{}", CIPHER_MARKER, URL_SAFE_NO_PAD.encode(payload))
            }
        }
    }
}

/// The plaintext sealed inside a cipher token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SealedState {
    pub(crate) scope: Scope,
    pub(crate) page_id: u64,
    pub(crate) state: State,
}

/// Serializes and encrypts a state into a cipher token.
pub(crate) fn seal(sealed: &SealedState, key: &CipherKey) -> Result<StateToken, CipherError> {
    let plaintext = serde_json::to_vec(sealed).map_err(|_| CipherError::EncryptionFailed)?;
    let payload = cipher::encrypt(&plaintext, key)?;
    Ok(StateToken::cipher(sealed.scope, payload))
}

/// Decrypts and deserializes a cipher payload.
pub(crate) fn open(payload: &[u8], key: &CipherKey) -> Result<SealedState, CipherError> {
    let plaintext = cipher::decrypt(payload, key)?;
    serde_json::from_slice(&plaintext).map_err(|_| CipherError::DecryptionFailed)
}
