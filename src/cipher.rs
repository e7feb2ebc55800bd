//! Authenticated symmetric encryption for state payloads.
//!
//! Payloads are sealed with XChaCha20-Poly1305. The 24-byte random nonce is
//! prepended to the ciphertext, so a sealed payload is self-contained.
//! Any modification of the sealed bytes fails authentication on decrypt.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_LEN: usize = 24;

/// Error returned by [`encrypt`] and [`decrypt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    /// The AEAD refused to seal the payload
    EncryptionFailed,
    /// The payload is truncated, forged or sealed under another key
    DecryptionFailed,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncryptionFailed => write!(f, "encryption failed"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
        }
    }
}

impl std::error::Error for CipherError {}

/// A 256-bit symmetric key.
///
/// Keys are generated per session (or once for the application scope) and
/// are wiped from memory on drop. Formatting never shows key material.
///
/// # Examples
///
/// ```
/// use tamper_guard::CipherKey;
///
/// let key = CipherKey::generate();
/// assert_eq!(format!("{:?}", key), "[REDACTED]");
/// ```
// No Clone, no derived Debug.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherKey([u8; 32]);

impl CipherKey {
    /// Generates a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a key from configured bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Seals `plaintext` under `key`, returning `nonce || ciphertext`.
///
/// # Errors
///
/// Returns `CipherError::EncryptionFailed` if the AEAD rejects the input.
pub fn encrypt(plaintext: &[u8], key: &CipherKey) -> Result<Vec<u8>, CipherError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Opens a payload produced by [`encrypt`].
///
/// # Errors
///
/// Returns `CipherError::DecryptionFailed` if the payload is too short,
/// was modified, or was sealed under a different key.
pub fn decrypt(sealed: &[u8], key: &CipherKey) -> Result<Vec<u8>, CipherError> {
    if sealed.len() < NONCE_LEN {
        return Err(CipherError::DecryptionFailed);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = CipherKey::generate();
        let sealed = encrypt(b"page=4&state=2", &key).unwrap();

        assert_eq!(decrypt(&sealed, &key).unwrap(), b"page=4&state=2");
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = encrypt(b"payload", &CipherKey::generate()).unwrap();

        let result = decrypt(&sealed, &CipherKey::generate());
        assert_eq!(result, Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = CipherKey::generate();
        let mut sealed = encrypt(b"payload", &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert_eq!(decrypt(&sealed, &key), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn tampered_nonce_fails() {
        let key = CipherKey::generate();
        let mut sealed = encrypt(b"payload", &key).unwrap();
        sealed[0] ^= 0xFF;

        assert!(decrypt(&sealed, &key).is_err());
    }

    #[test]
    fn truncated_payload_fails() {
        let key = CipherKey::generate();
        assert_eq!(decrypt(&[0u8; 10], &key), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn same_plaintext_seals_differently() {
        let key = CipherKey::from_bytes([7u8; 32]);
        let a = encrypt(b"same", &key).unwrap();
        let b = encrypt(b"same", &key).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn key_is_redacted() {
        let key = CipherKey::from_bytes([0x41; 32]);

        assert_eq!(format!("{:?}", key), "[REDACTED]");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }
}
