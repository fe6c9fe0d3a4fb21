//! Authenticated encryption of chat lines and file contents.
//!
//! Wire token format:
//!
//! ```text
//! base64( nonce:12 || ciphertext:N || tag:16 )
//! ```
//!
//! A fresh 96-bit nonce is drawn from the OS CSPRNG for every call to
//! [`SecureCodec::encrypt`].  Reusing a nonce under the same AES-GCM key breaks
//! both confidentiality and integrity, so nonces are never cached, counted, or
//! derived from content.
//!
//! Decryption failures are deliberately opaque: invalid base64, a blob shorter
//! than the nonce, and an authentication failure all surface as the same
//! [`DecryptionError`].  The specific reason is only logged locally at `debug`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::debug;

use crate::crypto::keys::{derive_key, SharedSecret, KEY_SIZE};

/// Size of the AES-GCM nonce prepended to every sealed blob.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag appended by the cipher.
pub const TAG_SIZE: usize = 16;

/// The payload could not be decrypted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("could not decrypt payload")]
pub struct DecryptionError;

/// The payload could not be encrypted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("could not encrypt payload")]
pub struct EncryptionError;

/// AES-256-GCM codec bound to one derived key.
#[derive(Clone)]
pub struct SecureCodec {
    cipher: Aes256Gcm,
}

impl SecureCodec {
    /// Creates a codec for the key of `secret`.
    pub fn new(secret: &SharedSecret) -> Self {
        Self::from_key(secret.key())
    }

    /// Creates a codec from a raw 32-byte key.
    pub fn from_key(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Seals `plaintext` into `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError`] if the cipher rejects the input length.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| EncryptionError)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Opens a blob produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`DecryptionError`] if the blob is shorter than a nonce or
    /// fails authentication.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if blob.len() < NONCE_SIZE {
            debug!("sealed blob too short: {} bytes", blob.len());
            return Err(DecryptionError);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                debug!("AEAD authentication failed");
                DecryptionError
            })
    }

    /// Encrypts `plaintext` into a base64 wire token.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError`] if sealing fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanchat_core::{SecureCodec, SharedSecret};
    ///
    /// let secret = SharedSecret::from_password("hunter2").unwrap();
    /// let codec = SecureCodec::new(&secret);
    /// let token = codec.encrypt(b"hello").unwrap();
    /// assert_eq!(codec.decrypt(&token).unwrap(), b"hello");
    /// ```
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        Ok(STANDARD.encode(self.seal(plaintext)?))
    }

    /// Decrypts a base64 wire token.  Surrounding ASCII whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DecryptionError`] for invalid base64, a short blob, or an
    /// authentication failure, without distinguishing between them.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, DecryptionError> {
        let blob = STANDARD.decode(token.trim()).map_err(|e| {
            debug!("wire token is not valid base64: {e}");
            DecryptionError
        })?;
        self.open(&blob)
    }
}

/// Encrypts `plaintext` under the key derived from `password`.
///
/// # Errors
///
/// Returns [`EncryptionError`] if sealing fails.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<String, EncryptionError> {
    SecureCodec::from_key(&derive_key(password)).encrypt(plaintext)
}

/// Decrypts a wire token under the key derived from `password`.
///
/// # Errors
///
/// Returns [`DecryptionError`] on any failure.
pub fn decrypt(token: &str, password: &str) -> Result<Vec<u8>, DecryptionError> {
    SecureCodec::from_key(&derive_key(password)).decrypt(token)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(password: &str) -> SecureCodec {
        SecureCodec::new(&SharedSecret::from_password(password).unwrap())
    }

    #[test]
    fn test_round_trip_returns_original_plaintext() {
        let c = codec("hunter2");
        let token = c.encrypt(b"hello over the lan").unwrap();
        assert_eq!(c.decrypt(&token).unwrap(), b"hello over the lan");
    }

    #[test]
    fn test_round_trip_of_empty_payload() {
        let c = codec("hunter2");
        let token = c.encrypt(b"").unwrap();
        assert_eq!(c.decrypt(&token).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_sealed_blob_has_nonce_and_tag_overhead() {
        let blob = codec("hunter2").seal(b"abcd").unwrap();
        assert_eq!(blob.len(), NONCE_SIZE + 4 + TAG_SIZE);
    }

    #[test]
    fn test_two_encryptions_use_different_nonces() {
        // Arrange
        let c = codec("hunter2");

        // Act
        let a = c.seal(b"same").unwrap();
        let b = c.seal(b"same").unwrap();

        // Assert
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_every_single_bit_flip_is_rejected() {
        // Arrange
        let c = codec("hunter2");
        let blob = c.seal(b"tamper me").unwrap();

        // Act / Assert
        for byte in 0..blob.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(c.open(&tampered), Err(DecryptionError), "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = codec("hunter2").encrypt(b"secret").unwrap();
        assert_eq!(codec("other").decrypt(&token), Err(DecryptionError));
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        assert_eq!(codec("hunter2").decrypt("!!not base64!!"), Err(DecryptionError));
    }

    #[test]
    fn test_blob_shorter_than_nonce_is_rejected() {
        let short = STANDARD.encode([0u8; NONCE_SIZE - 1]);
        assert_eq!(codec("hunter2").decrypt(&short), Err(DecryptionError));
    }

    #[test]
    fn test_nonce_only_blob_is_rejected() {
        let c = codec("hunter2");
        assert_eq!(c.open(&[0u8; NONCE_SIZE]), Err(DecryptionError));
    }

    #[test]
    fn test_trailing_newline_on_token_is_tolerated() {
        let c = codec("hunter2");
        let token = format!("{}\n", c.encrypt(b"line").unwrap());
        assert_eq!(c.decrypt(&token).unwrap(), b"line");
    }

    #[test]
    fn test_password_helpers_interoperate_with_codec() {
        let token = encrypt(b"payload", "hunter2").unwrap();
        assert_eq!(decrypt(&token, "hunter2").unwrap(), b"payload");
        assert_eq!(codec("hunter2").decrypt(&token).unwrap(), b"payload");
        assert_eq!(decrypt(&token, "wrong"), Err(DecryptionError));
    }
}
