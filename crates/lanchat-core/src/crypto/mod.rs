//! Password-derived cryptography.
//!
//! - **`keys`** – One-way derivations of the shared password: the 32-byte
//!   AES key and the hex fingerprint exchanged during verification.
//! - **`secure_codec`** – AES-256-GCM sealing of arbitrary payloads into
//!   base64 `nonce || ciphertext || tag` tokens.

pub mod keys;
pub mod secure_codec;

pub use keys::{derive_key, fingerprint, SharedSecret};
pub use secure_codec::{DecryptionError, EncryptionError, SecureCodec};
