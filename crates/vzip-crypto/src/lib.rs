//! vzip-crypto: per-entry envelope encryption for vzip containers
//!
//! Every file stored in a container is sealed independently:
//!
//! ```text
//! Passphrase ──(PBKDF2-HMAC-SHA256 | Argon2id, fixed salt)──▶ Key (256-bit)
//!   └── Entry payload: AES-256-GCM (key, nonce=random 96-bit, no AAD)
//!         stored as [12 bytes: nonce][N bytes: ciphertext][16 bytes: tag]
//! ```
//!
//! The key is never stored. The same passphrase and salt always produce the
//! same key, which is what lets a container written in one session be read
//! in another.

pub mod envelope;
pub mod error;
pub mod kdf;

pub use envelope::{decrypt, encrypt, Envelope};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, KdfAlgorithm, KdfParams, Key, DEFAULT_ITERATIONS, DEFAULT_SALT};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
