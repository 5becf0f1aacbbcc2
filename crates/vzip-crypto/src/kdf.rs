//! Key derivation: passphrase + salt → 256-bit container key
//!
//! PBKDF2-HMAC-SHA256 is the default and matches containers written by
//! earlier vzip releases. Argon2id is available for new containers that
//! want a memory-hard derivation. Both are deterministic: the key is never
//! stored, so the same inputs must always yield the same key.

use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

/// Salt shared by every container that does not configure its own.
///
/// A fixed salt means two containers sealed with the same passphrase share
/// a key, and a precomputed dictionary applies to all of them. Configure a
/// per-deployment salt where that matters.
pub const DEFAULT_SALT: &[u8] = b"ow3yz5P{Z_N%04m$$Oim";

/// PBKDF2 rounds (roughly 100-300ms on commodity hardware)
pub const DEFAULT_ITERATIONS: u32 = 500_000;

/// A 256-bit key derived from a passphrase.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    bytes: [u8; KEY_SIZE],
}

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from externally supplied material of unchecked length.
    pub fn try_from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::CipherInit {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("bytes", &"[REDACTED]").finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KdfAlgorithm {
    #[default]
    Pbkdf2Sha256,
    Argon2id,
}

impl KdfAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KdfAlgorithm::Pbkdf2Sha256 => "pbkdf2-sha256",
            KdfAlgorithm::Argon2id => "argon2id",
        }
    }
}

impl FromStr for KdfAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pbkdf2-sha256" | "pbkdf2" => Ok(KdfAlgorithm::Pbkdf2Sha256),
            "argon2id" | "argon2" => Ok(KdfAlgorithm::Argon2id),
            other => Err(CryptoError::KeyDerivation(format!(
                "unknown KDF algorithm '{other}' (expected pbkdf2-sha256 or argon2id)"
            ))),
        }
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KDF parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// PBKDF2 rounds, or Argon2id time cost
    pub iterations: u32,
    pub salt: Vec<u8>,
    /// Argon2id memory cost in KiB (ignored by PBKDF2)
    pub mem_cost_kib: u32,
    /// Argon2id lanes (ignored by PBKDF2)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Pbkdf2Sha256,
            iterations: DEFAULT_ITERATIONS,
            salt: DEFAULT_SALT.to_vec(),
            mem_cost_kib: 65536,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    pub fn uses_default_salt(&self) -> bool {
        self.salt == DEFAULT_SALT
    }
}

/// Derive a 256-bit key from a passphrase.
///
/// An empty passphrase is accepted; passphrase policy belongs to the caller.
pub fn derive_key(passphrase: &SecretString, params: &KdfParams) -> CryptoResult<Key> {
    if params.iterations == 0 {
        return Err(CryptoError::KeyDerivation(
            "iteration count must be at least 1".into(),
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    let secret = passphrase.expose_secret().as_bytes();

    match params.algorithm {
        KdfAlgorithm::Pbkdf2Sha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(secret, &params.salt, params.iterations, &mut key);
        }
        KdfAlgorithm::Argon2id => {
            let argon2_params = Params::new(
                params.mem_cost_kib,
                params.iterations,
                params.parallelism,
                Some(KEY_SIZE),
            )
            .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id params: {e}")))?;

            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
                .hash_password_into(secret, &params.salt, &mut key)
                .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id failed: {e}")))?;
        }
    }

    tracing::debug!(
        algorithm = %params.algorithm,
        iterations = params.iterations,
        "derived container key"
    );

    let derived = Key::from_bytes(key);
    key.zeroize();
    Ok(derived)
}
